pub mod error;

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use log::{debug, trace, warn};

use crate::shared::page::{PageId, TransactionId};
use self::error::{LockError, LockResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Lock entry for one page. Exclusive entries always have exactly one holder.
#[derive(Debug)]
struct Lock {
    mode: LockMode,
    holders: HashSet<TransactionId>,
}

impl Lock {
    fn new(mode: LockMode, tid: TransactionId) -> Self {
        let mut holders = HashSet::new();
        holders.insert(tid);
        Self { mode, holders }
    }

    fn is_sole_holder(&self, tid: TransactionId) -> bool {
        self.holders.len() == 1 && self.holders.contains(&tid)
    }
}

/// Lock entries and the transaction index, always updated together
#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, Lock>,
    held: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn try_grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let granted = match self.locks.get_mut(&pid) {
            None => {
                self.locks.insert(pid, Lock::new(mode, tid));
                true
            }
            Some(lock) => match (lock.mode, mode) {
                (LockMode::Exclusive, _) => lock.holders.contains(&tid),
                (LockMode::Shared, LockMode::Shared) => {
                    lock.holders.insert(tid);
                    true
                }
                (LockMode::Shared, LockMode::Exclusive) => {
                    if lock.is_sole_holder(tid) {
                        trace!("{} upgraded lock on page {}", tid, pid);
                        lock.mode = LockMode::Exclusive;
                        true
                    } else {
                        false
                    }
                }
            },
        };

        if granted {
            self.held.entry(tid).or_default().insert(pid);
        }
        granted
    }

    fn release(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let released = match self.locks.get_mut(&pid) {
            Some(lock) => {
                let removed = lock.holders.remove(&tid);
                if lock.holders.is_empty() {
                    self.locks.remove(&pid);
                }
                removed
            }
            None => false,
        };

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        released
    }
}

/// Page-granularity two-phase lock manager.
///
/// There is no deadlock detection. Every `acquire` carries a time budget and
/// deadlocked transactions are expected to time out and abort.
pub struct LockManager {
    table: Mutex<LockTable>,
    waiters: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            waiters: Condvar::new(),
        }
    }

    fn table(&self) -> LockResult<MutexGuard<'_, LockTable>> {
        self.table
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }

    /// Block until `tid` holds `pid` in `mode` or `budget` has elapsed.
    ///
    /// The budget is measured from this call, not from each wake-up. A timed
    /// out request leaves the table exactly as it found it.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        budget: Duration,
    ) -> LockResult<()> {
        let deadline = Instant::now() + budget;
        let mut table = self.table()?;

        loop {
            if table.try_grant(tid, pid, mode) {
                debug!("Granted {:?} lock on page {} to {}", mode, pid, tid);
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("{} timed out waiting for {:?} lock on page {}", tid, mode, pid);
                return Err(LockError::Timeout { tid, pid, mode });
            }

            trace!("{} waiting for {:?} lock on page {}", tid, mode, pid);
            let (guard, _) = self
                .waiters
                .wait_timeout(table, remaining)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
            table = guard;

            if Instant::now() >= deadline {
                warn!("{} timed out waiting for {:?} lock on page {}", tid, mode, pid);
                return Err(LockError::Timeout { tid, pid, mode });
            }
        }
    }

    /// Release one page lock. Releasing a lock that is not held is a no-op.
    pub fn release(&self, tid: TransactionId, pid: PageId) -> LockResult<()> {
        let mut table = self.table()?;
        if table.release(tid, pid) {
            debug!("{} released lock on page {}", tid, pid);
        }
        drop(table);
        self.waiters.notify_all();
        Ok(())
    }

    /// Release every lock `tid` holds and forget the transaction
    pub fn release_all(&self, tid: TransactionId) -> LockResult<()> {
        let mut table = self.table()?;
        let pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();

        for pid in &pages {
            table.release(tid, *pid);
        }
        table.held.remove(&tid);
        drop(table);

        debug!("{} released {} locks", tid, pages.len());
        self.waiters.notify_all();
        Ok(())
    }

    pub fn holds(&self, tid: TransactionId, pid: PageId) -> LockResult<bool> {
        let table = self.table()?;
        Ok(table
            .held
            .get(&tid)
            .map_or(false, |pages| pages.contains(&pid)))
    }

    pub fn pages_held(&self, tid: TransactionId) -> LockResult<Vec<PageId>> {
        let table = self.table()?;
        Ok(table
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Current mode and holders of the lock on `pid`, if any
    pub fn lock_mode(&self, pid: PageId) -> LockResult<Option<(LockMode, Vec<TransactionId>)>> {
        let table = self.table()?;
        Ok(table
            .locks
            .get(&pid)
            .map(|lock| (lock.mode, lock.holders.iter().copied().collect())))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
