pub mod config;
pub mod error;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use log::{debug, error, info, trace, warn};

use crate::lock::{LockManager, LockMode};
use crate::shared::page::{PageId, PageRef, Permissions, TableId, TransactionId};
use crate::shared::tuple::Tuple;
use crate::storage::{DbFile, PageSource};
use crate::wal::LogSink;
use self::config::CacheConfig;
use self::error::{CacheError, CacheResult};

struct Frame {
    page: PageRef,
    last_used: u64,
}

struct CacheState {
    frames: HashMap<PageId, Frame>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Bounded cache of table pages shared by concurrent transactions.
///
/// Pages are handed out under page-level two-phase locks. Dirty pages are never
/// written before their transaction commits (no-steal), and commit writes every
/// page the transaction dirtied before releasing its locks (force).
pub struct PageCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
    lock_manager: LockManager,
    files: RwLock<HashMap<TableId, Arc<dyn DbFile>>>,
    log: Mutex<Box<dyn LogSink>>,
}

impl PageCache {
    pub fn new<L: LogSink + 'static>(config: CacheConfig, log: L) -> Self {
        info!("Created PageCache with capacity {}", config.capacity);
        Self {
            config,
            state: Mutex::new(CacheState {
                frames: HashMap::new(),
                tick: 0,
            }),
            lock_manager: LockManager::new(),
            files: RwLock::new(HashMap::new()),
            log: Mutex::new(Box::new(log)),
        }
    }

    pub fn with_capacity<L: LogSink + 'static>(capacity: usize, log: L) -> Self {
        Self::new(CacheConfig::default().with_capacity(capacity), log)
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Make a table's file known to the cache. Replaces any file with the same id.
    pub fn register_file(&self, file: Arc<dyn DbFile>) -> CacheResult<()> {
        let table_id = file.id();
        self.files
            .write()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))?
            .insert(table_id, file);
        debug!("Registered file for table {}", table_id);
        Ok(())
    }

    pub fn file(&self, table_id: TableId) -> CacheResult<Arc<dyn DbFile>> {
        self.files
            .read()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))?
            .get(&table_id)
            .cloned()
            .ok_or(CacheError::UnknownTable(table_id))
    }

    fn state(&self) -> CacheResult<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))
    }

    fn log(&self) -> CacheResult<MutexGuard<'_, Box<dyn LogSink>>> {
        self.log
            .lock()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))
    }

    /// Lock `pid` for `tid` and return the resident page, loading it on a miss.
    ///
    /// Blocks while a conflicting lock is held. Fails with `LockTimeout` when
    /// the randomized budget runs out; the transaction must then be aborted.
    pub fn fetch(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> CacheResult<PageRef> {
        let mode = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        self.lock_manager
            .acquire(tid, pid, mode, self.config.lock_timeout())?;

        let mut state = self.state()?;
        let tick = state.next_tick();
        if let Some(frame) = state.frames.get_mut(&pid) {
            trace!("Cache hit for page {}", pid);
            frame.last_used = tick;
            return Ok(Arc::clone(&frame.page));
        }

        let file = self.file(pid.table_id).map_err(|_| CacheError::UnknownPage(pid))?;
        let page = Arc::new(RwLock::new(file.read_page(pid)?));

        if state.frames.len() >= self.config.capacity {
            self.evict(&mut state)?;
        }
        state.frames.insert(
            pid,
            Frame {
                page: Arc::clone(&page),
                last_used: tick,
            },
        );
        debug!("Page {} loaded for {}", pid, tid);
        Ok(page)
    }

    /// Drops the least recently used clean page.
    ///
    /// Dirty pages may not leave the cache before their transaction commits, so
    /// when every page is dirty this fails with `NoCleanPage` and changes nothing.
    /// Pages currently latched by a caller are skipped.
    fn evict(&self, state: &mut CacheState) -> CacheResult<PageId> {
        let victim = state
            .frames
            .iter()
            .filter(|(_, frame)| match frame.page.try_read() {
                Ok(page) => !page.is_dirty(),
                Err(_) => false,
            })
            .min_by_key(|(_, frame)| frame.last_used)
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                state.frames.remove(&pid);
                debug!("Evicted page {}", pid);
                Ok(pid)
            }
            None => {
                warn!("No clean page to evict among {} resident pages", state.frames.len());
                Err(CacheError::NoCleanPage)
            }
        }
    }

    /// Add `tuple` to table `table_id` on behalf of `tid`
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: &Tuple) -> CacheResult<()> {
        let file = self.file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.install(tid, pages)
    }

    /// Remove `tuple` from the table named by its record id
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> CacheResult<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| CacheError::TupleNotFound("tuple has no record id".into()))?;
        let file = self.file(rid.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.install(tid, pages)
    }

    /// Marks pages a mutation returned as dirtied by `tid` and makes them the
    /// resident versions, evicting first if a page is not resident yet.
    /// The pages are X-locked by `tid`, so their latches are taken before the
    /// cache mutex and never waited on under it.
    fn install(&self, tid: TransactionId, pages: Vec<PageRef>) -> CacheResult<()> {
        let mut dirtied = Vec::with_capacity(pages.len());
        for page in pages {
            let pid = {
                let mut guard = page
                    .write()
                    .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
                guard.mark_dirty(Some(tid));
                guard.get_page_id()
            };
            dirtied.push((pid, page));
        }

        let mut state = self.state()?;
        for (pid, page) in dirtied {
            let tick = state.next_tick();
            let resident = state
                .frames
                .get(&pid)
                .map(|frame| Arc::ptr_eq(&frame.page, &page));
            match resident {
                Some(true) => {}
                Some(false) => trace!("Replacing resident copy of page {}", pid),
                None => {
                    if state.frames.len() >= self.config.capacity {
                        self.evict(&mut state)?;
                    }
                }
            }
            state.frames.insert(pid, Frame { page, last_used: tick });
            trace!("Page {} dirtied by {}", pid, tid);
        }
        Ok(())
    }

    /// Forget a page without writing it back
    pub fn discard(&self, pid: PageId) -> CacheResult<()> {
        if self.state()?.frames.remove(&pid).is_some() {
            debug!("Discarded page {}", pid);
        }
        Ok(())
    }

    pub fn holds(&self, tid: TransactionId, pid: PageId) -> CacheResult<bool> {
        Ok(self.lock_manager.holds(tid, pid)?)
    }

    /// Give up one page lock before the transaction ends. This breaks strict
    /// two-phase locking and is only safe for pages the transaction did not modify.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) -> CacheResult<()> {
        Ok(self.lock_manager.release(tid, pid)?)
    }

    pub fn is_resident(&self, pid: PageId) -> CacheResult<bool> {
        Ok(self.state()?.frames.contains_key(&pid))
    }

    pub fn resident_count(&self) -> CacheResult<usize> {
        Ok(self.state()?.frames.len())
    }

    /// Handles of the resident pages among `pids`. The cache mutex is released
    /// before the caller touches any page latch.
    fn resident_pages(&self, pids: &[PageId]) -> CacheResult<Vec<(PageId, PageRef)>> {
        let state = self.state()?;
        Ok(pids
            .iter()
            .filter_map(|pid| {
                state
                    .frames
                    .get(pid)
                    .map(|frame| (*pid, Arc::clone(&frame.page)))
            })
            .collect())
    }

    /// Logs and writes one dirty page, then marks it clean. When `owner` is
    /// set, pages dirtied by other transactions are left alone. Clean pages are
    /// only read-latched. Returns whether anything was written.
    fn flush_page(&self, pid: PageId, page: &PageRef, owner: Option<TransactionId>) -> CacheResult<bool> {
        let dirtier = {
            let guard = page
                .read()
                .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
            match guard.dirtied_by() {
                Some(dirtier) if owner.map_or(true, |owner| owner == dirtier) => dirtier,
                _ => return Ok(false),
            }
        };

        let mut page = page
            .write()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
        // flushed by someone else in between
        if page.dirtied_by() != Some(dirtier) {
            return Ok(false);
        }

        {
            let mut log = self.log()?;
            log.log_write(dirtier, pid, page.get_before_image(), page.get_data())?;
            log.force()?;
        }

        let file = self.file(pid.table_id)?;
        if let Err(e) = file.write_page(&page) {
            error!("Failed to flush page {}: {}", pid, e);
            return Err(e);
        }
        page.mark_dirty(None);
        page.set_before_image();
        debug!("Flushed page {} dirtied by {}", pid, dirtier);
        Ok(true)
    }

    /// Write every dirty resident page. Pages of running transactions reach the
    /// file too, so this bypasses no-steal; meant for shutdown and checkpoints.
    pub fn flush_all(&self) -> CacheResult<()> {
        let mut pids: Vec<PageId> = self.state()?.frames.keys().copied().collect();
        pids.sort();
        info!("Flushing {} resident pages", pids.len());
        for (pid, page) in self.resident_pages(&pids)? {
            self.flush_page(pid, &page, None)?;
        }
        Ok(())
    }

    /// Write the dirty pages among those `tid` holds locks on
    pub fn flush_pages(&self, tid: TransactionId) -> CacheResult<()> {
        let pids = self.lock_manager.pages_held(tid)?;
        for (pid, page) in self.resident_pages(&pids)? {
            self.flush_page(pid, &page, None)?;
        }
        Ok(())
    }

    /// End `tid`: on commit write its dirty pages, on abort restore them to their
    /// before-images. Locks are released last, whatever the outcome.
    pub fn complete(&self, tid: TransactionId, commit: bool) -> CacheResult<()> {
        let pids = self.lock_manager.pages_held(tid)?;
        let outcome = if commit {
            self.commit_pages(tid, &pids)
        } else {
            self.rollback_pages(tid, &pids)
        };
        let released = self.lock_manager.release_all(tid);

        match &outcome {
            Ok(()) => info!(
                "{} {} ({} pages locked)",
                tid,
                if commit { "committed" } else { "aborted" },
                pids.len()
            ),
            Err(e) => error!("{} failed to complete: {}", tid, e),
        }
        outcome?;
        Ok(released?)
    }

    /// Shorthand for committing `tid`
    pub fn transaction_complete(&self, tid: TransactionId) -> CacheResult<()> {
        self.complete(tid, true)
    }

    fn commit_pages(&self, tid: TransactionId, pids: &[PageId]) -> CacheResult<()> {
        let mut written = 0;
        for (pid, page) in self.resident_pages(pids)? {
            if self.flush_page(pid, &page, Some(tid))? {
                written += 1;
            }
        }

        let mut log = self.log()?;
        log.log_commit(tid)?;
        log.force()?;
        debug!("{} wrote {} pages on commit", tid, written);
        Ok(())
    }

    fn rollback_pages(&self, tid: TransactionId, pids: &[PageId]) -> CacheResult<()> {
        for (pid, page) in self.resident_pages(pids)? {
            let dirtied = page
                .read()
                .map_err(|e| CacheError::LockPoisoned(e.to_string()))?
                .dirtied_by()
                == Some(tid);
            if !dirtied {
                continue;
            }
            page.write()
                .map_err(|e| CacheError::LockPoisoned(e.to_string()))?
                .restore_before_image();
            debug!("Rolled back page {} for {}", pid, tid);
        }

        self.log()?.log_abort(tid)?;
        Ok(())
    }
}

impl PageSource for PageCache {
    fn fetch(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> CacheResult<PageRef> {
        PageCache::fetch(self, tid, pid, perm)
    }
}
