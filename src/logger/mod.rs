use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Environment variable consulted when no level flag is passed
pub const LOG_ENV: &str = "RUSTY_TXN_LOG";

const CRATE_TARGET: &str = "rusty_txn";

/// Most verbose level this crate logs at. Other crates are capped at `Warn`.
static MAX_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Info as usize);

fn level_from_usize(value: usize) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn max_level() -> LevelFilter {
    level_from_usize(MAX_LEVEL.load(Ordering::Relaxed))
}

/// Transactions run on their own threads, so every line names its thread
struct TxnLogger;

impl Log for TxnLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let ours = metadata.target().starts_with(CRATE_TARGET);
        metadata.level() <= max_level() && (ours || metadata.level() <= Level::Warn)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let line = format_record(record, thread.name().unwrap_or("unnamed"), max_level());
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// `[time level thread target] message`, with `file:line` added at debug and finer
fn format_record(record: &Record, thread: &str, level: LevelFilter) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let location = match (level >= LevelFilter::Debug, record.file(), record.line()) {
        (true, Some(file), Some(line)) => format!(" {}:{}", file, line),
        _ => String::new(),
    };
    format!(
        "[{} {:<5} {} {}{}] {}",
        now,
        record.level(),
        thread,
        record.target(),
        location,
        record.args()
    )
}

/// `--trace` and `--debug` win over `env`; an unparsable `env` falls back to `Info`
fn resolve_level<I, S>(args: I, env: Option<String>) -> LevelFilter
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut level = None;
    for arg in args {
        match arg.as_ref() {
            "--trace" => level = Some(LevelFilter::Trace),
            "--debug" if level != Some(LevelFilter::Trace) => level = Some(LevelFilter::Debug),
            _ => {}
        }
    }
    level
        .or_else(|| env.and_then(|value| value.trim().parse().ok()))
        .unwrap_or(LevelFilter::Info)
}

/// Level for the current process from its arguments and `RUSTY_TXN_LOG`
pub fn level_from_env_and_args() -> LevelFilter {
    resolve_level(std::env::args(), std::env::var(LOG_ENV).ok())
}

static LOGGER: TxnLogger = TxnLogger;

/// Install the logger. Fails if another logger is already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    MAX_LEVEL.store(level as usize, Ordering::Relaxed);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_line(level: LevelFilter) -> String {
        format_record(
            &Record::builder()
                .args(format_args!("page {} loaded", 3))
                .level(Level::Info)
                .target("rusty_txn::buffer")
                .file(Some("src/buffer/mod.rs"))
                .line(Some(42))
                .build(),
            "worker-1",
            level,
        )
    }

    #[test]
    fn test_format_record() {
        assert!(record_line(LevelFilter::Info).ends_with("INFO  worker-1 rusty_txn::buffer] page 3 loaded"));
        assert!(record_line(LevelFilter::Debug)
            .ends_with("INFO  worker-1 rusty_txn::buffer src/buffer/mod.rs:42] page 3 loaded"));
    }

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level(["demo"], None), LevelFilter::Info);
        assert_eq!(resolve_level(["demo", "--debug"], None), LevelFilter::Debug);
        assert_eq!(resolve_level(["--trace", "--debug"], None), LevelFilter::Trace);
        assert_eq!(resolve_level(["demo"], Some("warn".to_string())), LevelFilter::Warn);
        assert_eq!(resolve_level(["--debug"], Some("error".to_string())), LevelFilter::Debug);
        assert_eq!(resolve_level(["demo"], Some("loud".to_string())), LevelFilter::Info);
    }

    #[test]
    fn test_other_crates_capped_at_warn() {
        MAX_LEVEL.store(LevelFilter::Debug as usize, Ordering::Relaxed);
        let ours = Metadata::builder().level(Level::Debug).target("rusty_txn::lock").build();
        let theirs = Metadata::builder().level(Level::Info).target("tempfile").build();
        let theirs_warn = Metadata::builder().level(Level::Warn).target("tempfile").build();

        assert!(LOGGER.enabled(&ours));
        assert!(!LOGGER.enabled(&theirs));
        assert!(LOGGER.enabled(&theirs_warn));
        assert_eq!(max_level(), LevelFilter::Debug);
        MAX_LEVEL.store(LevelFilter::Info as usize, Ordering::Relaxed);
    }
}
