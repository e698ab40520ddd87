use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the logger with custom formatting showing elapsed time.
///
/// If verbose is true, sets log level to Info, otherwise to Warn.
/// `RUST_LOG` still overrides per-module levels.
/// Output format: [HH:MM:SS] LEVEL: message
/// All output goes to stderr. Calling this more than once is a no-op.
pub fn init_logger(verbose: bool) {
    let start = *START_TIME.get_or_init(Instant::now);

    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(move |buf, record| {
            let elapsed = start.elapsed();
            let hours = elapsed.as_secs() / 3600;
            let minutes = (elapsed.as_secs() % 3600) / 60;
            let seconds = elapsed.as_secs() % 60;

            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {}: {}",
                hours,
                minutes,
                seconds,
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init();
}
