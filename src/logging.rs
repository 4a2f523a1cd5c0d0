use std::io::Write;

/// systemd sets this when stdout is connected to the journal
const JOURNAL_STREAM: &str = "JOURNAL_STREAM";

/// Log to stdout. Under systemd every line carries its syslog priority as
/// an sd-daemon `<N>` prefix, so the journal keeps alerts apart from
/// informational lines.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.target(env_logger::Target::Stdout);

    if std::env::var_os(JOURNAL_STREAM).is_some() {
        builder.format(|buf, record| {
            writeln!(buf, "<{}>{}", sd_priority(record.level()), record.args())
        });
    }

    builder.init();
}

/// syslog priority for a log level: LOG_ERR, LOG_WARNING, LOG_INFO, LOG_DEBUG
pub fn sd_priority(level: log::Level) -> u8 {
    match level {
        log::Level::Error => 3,
        log::Level::Warn => 4,
        log::Level::Info => 6,
        log::Level::Debug | log::Level::Trace => 7,
    }
}
