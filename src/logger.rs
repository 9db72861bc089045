use log::LevelFilter;
use std::io::Write;

const CRATE_NAME: &str = env!("CARGO_CRATE_NAME");

/// Filters for a `-v` count: `(everything, this crate)`.
///
/// 0 shows warnings, 1 adds this tool's own progress messages, 2 shows info
/// from every module and 3 or more enables debug output.
pub fn filters_for(verbosity: u8) -> (LevelFilter, LevelFilter) {
    match verbosity {
        0 => (LevelFilter::Warn, LevelFilter::Warn),
        1 => (LevelFilter::Warn, LevelFilter::Info),
        2 => (LevelFilter::Info, LevelFilter::Info),
        _ => (LevelFilter::Debug, LevelFilter::Debug),
    }
}

/// Initialize logging on stderr; `RUST_LOG` still applies on top.
pub fn init_logger(verbosity: u8) {
    let (global, own) = filters_for(verbosity);
    let _ = env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .filter_level(global)
        .filter_module(CRATE_NAME, own)
        .parse_default_env()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(filters_for(0), (LevelFilter::Warn, LevelFilter::Warn));
        assert_eq!(filters_for(1), (LevelFilter::Warn, LevelFilter::Info));
        assert_eq!(filters_for(2).0, LevelFilter::Info);
        assert_eq!(filters_for(3), (LevelFilter::Debug, LevelFilter::Debug));
        assert_eq!(filters_for(9), filters_for(3));
    }
}
