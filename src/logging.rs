//! Tracing setup for the command-line front end.

use tracing_subscriber::{fmt, EnvFilter};

/// Maps `-v` repetitions to a level for this crate; other crates stay at warn.
pub fn level_filter(verbosity: u8) -> String {
    let base_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,smu_cycler={base_level},reqwest=warn,hyper=warn")
}

/// Installs a stderr subscriber. `RUST_LOG` wins over the verbosity flag.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(verbosity)));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_crate_level_only() {
        assert_eq!(level_filter(0), "warn,smu_cycler=warn,reqwest=warn,hyper=warn");
        assert!(level_filter(2).contains("smu_cycler=debug"));
        assert!(level_filter(9).contains("smu_cycler=trace"));
    }
}
