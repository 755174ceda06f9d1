//! Tracing subscriber setup shared by both binaries

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` first, then `emg_relay=<level>` on top
pub fn env_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match format!("emg_relay={}", level).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(e) => {
            eprintln!("Ignoring invalid log level {:?}: {}", level, e);
            filter
        }
    }
}

/// Install the global fmt subscriber; logs go to stderr so stdout stays for data
pub fn init_tracing(level: &str) {
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .try_init();
}
