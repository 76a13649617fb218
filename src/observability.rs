//! Tracing setup (ambient stack). Level-mapping convention matches the
//! teacher's: `DISABLED` skips installing a subscriber entirely, and
//! `WARNING`/`CRITICAL` alias to `tracing`'s `WARN`/`ERROR`.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();
    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
