// Environment detection and logger setup.

use std::sync::OnceLock;

/// Cached environment mode.
static ENV_MODE: OnceLock<EnvMode> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Production,
    Development,
    Test,
}

/// Detect the current environment mode from `PORTAL_AUTH_ENV`, then `RUST_ENV`.
pub fn detect_env_mode() -> EnvMode {
    *ENV_MODE.get_or_init(|| {
        let env_val = std::env::var("PORTAL_AUTH_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        parse_env_mode(&env_val)
    })
}

fn parse_env_mode(value: &str) -> EnvMode {
    match value.to_lowercase().as_str() {
        "production" | "prod" => EnvMode::Production,
        "test" | "testing" => EnvMode::Test,
        _ => EnvMode::Development,
    }
}

pub fn is_production() -> bool {
    detect_env_mode() == EnvMode::Production
}

/// Read a non-empty environment variable.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Initialize the `tracing` subscriber with appropriate defaults.
///
/// `RUST_LOG` wins when set. Safe to call more than once; later calls are no-ops.
pub fn init_logger() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production() {
            EnvFilter::new("portal_auth=info")
        } else {
            EnvFilter::new("portal_auth=debug")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
