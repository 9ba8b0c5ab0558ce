//! Opt-in log output for examples and tests.

/// Development helper: initialize tracing subscriber when `RUST_LOG` is set.
///
/// Examples and tests can call `skiff::dev_tracing::init_tracing()` to see
/// the `[HANDSHAKE]`, `[Connection]` and `[Transport]` logs. This is a no-op
/// when `RUST_LOG` is not set or a global subscriber is already installed.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
