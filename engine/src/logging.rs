/// Tracing subscriber setup for binaries and tests.
///
/// Defaults to `warn` level unless overridden by `KINESCOPE_LOG`.
#[cfg(feature = "logging")]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::builder()
        .with_env_var("KINESCOPE_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// No-op when the `logging` feature is disabled, so library consumers can
/// call `kinescope_engine::logging::init()` unconditionally without pulling
/// in `tracing-subscriber`.
#[cfg(not(feature = "logging"))]
pub fn init() {}
