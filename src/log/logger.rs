/// Installs `env_logger`; `RUST_LOG` wins over `default_level`.
pub fn init_logger(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    // A second init (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
    log::debug!(target: "planexec", "logger initialized at {}", default_level);
}
