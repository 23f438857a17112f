pub mod api;
pub mod core;

/// 初始化日志；`RUST_LOG` 优先于传入的级别
pub fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
