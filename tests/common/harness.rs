//! tests/common/harness.rs
use kestrel_timeout::config::Config;
use kestrel_timeout::timer::EngineKind;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "kestrel_timeout=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// 为集成测试压缩时间尺度的配置：50ms 滴答、200ms 空闲窗口。
/// A configuration on a compressed time scale for integration tests:
/// 50ms ticks, a 200ms idle window.
pub fn test_config(kind: EngineKind) -> Config {
    let mut config = Config::default();
    config.engine.kind = kind;
    config.engine.tick_interval = Duration::from_millis(50);
    config.engine.wheel_slots = 60;
    // 小容量起步，让增长路径在测试里真实走到
    // Start small so the growth path actually gets exercised in tests
    config.engine.heap_capacity = 4;
    config.driver.idle_timeout = Duration::from_millis(200);
    config
}

/// A distinct loopback peer address per test connection.
pub fn peer(n: u16) -> SocketAddr {
    format!("127.0.0.1:{}", 40000 + n)
        .parse()
        .expect("static loopback address")
}
