//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the connection-timeout library.
/// 连接超时库的主要错误类型。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A timer was requested with a zero delay where the engine requires a
    /// positive one. The wheel engine clamps sub-interval delays instead.
    ///
    /// 在引擎要求正延迟的地方请求了零延迟的定时器。时间轮引擎对小于槽间隔的延迟
    /// 采取钳制而非拒绝。
    #[error("timer delay must be greater than zero")]
    ZeroDelay,

    /// A heap engine was bulk-loaded with more entries than its capacity.
    /// 时间堆引擎批量装载的条目数超过了其容量。
    #[error("heap capacity {capacity} is smaller than the {required} entries to load")]
    CapacityTooSmall { capacity: usize, required: usize },

    /// The configured heap capacity is zero.
    /// 配置的堆容量为零。
    #[error("heap capacity must be greater than zero")]
    ZeroCapacity,

    /// The configured wheel slot count is zero.
    /// 配置的时间轮槽位数为零。
    #[error("wheel slot count must be greater than zero")]
    InvalidSlotCount,

    /// The configured tick interval is zero.
    /// 配置的滴答间隔为零。
    #[error("tick interval must be greater than zero")]
    InvalidTickInterval,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
