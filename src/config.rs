//! 定义了定时器引擎和超时驱动器的可配置参数。
//! Defines configurable parameters for the timer engines and the timeout driver.

use crate::error::{Error, Result};
use crate::timer::EngineKind;
use std::time::Duration;

/// A structure containing all configurable parameters for the timeout layer.
///
/// 包含超时层所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// Timer-engine related parameters.
    /// 定时器引擎相关参数。
    pub engine: EngineConfig,

    /// Driver related parameters.
    /// 驱动器相关参数。
    pub driver: DriverConfig,
}

/// Timer-engine related parameters.
///
/// 定时器引擎相关参数。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Which of the three engine designs to instantiate.
    /// 实例化三种引擎设计中的哪一种。
    pub kind: EngineKind,
    /// The fixed interval one `tick()` call advances the engine's clock by.
    /// 每次 `tick()` 调用将引擎时钟推进的固定间隔。
    pub tick_interval: Duration,
    /// Number of slots in the wheel engine's ring. Ignored by the other engines.
    /// 时间轮引擎环上的槽位数。其他引擎忽略此项。
    pub wheel_slots: usize,
    /// Initial array capacity of the heap engine. It doubles transparently when
    /// full and never shrinks. Ignored by the other engines.
    ///
    /// 时间堆引擎的初始数组容量。装满时透明地翻倍，并且从不收缩。其他引擎忽略此项。
    pub heap_capacity: usize,
}

/// Driver related parameters.
///
/// 驱动器相关参数。
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long a connection may stay silent before it is torn down.
    /// 连接在被拆除之前可以保持静默的时长。
    pub idle_timeout: Duration,
    /// Capacity of the driver's command channel.
    /// 驱动器命令通道的容量。
    pub command_buffer: usize,
    /// Capacity of the eviction-notice channel handed back by
    /// `start_timeout_driver`.
    ///
    /// `start_timeout_driver` 返回的逐出通知通道的容量。
    pub eviction_buffer: usize,
    /// Initial capacity of each connection's inbound read buffer.
    /// 每个连接入站读缓冲区的初始容量。
    pub read_buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::SortedList,
            tick_interval: Duration::from_secs(1),
            wheel_slots: 60,
            heap_capacity: 64,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            command_buffer: 1024,
            eviction_buffer: 1024,
            read_buffer_capacity: 2048,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Checks the parameters an engine cannot be built from.
    /// 检查无法用于构建引擎的参数。
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::InvalidTickInterval);
        }
        if self.wheel_slots == 0 {
            return Err(Error::InvalidSlotCount);
        }
        if self.heap_capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(())
    }
}

impl Config {
    /// Validates the whole configuration at the driver boundary.
    /// 在驱动器边界校验整个配置。
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.driver.idle_timeout.is_zero() {
            return Err(Error::ZeroDelay);
        }
        Ok(())
    }
}
