//! 超时驱动器模块
//! Timeout Driver Module
//!
//! 该模块实现了事件循环驱动器：一个独立的 tokio 任务，拥有所配置的定时器
//! 引擎和连接表，以固定节奏向引擎发送"推进一个间隔"的脉冲，并处理连接
//! 生命周期命令（接受/活跃/关闭）。所有定时器变更都被约束在这一个任务上，
//! 引擎因此无须任何内部同步。
//!
//! This module implements the event-loop driver: a dedicated tokio task that
//! owns the configured timer engine and the connection table, delivers the
//! periodic "advance one interval" pulse to the engine at a steady cadence,
//! and processes connection lifecycle commands (accepted/active/closed). All
//! timer mutation is confined to this single task, which is why the engines
//! carry no internal synchronization.

pub mod commands;
pub mod core;
pub mod handle;

pub use commands::{
    ChannelSink, DriverCommand, DriverError, DriverStats, EvictionNotice, EvictionSink,
};
pub use core::TimeoutDriver;
pub use handle::{DriverHandle, start_timeout_driver};
