//! 定时器事件与回调定义
//! Timer Event and Callback Definitions
//!
//! 该模块定义了定时器到期时携带的数据，以及引擎触发的回调抽象。
//! 回调是同步的：`tick()` 在驱动器线程上按序运行每个回调直至完成，
//! 引擎不会阻塞也不会挂起。
//!
//! This module defines the data carried by an expiring timer and the callback
//! abstraction the engines invoke. Callbacks are synchronous: `tick()` runs
//! each one to completion on the driver thread, and engines never block or
//! suspend.

use crate::connection::ConnectionId;
use std::fmt;
use tokio::sync::mpsc;

/// 定时器事件数据
/// Timer event data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEventData {
    /// 到期定时器所属的连接
    /// The connection the expired timer belongs to
    pub connection_id: ConnectionId,
}

impl TimerEventData {
    /// 创建新的定时器事件数据
    /// Create new timer event data
    pub fn new(connection_id: ConnectionId) -> Self {
        Self { connection_id }
    }
}

impl fmt::Display for TimerEventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerEventData(conn: {})", self.connection_id)
    }
}

/// 定时器回调 trait
/// Timer callback trait
///
/// 在定时器创建时捕获，在其到期的那次 `tick()` 中被调用。一个被置空
/// （墓碑化）的回调永远不会被调用。
///
/// Captured at timer creation time and invoked during the `tick()` in which
/// the timer expires. A cleared (tombstoned) callback is never invoked.
pub trait TimerCallback: Send + 'static {
    /// 处理定时器超时事件
    /// Handle timer timeout event
    fn on_expire(&mut self, event_data: TimerEventData);
}

/// 基于 mpsc::Sender 的回调实现
/// mpsc::Sender-based callback implementation
#[derive(Debug, Clone)]
pub struct SenderCallback {
    sender: mpsc::Sender<TimerEventData>,
}

impl SenderCallback {
    /// 创建新的发送者回调
    /// Create new sender callback
    pub fn new(sender: mpsc::Sender<TimerEventData>) -> Self {
        Self { sender }
    }
}

impl TimerCallback for SenderCallback {
    fn on_expire(&mut self, event_data: TimerEventData) {
        // 使用 try_send 避免阻塞；投递失败只记录，绝不中断 tick
        // Use try_send to avoid blocking; delivery failure is logged, never
        // aborts the tick
        if let Err(e) = self.sender.try_send(event_data) {
            tracing::warn!(
                connection_id = event_data.connection_id,
                error = %e,
                "Failed to deliver timer expiry event"
            );
        }
    }
}

/// 基于闭包的回调实现
/// Closure-based callback implementation
#[derive(Clone)]
pub struct ClosureCallback<F>
where
    F: FnMut(TimerEventData) + Send + 'static,
{
    callback: F,
}

impl<F> ClosureCallback<F>
where
    F: FnMut(TimerEventData) + Send + 'static,
{
    /// 创建新的闭包回调
    /// Create new closure callback
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> fmt::Debug for ClosureCallback<F>
where
    F: FnMut(TimerEventData) + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureCallback")
            .field("callback", &"<closure>")
            .finish()
    }
}

impl<F> TimerCallback for ClosureCallback<F>
where
    F: FnMut(TimerEventData) + Send + 'static,
{
    fn on_expire(&mut self, event_data: TimerEventData) {
        (self.callback)(event_data)
    }
}

/// 空回调实现（用于测试或不需要处理回调的场景）
/// No-op callback implementation (for testing or scenarios where callback
/// handling is not needed)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl NoOpCallback {
    /// 创建新的空回调
    /// Create new no-op callback
    pub fn new() -> Self {
        Self
    }
}

impl TimerCallback for NoOpCallback {
    fn on_expire(&mut self, _event_data: TimerEventData) {
        // 什么都不做
        // Do nothing
    }
}
