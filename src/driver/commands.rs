//! 驱动器命令定义
//! Driver command definitions
//!
//! 本模块包含驱动器的命令枚举、错误类型、统计信息与逐出通知，定义了
//! 连接拥有者与驱动器任务之间的通信协议。
//!
//! This module contains the driver's command enum, error types, statistics
//! and eviction notices, defining the communication protocol between the
//! connection owner and the driver task.

use crate::connection::ConnectionId;
use crate::timer::EngineKind;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// 驱动器命令
/// Driver commands
#[derive(Debug)]
pub enum DriverCommand {
    /// 连接已被接受：登记上下文并启动其空闲定时器
    /// A connection was accepted: register its context and start its idle timer
    ConnectionAccepted {
        peer_addr: SocketAddr,
        token: u64,
        response_tx: oneshot::Sender<Result<ConnectionId, DriverError>>,
    },
    /// 在连接上观察到活动：将其截止时间向后推
    /// Activity was observed on a connection: push its deadline back
    ConnectionActive {
        connection_id: ConnectionId,
        response_tx: oneshot::Sender<bool>,
    },
    /// 连接已关闭：取消其定时器并移除上下文
    /// A connection was closed: cancel its timer and drop its context
    ConnectionClosed {
        connection_id: ConnectionId,
        response_tx: oneshot::Sender<bool>,
    },
    /// 获取统计信息
    /// Get statistics
    GetStats {
        response_tx: oneshot::Sender<DriverStats>,
    },
    /// 关闭驱动器任务
    /// Shut the driver task down
    Shutdown,
}

/// 驱动器错误类型
/// Driver error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("timeout driver has been shut down")]
    DriverShutdown,
    #[error("timer engine rejected the operation: {0}")]
    Engine(#[from] crate::error::Error),
}

/// 一条逐出通知：某个连接因空闲超时被拆除
/// One eviction notice: a connection was torn down on idle timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionNotice {
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub token: u64,
}

/// 逐出事件的接收端抽象
/// Abstraction over the receiving side of eviction events
///
/// 驱动器在每个到期连接被移出连接表之后调用一次。投递失败由实现自行消化，
/// 绝不传播回驱动器。
///
/// Invoked by the driver once per expired connection, after it has been
/// removed from the table. Delivery failures are the implementation's to
/// swallow; they never propagate back into the driver.
#[async_trait]
pub trait EvictionSink: Send + 'static {
    async fn on_evicted(&mut self, notice: EvictionNotice);
}

/// 把逐出通知转发到 mpsc 通道的默认汇
/// The stock sink forwarding eviction notices into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EvictionNotice>,
}

impl ChannelSink {
    /// 创建新的通道汇
    /// Create new channel sink
    pub fn new(tx: mpsc::Sender<EvictionNotice>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EvictionSink for ChannelSink {
    async fn on_evicted(&mut self, notice: EvictionNotice) {
        if let Err(e) = self.tx.send(notice).await {
            tracing::warn!(
                connection_id = notice.connection_id,
                error = %e,
                "Failed to deliver eviction notice"
            );
        }
    }
}

/// 驱动器统计信息
/// Driver statistics
#[derive(Debug, Clone)]
pub struct DriverStats {
    /// 配置的引擎种类
    /// The configured engine kind
    pub engine: EngineKind,
    /// 存活连接数
    /// Number of live connections
    pub active_connections: usize,
    /// 引擎仍在跟踪的定时器数（堆引擎计入墓碑）
    /// Timers the engine still tracks (the heap counts tombstones)
    pub pending_timers: usize,
    /// 因空闲超时被逐出的连接总数
    /// Total connections evicted on idle timeout
    pub expired_total: u64,
    /// 因关闭而取消定时器的连接总数
    /// Total connections whose timer was cancelled on close
    pub cancelled_total: u64,
    /// 截止时间被推后的总次数
    /// Total deadline extensions
    pub adjusted_total: u64,
}

impl std::fmt::Display for DriverStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DriverStats {{ engine: {}, connections: {}, timers: {}, expired: {}, cancelled: {}, adjusted: {} }}",
            self.engine,
            self.active_connections,
            self.pending_timers,
            self.expired_total,
            self.cancelled_total,
            self.adjusted_total
        )
    }
}
