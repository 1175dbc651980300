//! 超时驱动器句柄
//! Timeout driver handle
//!
//! 本模块包含驱动器任务的客户端句柄，提供与驱动器通信的高级接口，以及
//! 启动驱动器任务的便捷函数。
//!
//! This module contains the client handle for the driver task, providing
//! high-level interfaces for communicating with it, and a convenient function
//! for starting the driver task.

use crate::config::Config;
use crate::connection::{ConnectionId, ConnectionTable};
use crate::error::Result;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::commands::{ChannelSink, DriverCommand, DriverError, DriverStats, EvictionNotice};
use super::core::TimeoutDriver;

/// 驱动器任务的句柄，由连接拥有者持有
/// Handle to the driver task, held by the connection owner
#[derive(Debug, Clone)]
pub struct DriverHandle {
    /// 命令发送通道
    /// Command sender channel
    command_tx: mpsc::Sender<DriverCommand>,
}

impl DriverHandle {
    /// 创建新的任务句柄
    /// Create new task handle
    pub fn new(command_tx: mpsc::Sender<DriverCommand>) -> Self {
        Self { command_tx }
    }

    /// 登记一个刚被接受的连接，返回其连接ID
    /// Register a freshly accepted connection, returning its connection id
    pub async fn connection_accepted(
        &self,
        peer_addr: SocketAddr,
        token: u64,
    ) -> std::result::Result<ConnectionId, DriverError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(DriverCommand::ConnectionAccepted {
                peer_addr,
                token,
                response_tx,
            })
            .await
            .map_err(|_| DriverError::DriverShutdown)?;
        response_rx.await.map_err(|_| DriverError::DriverShutdown)?
    }

    /// 报告连接上的活动，把其空闲截止时间向后推。到期已抢先时返回 false。
    /// Report activity on a connection, pushing its idle deadline back.
    /// Returns false when expiry already won.
    pub async fn connection_active(
        &self,
        connection_id: ConnectionId,
    ) -> std::result::Result<bool, DriverError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(DriverCommand::ConnectionActive {
                connection_id,
                response_tx,
            })
            .await
            .map_err(|_| DriverError::DriverShutdown)?;
        response_rx.await.map_err(|_| DriverError::DriverShutdown)
    }

    /// 报告连接已关闭。对未知或已逐出的连接幂等。
    /// Report a connection as closed. Idempotent on unknown or already
    /// evicted connections.
    pub async fn connection_closed(
        &self,
        connection_id: ConnectionId,
    ) -> std::result::Result<bool, DriverError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(DriverCommand::ConnectionClosed {
                connection_id,
                response_tx,
            })
            .await
            .map_err(|_| DriverError::DriverShutdown)?;
        response_rx.await.map_err(|_| DriverError::DriverShutdown)
    }

    /// 获取统计信息快照
    /// Get a statistics snapshot
    pub async fn stats(&self) -> std::result::Result<DriverStats, DriverError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(DriverCommand::GetStats { response_tx })
            .await
            .map_err(|_| DriverError::DriverShutdown)?;
        response_rx.await.map_err(|_| DriverError::DriverShutdown)
    }

    /// 关闭驱动器任务
    /// Shut the driver task down
    pub async fn shutdown(&self) -> std::result::Result<(), DriverError> {
        self.command_tx
            .send(DriverCommand::Shutdown)
            .await
            .map_err(|_| DriverError::DriverShutdown)
    }
}

/// 启动驱动器任务
/// Start the driver task
///
/// 返回客户端句柄、共享连接表，以及空闲超时逐出通知的接收端。
/// Returns the client handle, the shared connection table, and the receiving
/// end of idle-timeout eviction notices.
pub fn start_timeout_driver(
    config: Config,
) -> Result<(DriverHandle, ConnectionTable, mpsc::Receiver<EvictionNotice>)> {
    let (eviction_tx, eviction_rx) = mpsc::channel(config.driver.eviction_buffer);
    let (driver, command_tx, table) = TimeoutDriver::new(config, ChannelSink::new(eviction_tx))?;

    tokio::spawn(driver.run());
    info!("Timeout driver task spawned");

    Ok((DriverHandle::new(command_tx), table, eviction_rx))
}
