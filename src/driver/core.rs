//! 超时驱动器核心实现
//! Timeout driver core implementation
//!
//! 本模块包含驱动器任务的核心逻辑：在命令通道与滴答间隔之间 select，
//! 把生命周期事件翻译成引擎操作，并在每次滴答后把到期连接逐出连接表。
//!
//! This module contains the core logic of the driver task: selecting between
//! the command channel and the tick interval, translating lifecycle events
//! into engine operations, and evicting expired connections from the table
//! after every tick.

use crate::config::Config;
use crate::connection::{ConnectionContext, ConnectionId, ConnectionTable};
use crate::error::Result;
use crate::timer::{SenderCallback, TimerEngine, TimerEventData, build_engine};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, trace, warn};

use super::commands::{DriverCommand, DriverError, DriverStats, EvictionSink};

/// 超时驱动器任务
/// Timeout driver task
pub struct TimeoutDriver<S: EvictionSink> {
    /// 所配置的定时器引擎
    /// The configured timer engine
    engine: Box<dyn TimerEngine<SenderCallback>>,
    /// 与连接拥有者共享的连接表
    /// Connection table shared with the connection owner
    table: ConnectionTable,
    /// 命令接收通道
    /// Command receiver channel
    command_rx: mpsc::Receiver<DriverCommand>,
    /// 引擎回调写入、驱动器在滴答后排空的到期事件通道
    /// Expiry channel: engine callbacks write, the driver drains after a tick
    expired_tx: mpsc::Sender<TimerEventData>,
    expired_rx: mpsc::Receiver<TimerEventData>,
    /// 逐出通知的下游
    /// Downstream for eviction notices
    sink: S,
    config: Config,
    expired_total: u64,
    cancelled_total: u64,
    adjusted_total: u64,
}

impl<S: EvictionSink> TimeoutDriver<S> {
    /// 创建新的驱动器及其命令发送端
    /// Create a new driver and its command sender
    pub fn new(
        config: Config,
        sink: S,
    ) -> Result<(Self, mpsc::Sender<DriverCommand>, ConnectionTable)> {
        config.validate()?;
        let engine = build_engine::<SenderCallback>(&config.engine)?;
        let (command_tx, command_rx) = mpsc::channel(config.driver.command_buffer);
        // 到期事件在同一次 select 轮内即被排空，容量只需覆盖单次滴答的
        // 最大触发量。
        // Expiry events are drained within the same select round; capacity
        // only needs to cover one tick's worth of firings.
        let (expired_tx, expired_rx) = mpsc::channel(config.driver.command_buffer);
        let table = ConnectionTable::new();
        let driver = Self {
            engine,
            table: table.clone(),
            command_rx,
            expired_tx,
            expired_rx,
            sink,
            config,
            expired_total: 0,
            cancelled_total: 0,
            adjusted_total: 0,
        };
        Ok((driver, command_tx, table))
    }

    /// 运行驱动器主循环
    /// Run the driver main loop
    pub async fn run(mut self) {
        let tick_interval = self.config.engine.tick_interval;
        info!(
            engine = %self.engine.kind(),
            tick_ms = tick_interval.as_millis(),
            "Timeout driver started"
        );

        // 第一次滴答安排在整整一个间隔之后，引擎时钟与墙钟节奏对齐。
        // The first tick lands one full interval from now, keeping the
        // engine clock in step with the wall cadence.
        let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);

        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        // 所有句柄都被丢弃，无人再能驱动我们。
                        // Every handle is gone; nobody can drive us anymore.
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.advance().await;
                }
            }
        }

        info!("Timeout driver shutdown completed");
    }

    /// 处理一条驱动器命令
    /// Handle one driver command
    ///
    /// # Returns
    /// 返回 false 表示应该关闭任务
    /// Returns false if the task should shut down
    async fn handle_command(&mut self, command: DriverCommand) -> bool {
        match command {
            DriverCommand::ConnectionAccepted {
                peer_addr,
                token,
                response_tx,
            } => {
                let result = self.accept_connection(peer_addr, token);
                if response_tx.send(result).is_err() {
                    warn!("Failed to send accept response");
                }
            }
            DriverCommand::ConnectionActive {
                connection_id,
                response_tx,
            } => {
                let refreshed = self.refresh_connection(connection_id);
                if response_tx.send(refreshed).is_err() {
                    warn!(connection_id, "Failed to send activity response");
                }
            }
            DriverCommand::ConnectionClosed {
                connection_id,
                response_tx,
            } => {
                let removed = self.close_connection(connection_id);
                if response_tx.send(removed).is_err() {
                    warn!(connection_id, "Failed to send close response");
                }
            }
            DriverCommand::GetStats { response_tx } => {
                let stats = DriverStats {
                    engine: self.engine.kind(),
                    active_connections: self.table.len(),
                    pending_timers: self.engine.timer_count(),
                    expired_total: self.expired_total,
                    cancelled_total: self.cancelled_total,
                    adjusted_total: self.adjusted_total,
                };
                if response_tx.send(stats).is_err() {
                    warn!("Failed to send stats response");
                }
            }
            DriverCommand::Shutdown => {
                return false;
            }
        }
        true
    }

    /// 登记新连接并挂上空闲定时器
    /// Register a new connection and arm its idle timer
    fn accept_connection(
        &mut self,
        peer_addr: SocketAddr,
        token: u64,
    ) -> std::result::Result<ConnectionId, DriverError> {
        let connection_id = self.allocate_connection_id();
        let entry_id = self.engine.add(
            connection_id,
            self.config.driver.idle_timeout,
            SenderCallback::new(self.expired_tx.clone()),
        )?;

        let mut ctx =
            ConnectionContext::new(peer_addr, token, self.config.driver.read_buffer_capacity);
        ctx.timer = Some(entry_id);
        self.table.insert(connection_id, ctx);

        debug!(
            connection_id,
            peer = %peer_addr,
            entry_id,
            "Connection accepted, idle timer armed"
        );
        Ok(connection_id)
    }

    /// 活动观察：把连接的截止时间推到一个完整的空闲窗口之后
    /// Activity observed: push the connection's deadline a full idle window out
    fn refresh_connection(&mut self, connection_id: ConnectionId) -> bool {
        let Some(entry_id) = self.table.timer_of(connection_id) else {
            trace!(connection_id, "Activity on unknown connection");
            return false;
        };
        match self
            .engine
            .adjust(entry_id, self.config.driver.idle_timeout)
        {
            Ok(Some(new_entry_id)) => {
                // 堆引擎重插后句柄会变，反向引用随之更新。
                // The heap hands back a fresh handle after reinsertion; the
                // back-reference follows it.
                self.table.set_timer(connection_id, Some(new_entry_id));
                self.adjusted_total += 1;
                trace!(connection_id, entry_id = new_entry_id, "Idle deadline extended");
                true
            }
            Ok(None) => {
                // 定时器已触发或已取消，这次竞争由到期一方赢得。
                // The timer already fired or was cancelled; expiry won this race.
                trace!(connection_id, "Deadline extension raced a fired timer");
                false
            }
            Err(e) => {
                warn!(connection_id, error = %e, "Engine rejected deadline extension");
                false
            }
        }
    }

    /// 连接关闭：取消其定时器并移除上下文
    /// Connection closed: cancel its timer and drop its context
    fn close_connection(&mut self, connection_id: ConnectionId) -> bool {
        let Some(ctx) = self.table.remove(connection_id) else {
            trace!(connection_id, "Close on unknown connection");
            return false;
        };
        if let Some(entry_id) = ctx.timer {
            self.engine.cancel(entry_id);
        }
        self.cancelled_total += 1;
        debug!(connection_id, peer = %ctx.peer_addr, "Connection closed, timer cancelled");
        true
    }

    /// 推进引擎一个间隔，然后逐出所有本次到期的连接
    /// Advance the engine one interval, then evict every connection that
    /// expired in this pass
    async fn advance(&mut self) {
        let fired = self.engine.tick();
        if fired > 0 {
            debug!(fired, "Engine tick fired timers");
        }
        while let Ok(event) = self.expired_rx.try_recv() {
            self.evict(event.connection_id).await;
        }
    }

    async fn evict(&mut self, connection_id: ConnectionId) {
        match self.table.remove(connection_id) {
            Some(ctx) => {
                self.expired_total += 1;
                info!(connection_id, peer = %ctx.peer_addr, "Idle connection expired");
                self.sink
                    .on_evicted(super::commands::EvictionNotice {
                        connection_id,
                        peer_addr: ctx.peer_addr,
                        token: ctx.token,
                    })
                    .await;
            }
            // 到期和显式关闭之间的竞争；输掉的一方到这里就结束了。
            // Expiry raced an explicit close; the losing side ends here.
            None => trace!(connection_id, "Expiry event for a connection already gone"),
        }
    }

    /// 随机分配一个未被占用的连接ID
    /// Allocate a random, unoccupied connection id
    fn allocate_connection_id(&self) -> ConnectionId {
        loop {
            let candidate: ConnectionId = rand::random();
            if !self.table.contains(candidate) {
                return candidate;
            }
        }
    }
}
