//! 定义了连接上下文与由驱动器和拥有者共享的连接表。
//! Defines the connection context and the connection table shared between the
//! driver and the owning layer.

use crate::timer::TimerEntryId;
use bytes::BytesMut;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Connection ID, used to identify which connection a timer belongs to.
/// 连接ID，用于标识定时器属于哪个连接。
pub type ConnectionId = u32;

/// Per-connection state tracked by the timeout layer.
///
/// The timer subsystem holds only the `ConnectionId`; this context holds the
/// symmetric non-owning handle back to the connection's active timer. Neither
/// side frees the other: the engine owns timer storage, the table owns this.
///
/// 超时层跟踪的每连接状态。
///
/// 定时器子系统只持有 `ConnectionId`；此上下文持有指回该连接当前定时器的对称
/// 非拥有句柄。双方互不释放对方：引擎拥有定时器存储，连接表拥有本结构。
#[derive(Debug)]
pub struct ConnectionContext {
    /// The peer's address.
    /// 对端地址。
    pub peer_addr: SocketAddr,
    /// Opaque token for the registered descriptor, owned by the accept loop.
    /// 已注册描述符的不透明令牌，由接受循环拥有。
    pub token: u64,
    /// Inbound staging buffer.
    /// 入站暂存缓冲区。
    pub read_buf: BytesMut,
    /// Handle of the connection's pending timer, if any.
    /// 该连接当前挂起的定时器句柄（如有）。
    pub timer: Option<TimerEntryId>,
}

impl ConnectionContext {
    /// Creates a context with an empty read buffer and no timer attached yet.
    /// 创建一个读缓冲区为空、尚未挂接定时器的上下文。
    pub fn new(peer_addr: SocketAddr, token: u64, read_buffer_capacity: usize) -> Self {
        Self {
            peer_addr,
            token,
            read_buf: BytesMut::with_capacity(read_buffer_capacity),
            timer: None,
        }
    }
}

/// The table of live connections, keyed by their stable id.
///
/// Cloneable and shareable: the accept/connection-table layer inspects contexts
/// while the driver task inserts and evicts them.
///
/// 存活连接表，以稳定的连接ID为键。
///
/// 可克隆、可共享：接受循环/连接表层读取上下文，驱动器任务插入与逐出。
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<DashMap<ConnectionId, ConnectionContext>>,
}

impl ConnectionTable {
    /// Creates an empty table.
    /// 创建空表。
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a context under `id`, replacing any previous occupant.
    /// 在 `id` 下插入上下文，替换旧占用者。
    pub fn insert(&self, id: ConnectionId, ctx: ConnectionContext) {
        self.inner.insert(id, ctx);
    }

    /// Removes and returns the context for `id`.
    /// 移除并返回 `id` 对应的上下文。
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionContext> {
        self.inner.remove(&id).map(|(_, ctx)| ctx)
    }

    /// Whether `id` is currently live.
    /// `id` 当前是否存活。
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.contains_key(&id)
    }

    /// Stores the timer back-reference for `id`. Returns false if the
    /// connection is gone.
    ///
    /// 为 `id` 存储定时器反向引用。连接已不存在时返回 false。
    pub fn set_timer(&self, id: ConnectionId, timer: Option<TimerEntryId>) -> bool {
        match self.inner.get_mut(&id) {
            Some(mut ctx) => {
                ctx.timer = timer;
                true
            }
            None => false,
        }
    }

    /// The timer handle currently attached to `id`, if any.
    /// 当前挂接在 `id` 上的定时器句柄（如有）。
    pub fn timer_of(&self, id: ConnectionId) -> Option<TimerEntryId> {
        self.inner.get(&id).and_then(|ctx| ctx.timer)
    }

    /// The peer address recorded for `id`.
    /// 记录在 `id` 上的对端地址。
    pub fn peer_addr_of(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.inner.get(&id).map(|ctx| ctx.peer_addr)
    }

    /// Number of live connections.
    /// 存活连接数。
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the table is empty.
    /// 表是否为空。
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
