//! 定时器引擎契约
//! Timer Engine Contract
//!
//! 三种引擎共享的操作集。内部表示各不相同（链表节点、堆索引、槽位链），
//! 但对驱动器暴露统一的概念签名。
//!
//! The operation set shared by the three engines. Internal representations
//! differ (list nodes, heap indices, slot chains), but the conceptual
//! signature exposed to the driver is uniform.

use crate::config::EngineConfig;
use crate::connection::ConnectionId;
use crate::error::Result;
use crate::timer::event::TimerCallback;
use crate::timer::heap::MinHeapEngine;
use crate::timer::list::SortedListEngine;
use crate::timer::wheel::TimerWheelEngine;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// 定时器条目ID，即 `add` 返回、`cancel`/`adjust` 消费的不透明句柄
/// Timer entry ID, the opaque handle returned by `add` and consumed by
/// `cancel`/`adjust`
pub type TimerEntryId = u64;

/// 三种引擎设计
/// The three engine designs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// 升序双向链表：O(n) 插入/重调度，O(1) 头部到期检测
    /// Ascending doubly linked list: O(n) insert/adjust, O(1) expiry at head
    SortedList,
    /// 数组式二叉最小堆：O(log n) 插入/弹出，惰性取消
    /// Array-backed binary min-heap: O(log n) insert/pop, lazy cancellation
    MinHeap,
    /// 固定槽位时间轮：摊还 O(1) 插入/取消
    /// Fixed-slot timing wheel: amortized O(1) insert/cancel
    TimerWheel,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::SortedList => write!(f, "sorted-list"),
            EngineKind::MinHeap => write!(f, "min-heap"),
            EngineKind::TimerWheel => write!(f, "timer-wheel"),
        }
    }
}

/// 所有引擎必须提供的操作
/// Operations every engine must provide
///
/// 引擎内部不做任何同步：假定由唯一的驱动器在单线程上协作式访问（见
/// `driver` 模块）。`tick()` 的开销只与本次到期的定时器数量有关，不等待
/// 任何 I/O。回调不得重入同一引擎实例。
///
/// Engines are not internally synchronized: they assume single-threaded,
/// cooperative access from exactly one driver (see the `driver` module).
/// `tick()` is bounded by the number of timers expiring in that pass, never
/// by an I/O wait. Callbacks must not re-enter the same engine instance.
pub trait TimerEngine<C: TimerCallback>: Send {
    /// 以相对于引擎当前时刻的延迟插入一个定时器，返回其句柄。
    ///
    /// 链表与堆引擎拒绝零延迟（`Error::ZeroDelay`）；时间轮引擎把小于一个
    /// 槽间隔的延迟（含零）钳制为下一次 tick 触发。调用方不得假设三种引擎
    /// 对边界延迟的行为一致。
    ///
    /// Inserts a timer at a delay relative to the engine's current instant and
    /// returns its handle.
    ///
    /// The list and heap engines reject a zero delay (`Error::ZeroDelay`); the
    /// wheel clamps any sub-interval delay (including zero) to fire on the
    /// very next tick. Callers must not assume the engines agree on boundary
    /// delays.
    fn add(&mut self, connection_id: ConnectionId, delay: Duration, callback: C)
    -> Result<TimerEntryId>;

    /// 移除或墓碑化一个定时器。对已触发/已取消的句柄幂等（返回 false）。
    /// Removes or tombstones a timer. Idempotent on an already-fired or
    /// already-cancelled handle (returns false).
    fn cancel(&mut self, entry_id: TimerEntryId) -> bool;

    /// 重调度一个既有定时器。
    ///
    /// 链表引擎原地摘除再按序重插（句柄不变，O(n)）。堆引擎墓碑化旧槽位后
    /// 重新插入（返回新句柄，O(log n) 加延迟回收）。时间轮重新计算槽位后
    /// 重新链入（句柄不变，O(1)）。对陈旧句柄返回 `Ok(None)`，不视为错误。
    ///
    /// Reschedules an existing timer.
    ///
    /// The list engine detaches and re-runs placement (same handle, O(n)).
    /// The heap tombstones the old slot and reinserts (fresh handle, O(log n)
    /// plus deferred reclaim). The wheel relinks into the recomputed slot
    /// (same handle, O(1)). A stale handle yields `Ok(None)`, never an error.
    fn adjust(&mut self, entry_id: TimerEntryId, new_delay: Duration)
    -> Result<Option<TimerEntryId>>;

    /// 将引擎的时钟推进恰好一个固定间隔，并触发所有截至该时刻到期的定时器。
    /// 返回本次触发的数量。引擎不自我调度；节奏由驱动器保证。
    ///
    /// Advances the engine's clock by exactly one fixed interval and fires
    /// every timer whose deadline has elapsed as of this advance. Returns how
    /// many fired. Engines do not self-schedule; cadence is the driver's job.
    fn tick(&mut self) -> usize;

    /// 最近一个即将到期的时刻。链表/堆报告真实的最早截止时间；时间轮没有
    /// 全局序，改为报告下一次 tick 的时刻。空引擎返回 `None`。
    ///
    /// The nearest upcoming deadline. The list/heap report the true earliest
    /// deadline; the wheel has no global order and reports the next tick
    /// instant instead. `None` when empty.
    fn next_expiry(&self) -> Option<Instant>;

    /// 当前仍被跟踪的定时器数量（堆引擎计入墓碑）。
    /// Number of timers still tracked (the heap counts tombstones).
    fn timer_count(&self) -> usize;

    /// 引擎是否为空。
    /// Whether the engine is empty.
    fn is_empty(&self) -> bool {
        self.timer_count() == 0
    }

    /// 本引擎的设计种类。
    /// Which design this engine is.
    fn kind(&self) -> EngineKind;
}

/// 按配置实例化一种引擎
/// Instantiate one engine per the configuration
pub fn build_engine<C: TimerCallback>(config: &EngineConfig) -> Result<Box<dyn TimerEngine<C>>> {
    config.validate()?;
    let engine: Box<dyn TimerEngine<C>> = match config.kind {
        EngineKind::SortedList => Box::new(SortedListEngine::new(config.tick_interval)),
        EngineKind::MinHeap => Box::new(MinHeapEngine::new(
            config.heap_capacity,
            config.tick_interval,
        )?),
        EngineKind::TimerWheel => Box::new(TimerWheelEngine::new(
            config.wheel_slots,
            config.tick_interval,
        )?),
    };
    Ok(engine)
}
