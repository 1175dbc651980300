//! 时间轮定时器引擎
//! Timer-Wheel Engine
//!
//! 固定槽位数的环，每个槽是一条无序双向链表的头；一个游标每次 tick 前进
//! 一格，对 N 取模回绕。槽间隔 TI 与槽数 N 共同决定整环跨度 N*TI；超过
//! 一整圈的延迟用圈数计数器表达。插入与取消均为摊还 O(1)。
//!
//! A ring of a fixed number of slots, each heading an unordered doubly linked
//! list; a single cursor advances one slot per tick, wrapping modulo N. The
//! slot interval TI and slot count N give the ring's span N*TI; delays longer
//! than one revolution are expressed with a rotation counter. Insertion and
//! cancellation are amortized O(1).
//!
//! 槽内触发顺序就是链表顺序（头插法，最近插入者先触发），不是全局截止时间
//! 顺序；调用方不得依赖槽内的任何次序。
//! In-slot firing order is list order (head insertion, most recent first),
//! not global deadline order; callers must not rely on any ordering within a
//! slot.

use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::timer::engine::{EngineKind, TimerEngine, TimerEntryId};
use crate::timer::event::{TimerCallback, TimerEventData};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 时间轮节点：剩余圈数、所属槽位和槽内链接
/// Wheel node: remaining rotations, owning slot and the in-slot links
#[derive(Debug)]
pub(super) struct WheelNode<C> {
    pub(super) connection_id: ConnectionId,
    /// 在所属槽位可以触发之前还要经过的整圈数
    /// Full revolutions left before the entry may fire in its slot
    pub(super) rotation: u64,
    /// 所属槽位下标
    /// Owning slot index
    pub(super) slot: usize,
    pub(super) callback: C,
    pub(super) prev: Option<TimerEntryId>,
    pub(super) next: Option<TimerEntryId>,
}

/// 时间轮引擎
/// Timer-wheel engine
#[derive(Debug)]
pub struct TimerWheelEngine<C> {
    /// 每个槽位的链表头
    /// Head of each slot's chain
    pub(super) slots: Vec<Option<TimerEntryId>>,
    /// 节点存储，以条目ID为键
    /// Node storage, keyed by entry id
    pub(super) nodes: HashMap<TimerEntryId, WheelNode<C>>,
    /// 游标当前指向的槽位
    /// The slot the cursor currently points at
    pub(super) current_slot: usize,
    /// 环上的槽位总数 N
    /// Total slot count N of the ring
    pub(super) slot_count: usize,
    /// 槽间隔 TI
    /// Slot interval TI
    tick_interval: Duration,
    /// 引擎的逻辑时钟
    /// The engine's logical clock
    pub(super) now: Instant,
    next_entry_id: TimerEntryId,
}

impl<C: TimerCallback> TimerWheelEngine<C> {
    /// 创建一个 N 槽、槽间隔为 `tick_interval` 的空时间轮
    /// Create an empty wheel of N slots at `tick_interval` per slot
    pub fn new(slot_count: usize, tick_interval: Duration) -> Result<Self> {
        if slot_count == 0 {
            return Err(Error::InvalidSlotCount);
        }
        if tick_interval.is_zero() {
            return Err(Error::InvalidTickInterval);
        }
        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, || None);
        Ok(Self {
            slots,
            nodes: HashMap::new(),
            current_slot: 0,
            slot_count,
            tick_interval,
            now: Instant::now(),
            next_entry_id: 1,
        })
    }

    /// 延迟换算为槽数。小于一个槽间隔的延迟（含零）钳制为 1，即在下一次
    /// tick 触发。
    ///
    /// Convert a delay to a tick count. A delay shorter than one slot
    /// interval (zero included) is clamped to 1, firing on the very next
    /// tick.
    fn ticks_for(&self, delay: Duration) -> u64 {
        let ticks = (delay.as_nanos() / self.tick_interval.as_nanos()) as u64;
        ticks.max(1)
    }

    /// 头插法把 `id` 链入 `slot`。
    /// Head-insert `id` into `slot`'s chain.
    fn link_front(&mut self, id: TimerEntryId, slot: usize) {
        let old_head = self.slots[slot];
        if let Some(head_id) = old_head {
            if let Some(head) = self.nodes.get_mut(&head_id) {
                head.prev = Some(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.slot = slot;
            node.prev = None;
            node.next = old_head;
        }
        self.slots[slot] = Some(id);
    }

    /// 把 `id` 从其槽位链中解开并移出存储。
    /// Unlink `id` from its slot chain and take it out of storage.
    fn unlink(&mut self, id: TimerEntryId) -> Option<WheelNode<C>> {
        let node = self.nodes.remove(&id)?;
        match node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(&p) {
                    prev.next = node.next;
                }
            }
            None => self.slots[node.slot] = node.next,
        }
        if let Some(x) = node.next {
            if let Some(next) = self.nodes.get_mut(&x) {
                next.prev = node.prev;
            }
        }
        Some(node)
    }
}

impl<C: TimerCallback> TimerEngine<C> for TimerWheelEngine<C> {
    fn add(
        &mut self,
        connection_id: ConnectionId,
        delay: Duration,
        callback: C,
    ) -> Result<TimerEntryId> {
        let ticks = self.ticks_for(delay);
        // 第 ticks 次 tick 时游标恰好落在目标槽上；恰为整圈数的延迟属于
        // 在那一刻结束的那一圈，因此圈数按 ticks-1 计。
        // On the ticks-th tick the cursor lands exactly on the target slot; a
        // delay of a whole number of revolutions belongs to the revolution
        // ending at that moment, so rotations count from ticks-1.
        let rotation = (ticks - 1) / self.slot_count as u64;
        let slot = (self.current_slot + (ticks as usize % self.slot_count)) % self.slot_count;

        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        self.nodes.insert(
            entry_id,
            WheelNode {
                connection_id,
                rotation,
                slot,
                callback,
                prev: None,
                next: None,
            },
        );
        self.link_front(entry_id, slot);

        trace!(
            entry_id,
            connection_id,
            rotation,
            slot,
            current_slot = self.current_slot,
            "Added timer to wheel"
        );
        Ok(entry_id)
    }

    fn cancel(&mut self, entry_id: TimerEntryId) -> bool {
        match self.unlink(entry_id) {
            Some(_) => {
                trace!(entry_id, "Timer cancelled and unlinked from wheel");
                true
            }
            None => {
                trace!(entry_id, "Timer not found for cancellation");
                false
            }
        }
    }

    fn adjust(
        &mut self,
        entry_id: TimerEntryId,
        new_delay: Duration,
    ) -> Result<Option<TimerEntryId>> {
        // 取消后重插，但句柄保持不变：重新计算圈数与槽位再链回环上。
        // Cancel-then-reinsert, handle preserved: recompute rotation and slot,
        // then relink into the ring.
        let Some(node) = self.unlink(entry_id) else {
            return Ok(None);
        };
        let ticks = self.ticks_for(new_delay);
        let rotation = (ticks - 1) / self.slot_count as u64;
        let slot = (self.current_slot + (ticks as usize % self.slot_count)) % self.slot_count;
        self.nodes.insert(
            entry_id,
            WheelNode {
                rotation,
                slot,
                prev: None,
                next: None,
                ..node
            },
        );
        self.link_front(entry_id, slot);
        trace!(entry_id, rotation, slot, "Timer rescheduled on wheel");
        Ok(Some(entry_id))
    }

    fn tick(&mut self) -> usize {
        // 游标先前进一格，再结算新槽位上的所有条目。
        // The cursor advances one slot first, then the new slot is settled.
        self.current_slot = (self.current_slot + 1) % self.slot_count;
        self.now += self.tick_interval;

        let mut fired = 0;
        let mut cursor = self.slots[self.current_slot];
        while let Some(id) = cursor {
            let (rotation, next) = match self.nodes.get(&id) {
                Some(node) => (node.rotation, node.next),
                None => break,
            };
            if rotation > 0 {
                // 还有整圈要走，留在原槽等下一轮。
                // Revolutions left; the entry stays for a later pass.
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.rotation -= 1;
                }
            } else if let Some(expired) = self.unlink(id) {
                let mut callback = expired.callback;
                callback.on_expire(TimerEventData::new(expired.connection_id));
                fired += 1;
            }
            cursor = next;
        }

        if fired > 0 {
            debug!(
                fired,
                current_slot = self.current_slot,
                timers_left = self.nodes.len(),
                "Wheel tick fired timers"
            );
        }
        fired
    }

    fn next_expiry(&self) -> Option<Instant> {
        // 时间轮没有全局截止时间序，报告下一次 tick 的时刻。
        // The wheel has no global deadline order; report the next tick.
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.now + self.tick_interval)
        }
    }

    fn timer_count(&self) -> usize {
        self.nodes.len()
    }

    fn kind(&self) -> EngineKind {
        EngineKind::TimerWheel
    }
}
