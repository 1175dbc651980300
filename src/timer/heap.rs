//! 最小堆定时器引擎
//! Min-Heap Timer Engine
//!
//! 以数组承载的二叉最小堆，0 号下标为根，根即最早的截止时间。插入与弹出
//! 均为 O(log n)；数组装满时容量翻倍（摊还 O(1) 增长），且从不收缩。
//!
//! An array-backed binary min-heap, 0-indexed, the root holding the earliest
//! deadline. Insert and pop are O(log n); the array doubles when full
//! (amortized O(1) growth) and never shrinks.
//!
//! 取消是惰性的：仅将回调原地清空（墓碑化），槽位保留到它浮到根部被弹出时
//! 才真正回收。高取消率、低弹出率的负载下数组会相对存活定时器数膨胀；这是
//! 该设计的固有属性，不做压缩。
//!
//! Cancellation is lazy: the callback is cleared in place (tombstoned) and the
//! slot is only reclaimed when it surfaces at the root and is popped. Under a
//! cancel-heavy, pop-light workload the array grows relative to the live timer
//! count; no compaction pass ever runs.

use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::timer::engine::{EngineKind, TimerEngine, TimerEntryId};
use crate::timer::event::{TimerCallback, TimerEventData};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 堆条目。`callback` 为 `None` 即墓碑。
/// Heap entry. `callback == None` is the tombstone state.
#[derive(Debug)]
pub(super) struct HeapEntry<C> {
    pub(super) id: TimerEntryId,
    pub(super) connection_id: ConnectionId,
    pub(super) expire: Instant,
    pub(super) callback: Option<C>,
}

/// 最小堆引擎
/// Min-heap engine
///
/// 不变式：对每个非根下标 i，`array[parent(i)].expire <= array[i].expire`；
/// `capacity >= cur_size`；`[cur_size..capacity)` 的槽位恒为 `None`。
///
/// Invariants: for every non-root index i,
/// `array[parent(i)].expire <= array[i].expire`; `capacity >= cur_size`;
/// slots in `[cur_size..capacity)` are always `None`.
#[derive(Debug)]
pub struct MinHeapEngine<C> {
    /// 堆数组，长度恒等于 `capacity`，尾部未占用槽位为 `None`
    /// Heap array, always `capacity` long, unused trailing slots `None`
    pub(super) array: Vec<Option<HeapEntry<C>>>,
    /// 当前数组容量
    /// Current array capacity
    pub(super) capacity: usize,
    /// 已占用槽位数（含墓碑）
    /// Occupied slot count (tombstones included)
    pub(super) cur_size: usize,
    /// 条目ID到数组下标的映射，随每次交换同步更新
    /// Entry-id to array-index map, kept in step with every swap
    pub(super) index_of: HashMap<TimerEntryId, usize>,
    /// 引擎的逻辑时钟
    /// The engine's logical clock
    pub(super) now: Instant,
    tick_interval: Duration,
    next_entry_id: TimerEntryId,
}

impl<C: TimerCallback> MinHeapEngine<C> {
    /// 以给定初始容量创建空堆
    /// Create an empty heap with the given initial capacity
    pub fn new(capacity: usize, tick_interval: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        let mut array = Vec::with_capacity(capacity);
        array.resize_with(capacity, || None);
        Ok(Self {
            array,
            capacity,
            cur_size: 0,
            index_of: HashMap::new(),
            now: Instant::now(),
            tick_interval,
            next_entry_id: 1,
        })
    }

    /// 用一组已知的定时器批量建堆：校验容量后自底向上堆化
    /// （自最后一个内部节点起逐个下坠）。
    ///
    /// Bulk-build the heap from a known timer set: validate capacity, then
    /// heapify bottom-up (sift down every internal node starting from the
    /// last parent).
    pub fn with_entries(
        capacity: usize,
        tick_interval: Duration,
        entries: Vec<(ConnectionId, Duration, C)>,
    ) -> Result<Self> {
        if capacity < entries.len() {
            return Err(Error::CapacityTooSmall {
                capacity,
                required: entries.len(),
            });
        }
        let mut heap = Self::new(capacity, tick_interval)?;
        for (connection_id, delay, callback) in entries {
            if delay.is_zero() {
                return Err(Error::ZeroDelay);
            }
            let id = heap.next_entry_id;
            heap.next_entry_id += 1;
            let index = heap.cur_size;
            heap.array[index] = Some(HeapEntry {
                id,
                connection_id,
                expire: heap.now + delay,
                callback: Some(callback),
            });
            heap.index_of.insert(id, index);
            heap.cur_size += 1;
        }
        for index in (0..heap.cur_size / 2).rev() {
            heap.sift_down(index);
        }
        debug!(size = heap.cur_size, capacity, "Heap bulk-loaded and heapified");
        Ok(heap)
    }

    /// 当前数组容量。只增不减。
    /// Current array capacity. Grows, never shrinks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn expire_at(&self, index: usize) -> Option<Instant> {
        self.array
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|entry| entry.expire)
    }

    /// 交换两个槽位并同步修正下标映射。
    /// Swap two slots, keeping the index map in step.
    fn swap_slots(&mut self, a: usize, b: usize) {
        self.array.swap(a, b);
        for index in [a, b] {
            if let Some(entry) = self.array[index].as_ref() {
                self.index_of.insert(entry.id, index);
            }
        }
    }

    /// 将 `index` 处的条目向上坠，直到父节点不再晚于它或抵达根部。
    /// Sift the entry at `index` upward until its parent is no later, or it
    /// reaches the root.
    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            let (Some(parent_expire), Some(own_expire)) =
                (self.expire_at(parent), self.expire_at(index))
            else {
                break;
            };
            if parent_expire <= own_expire {
                break;
            }
            self.swap_slots(index, parent);
            index = parent;
        }
    }

    /// 将 `hole` 处的条目向下坠：每层取两个子节点中较小者，比当前条目早则
    /// 交换，否则停止。保证以 `hole` 为根的子树满足最小堆性质。
    ///
    /// Sift the entry at `hole` downward: at each level take the smaller of
    /// the two children, swap while it is earlier than the current entry,
    /// stop otherwise. Restores the min-heap property of the subtree rooted
    /// at `hole`.
    fn sift_down(&mut self, mut hole: usize) {
        loop {
            let mut child = hole * 2 + 1;
            if child >= self.cur_size {
                break;
            }
            if child + 1 < self.cur_size {
                let (Some(left), Some(right)) =
                    (self.expire_at(child), self.expire_at(child + 1))
                else {
                    break;
                };
                if right < left {
                    child += 1;
                }
            }
            let (Some(child_expire), Some(hole_expire)) =
                (self.expire_at(child), self.expire_at(hole))
            else {
                break;
            };
            if child_expire >= hole_expire {
                break;
            }
            self.swap_slots(hole, child);
            hole = child;
        }
    }

    /// 将数组容量扩大一倍。旧容量全部保留，不做收缩。
    /// Double the array capacity. Existing entries carry over; no shrinking.
    fn resize(&mut self) {
        let new_capacity = self.capacity * 2;
        self.array.resize_with(new_capacity, || None);
        debug!(
            old_capacity = self.capacity,
            new_capacity, "Heap array capacity doubled"
        );
        self.capacity = new_capacity;
    }

    /// 弹出堆顶：最后一个条目移入根槽，再对其执行下坠。
    /// Pop the root: the last entry moves into the root slot and is sifted
    /// down.
    fn pop(&mut self) -> Option<HeapEntry<C>> {
        if self.cur_size == 0 {
            return None;
        }
        let root = self.array[0].take()?;
        self.index_of.remove(&root.id);
        self.cur_size -= 1;
        if self.cur_size > 0 {
            self.array[0] = self.array[self.cur_size].take();
            if let Some(moved) = self.array[0].as_ref() {
                self.index_of.insert(moved.id, 0);
            }
            self.sift_down(0);
        }
        Some(root)
    }
}

impl<C: TimerCallback> TimerEngine<C> for MinHeapEngine<C> {
    fn add(
        &mut self,
        connection_id: ConnectionId,
        delay: Duration,
        callback: C,
    ) -> Result<TimerEntryId> {
        if delay.is_zero() {
            return Err(Error::ZeroDelay);
        }
        if self.cur_size >= self.capacity {
            self.resize();
        }
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;

        let hole = self.cur_size;
        self.array[hole] = Some(HeapEntry {
            id: entry_id,
            connection_id,
            expire: self.now + delay,
            callback: Some(callback),
        });
        self.index_of.insert(entry_id, hole);
        self.cur_size += 1;
        self.sift_up(hole);

        trace!(
            entry_id,
            connection_id,
            delay_ms = delay.as_millis(),
            size = self.cur_size,
            "Added timer to heap"
        );
        Ok(entry_id)
    }

    fn cancel(&mut self, entry_id: TimerEntryId) -> bool {
        // 惰性删除：只清空回调，槽位留在数组中等它浮到根部再回收。
        // Lazy deletion: only clear the callback; the slot stays in the array
        // until it surfaces at the root.
        let Some(&index) = self.index_of.get(&entry_id) else {
            trace!(entry_id, "Timer not found for cancellation");
            return false;
        };
        let Some(entry) = self.array.get_mut(index).and_then(|slot| slot.as_mut()) else {
            return false;
        };
        let was_live = entry.callback.is_some();
        entry.callback = None;
        if was_live {
            trace!(entry_id, index, "Timer tombstoned in heap");
        }
        was_live
    }

    fn adjust(
        &mut self,
        entry_id: TimerEntryId,
        new_delay: Duration,
    ) -> Result<Option<TimerEntryId>> {
        if new_delay.is_zero() {
            return Err(Error::ZeroDelay);
        }
        let Some(&index) = self.index_of.get(&entry_id) else {
            return Ok(None);
        };
        // 取消后重插：旧槽位成为墓碑，回调随新截止时间迁入新条目。
        // Cancel-then-reinsert: the old slot becomes a tombstone and the
        // callback moves into a fresh entry under the new deadline.
        let Some(entry) = self.array.get_mut(index).and_then(|slot| slot.as_mut()) else {
            return Ok(None);
        };
        let Some(callback) = entry.callback.take() else {
            return Ok(None);
        };
        let connection_id = entry.connection_id;
        let new_id = self.add(connection_id, new_delay, callback)?;
        trace!(
            old_entry_id = entry_id,
            new_entry_id = new_id,
            "Timer rescheduled via heap tombstone"
        );
        Ok(Some(new_id))
    }

    fn tick(&mut self) -> usize {
        self.now += self.tick_interval;
        let mut fired = 0;
        let mut reclaimed = 0;

        // 堆顶到期则弹出；墓碑化的堆顶同样弹出但不触发，惰性取消在此回收。
        // Pop the root while it has expired; a tombstoned root is popped
        // without firing, which is where lazy cancellation is reclaimed.
        while self.cur_size > 0 {
            let Some(root_expire) = self.expire_at(0) else {
                break;
            };
            if root_expire > self.now {
                break;
            }
            let Some(entry) = self.pop() else {
                break;
            };
            match entry.callback {
                Some(mut callback) => {
                    callback.on_expire(TimerEventData::new(entry.connection_id));
                    fired += 1;
                }
                None => reclaimed += 1,
            }
        }

        if fired > 0 || reclaimed > 0 {
            debug!(fired, reclaimed, size = self.cur_size, "Heap tick completed");
        }
        fired
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.expire_at(0)
    }

    fn timer_count(&self) -> usize {
        self.cur_size
    }

    fn kind(&self) -> EngineKind {
        EngineKind::MinHeap
    }
}
