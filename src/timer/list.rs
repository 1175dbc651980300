//! 升序链表定时器引擎
//! Sorted-List Timer Engine
//!
//! 按到期时间升序维护的双向链表：头节点即最早的截止时间。插入和重调度
//! 为最坏 O(n)，到期检测为 O(1)。删除是真实且立即的，没有墓碑。
//!
//! A doubly linked list kept ascending by expiration: the head is always the
//! earliest deadline. Insertion and rescheduling are O(n) worst-case, expiry
//! detection is O(1). Deletion is real and immediate; there are no tombstones.
//!
//! 节点之间通过条目ID相互引用而不是指针，链表的摘除/拼接都是对ID的显式
//! 操作。
//! Nodes reference each other by entry id rather than by pointer; detach and
//! splice are explicit operations on ids.

use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::timer::engine::{EngineKind, TimerEngine, TimerEntryId};
use crate::timer::event::{TimerCallback, TimerEventData};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 链表节点：截止时间、回调和双向链接
/// List node: deadline, callback and the two links
#[derive(Debug)]
pub(super) struct ListNode<C> {
    pub(super) connection_id: ConnectionId,
    pub(super) expire: Instant,
    pub(super) callback: C,
    pub(super) prev: Option<TimerEntryId>,
    pub(super) next: Option<TimerEntryId>,
}

/// 升序链表引擎
/// Sorted-list engine
///
/// 不变式：从头到尾遍历，`expire` 单调非降（除正在进行的变更期间）。
/// Invariant: walking head to tail yields non-decreasing `expire` at all
/// times outside an in-progress mutation.
#[derive(Debug)]
pub struct SortedListEngine<C> {
    /// 节点存储，以条目ID为键
    /// Node storage, keyed by entry id
    pub(super) nodes: HashMap<TimerEntryId, ListNode<C>>,
    /// 链表头（最早截止时间）
    /// List head (earliest deadline)
    pub(super) head: Option<TimerEntryId>,
    /// 链表尾（最晚截止时间）
    /// List tail (latest deadline)
    pub(super) tail: Option<TimerEntryId>,
    /// 引擎的逻辑时钟，每次 tick 前进一个间隔
    /// The engine's logical clock, advanced one interval per tick
    pub(super) now: Instant,
    tick_interval: Duration,
    next_entry_id: TimerEntryId,
}

impl<C: TimerCallback> SortedListEngine<C> {
    /// 创建空引擎
    /// Create an empty engine
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            head: None,
            tail: None,
            now: Instant::now(),
            tick_interval,
            next_entry_id: 1,
        }
    }

    /// 从头部开始线性扫描，把 `id` 拼接到第一个截止时间不早于它的节点之前。
    /// Linear scan from the head, splicing `id` in before the first node whose
    /// deadline is not earlier than its own.
    fn splice_in(&mut self, id: TimerEntryId, expire: Instant) {
        let mut prev: Option<TimerEntryId> = None;
        let mut cursor = self.head;
        while let Some(cur_id) = cursor {
            let Some(cur) = self.nodes.get(&cur_id) else {
                break;
            };
            if cur.expire >= expire {
                break;
            }
            prev = Some(cur_id);
            cursor = cur.next;
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.prev = prev;
            node.next = cursor;
        }
        match prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match cursor {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(&n) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
    }

    /// 从链中摘除 `id`，修正邻居与头尾。节点本身保留在存储中。
    /// Detach `id` from the chain, fixing neighbors and head/tail. The node
    /// itself stays in storage.
    fn detach(&mut self, id: TimerEntryId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let (prev, next) = (node.prev, node.next);
        match prev {
            Some(p) => {
                if let Some(n) = self.nodes.get_mut(&p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(x) => {
                if let Some(n) = self.nodes.get_mut(&x) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.prev = None;
            n.next = None;
        }
    }
}

impl<C: TimerCallback> TimerEngine<C> for SortedListEngine<C> {
    fn add(
        &mut self,
        connection_id: ConnectionId,
        delay: Duration,
        callback: C,
    ) -> Result<TimerEntryId> {
        if delay.is_zero() {
            return Err(Error::ZeroDelay);
        }
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        let expire = self.now + delay;

        self.nodes.insert(
            entry_id,
            ListNode {
                connection_id,
                expire,
                callback,
                prev: None,
                next: None,
            },
        );
        self.splice_in(entry_id, expire);

        trace!(
            entry_id,
            connection_id,
            delay_ms = delay.as_millis(),
            "Added timer to sorted list"
        );
        Ok(entry_id)
    }

    fn cancel(&mut self, entry_id: TimerEntryId) -> bool {
        if !self.nodes.contains_key(&entry_id) {
            trace!(entry_id, "Timer not found for cancellation");
            return false;
        }
        self.detach(entry_id);
        self.nodes.remove(&entry_id);
        trace!(entry_id, "Timer cancelled and unlinked");
        true
    }

    fn adjust(
        &mut self,
        entry_id: TimerEntryId,
        new_delay: Duration,
    ) -> Result<Option<TimerEntryId>> {
        if new_delay.is_zero() {
            return Err(Error::ZeroDelay);
        }
        if !self.nodes.contains_key(&entry_id) {
            return Ok(None);
        }
        // 摘除后复用插入的定位逻辑，而不必了解旧位置的邻居。
        // Detach, then reuse the add placement logic instead of reasoning
        // about the old position's neighbors.
        self.detach(entry_id);
        let expire = self.now + new_delay;
        if let Some(node) = self.nodes.get_mut(&entry_id) {
            node.expire = expire;
        }
        self.splice_in(entry_id, expire);
        trace!(
            entry_id,
            new_delay_ms = new_delay.as_millis(),
            "Timer rescheduled in sorted list"
        );
        Ok(Some(entry_id))
    }

    fn tick(&mut self) -> usize {
        self.now += self.tick_interval;
        let mut fired = 0;

        // 从头部弹出所有已到期的节点；在第一个未到期的头节点处停止。
        // Pop expired nodes from the head; stop at the first unexpired one.
        while let Some(head_id) = self.head {
            let Some(head) = self.nodes.get(&head_id) else {
                break;
            };
            if head.expire > self.now {
                break;
            }
            self.detach(head_id);
            if let Some(node) = self.nodes.remove(&head_id) {
                let mut callback = node.callback;
                callback.on_expire(TimerEventData::new(node.connection_id));
                fired += 1;
            }
        }

        if fired > 0 {
            debug!(fired, timers_left = self.nodes.len(), "Sorted list tick fired timers");
        }
        fired
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.head
            .and_then(|id| self.nodes.get(&id))
            .map(|node| node.expire)
    }

    fn timer_count(&self) -> usize {
        self.nodes.len()
    }

    fn kind(&self) -> EngineKind {
        EngineKind::SortedList
    }
}
