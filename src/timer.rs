//! 连接超时定时器子系统
//! Connection-Timeout Timer Subsystem
//!
//! 该模块包含三种可互换的定时器引擎：升序双向链表、数组式最小堆和固定槽位
//! 时间轮。它们在同一个契约后面解决同一个问题——维护一组无上界的每连接到期
//! 定时器，支持插入、取消和重调度，并高效地推进时间、触发到期回调——但各自
//! 具有不同的复杂度与灵活性取舍。
//!
//! This module contains three interchangeable timer engines: an ascending
//! doubly linked list, an array-backed min-heap, and a fixed-slot timing
//! wheel. All three solve the same problem behind one contract -- hold an
//! unbounded set of per-connection expiration timers, support insertion,
//! cancellation and rescheduling, and efficiently advance time and fire
//! expired callbacks -- with different complexity/flexibility trade-offs.

pub mod event;
pub mod heap;
pub mod list;
pub mod wheel;

mod engine;


pub use engine::{EngineKind, TimerEngine, TimerEntryId, build_engine};
pub use event::{ClosureCallback, NoOpCallback, SenderCallback, TimerCallback, TimerEventData};
pub use heap::MinHeapEngine;
pub use list::SortedListEngine;
pub use wheel::TimerWheelEngine;
