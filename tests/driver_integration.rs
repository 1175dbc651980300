//! 超时驱动器集成测试
//! Timeout driver integration tests
//!
//! 所有测试都在 tokio 的虚拟时间下运行（`start_paused`），滴答节奏与
//! 截止时间因此是确定性的。
//! Every test runs on tokio's virtual clock (`start_paused`), making tick
//! cadence and deadlines deterministic.

pub mod common;

use common::harness::{init_tracing, peer, test_config};
use futures::future::join_all;
use kestrel_timeout::driver::{DriverError, start_timeout_driver};
use kestrel_timeout::error::Error;
use kestrel_timeout::timer::EngineKind;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

/// 一个空闲连接应当在恰好一个空闲窗口后被逐出
/// An idle connection must be evicted after exactly one idle window
async fn idle_expiry_scenario(kind: EngineKind) {
    init_tracing();
    let (handle, table, mut evictions) =
        start_timeout_driver(test_config(kind)).expect("driver must start");

    let start = Instant::now();
    let id = handle.connection_accepted(peer(1), 11).await.expect("accept");
    assert_eq!(table.len(), 1);
    assert!(table.timer_of(id).is_some(), "timer back-reference armed");

    let notice = evictions.recv().await.expect("eviction notice");
    assert_eq!(notice.connection_id, id);
    assert_eq!(notice.peer_addr, peer(1));
    assert_eq!(notice.token, 11);

    // 空闲窗口 200ms、滴答 50ms：第四次滴答逐出
    // A 200ms window at 50ms ticks: evicted on the fourth tick
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "evicted early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(300), "evicted late: {elapsed:?}");
    assert!(table.is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_idle_expiry_sorted_list() {
    idle_expiry_scenario(EngineKind::SortedList).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_expiry_min_heap() {
    idle_expiry_scenario(EngineKind::MinHeap).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_expiry_timer_wheel() {
    idle_expiry_scenario(EngineKind::TimerWheel).await;
}

/// 观察到活动后截止时间向后推一个完整窗口
/// Observed activity pushes the deadline a full window out
async fn activity_extension_scenario(kind: EngineKind) {
    init_tracing();
    let (handle, table, mut evictions) =
        start_timeout_driver(test_config(kind)).expect("driver must start");

    let start = Instant::now();
    let id = handle.connection_accepted(peer(2), 22).await.expect("accept");

    // 原截止时间的一半处刷新一次。引擎时钟以滴答为粒度，刷新落在前一次
    // 或后一次滴答之间，新截止时间因此在 t=250ms 与 t=300ms 之间。
    // Refresh halfway through the original window. The engine clock is
    // tick-granular and the refresh lands between two ticks, so the new
    // deadline falls between t=250ms and t=300ms.
    sleep(Duration::from_millis(100)).await;
    assert!(handle.connection_active(id).await.expect("activity"));

    // 原窗口（t=200ms）经过时必须仍然存活
    // The connection must survive the original deadline (t=200ms)
    let early = timeout(Duration::from_millis(110), evictions.recv()).await;
    assert!(early.is_err(), "evicted before the extended deadline");
    assert!(table.contains(id));

    // 只有延长后的截止时间到达时才逐出
    // Eviction happens only at the extended deadline
    let notice = evictions.recv().await.expect("eviction notice");
    assert_eq!(notice.connection_id, id);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "evicted early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(350), "evicted late: {elapsed:?}");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_activity_extension_sorted_list() {
    activity_extension_scenario(EngineKind::SortedList).await;
}

#[tokio::test(start_paused = true)]
async fn test_activity_extension_min_heap() {
    activity_extension_scenario(EngineKind::MinHeap).await;
}

#[tokio::test(start_paused = true)]
async fn test_activity_extension_timer_wheel() {
    activity_extension_scenario(EngineKind::TimerWheel).await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_connection_is_never_evicted() {
    init_tracing();
    let (handle, table, mut evictions) =
        start_timeout_driver(test_config(EngineKind::SortedList)).expect("driver must start");

    let id = handle.connection_accepted(peer(3), 33).await.expect("accept");
    sleep(Duration::from_millis(100)).await;

    assert!(handle.connection_closed(id).await.expect("close"));
    // 关闭是幂等的
    // Close is idempotent
    assert!(!handle.connection_closed(id).await.expect("second close"));
    assert!(table.is_empty());

    // 远超原截止时间后也不得出现逐出通知
    // No eviction notice may appear even far past the original deadline
    let evicted = timeout(Duration::from_millis(500), evictions.recv()).await;
    assert!(evicted.is_err(), "closed connection was evicted");

    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.cancelled_total, 1);
    assert_eq!(stats.expired_total, 0);
    assert_eq!(stats.pending_timers, 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_heap_tombstone_reclaimed_after_close() {
    init_tracing();
    let (handle, _table, _evictions) =
        start_timeout_driver(test_config(EngineKind::MinHeap)).expect("driver must start");

    let id = handle.connection_accepted(peer(4), 44).await.expect("accept");
    assert!(handle.connection_closed(id).await.expect("close"));

    // 堆引擎惰性取消：墓碑先驻留，越过截止时间的滴答后才被回收
    // Heap lazy cancel: the tombstone stays resident and is only reclaimed by
    // a tick past its deadline
    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.pending_timers, 1);

    sleep(Duration::from_millis(300)).await;
    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.pending_timers, 0);
    assert_eq!(stats.expired_total, 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_expiry_wins_race_against_late_commands() {
    init_tracing();
    let (handle, _table, mut evictions) =
        start_timeout_driver(test_config(EngineKind::TimerWheel)).expect("driver must start");

    let id = handle.connection_accepted(peer(5), 55).await.expect("accept");
    let notice = evictions.recv().await.expect("eviction notice");
    assert_eq!(notice.connection_id, id);

    // 到期已赢：迟到的活动与关闭都成为无操作
    // Expiry already won: the late activity and close are both no-ops
    assert!(!handle.connection_active(id).await.expect("late activity"));
    assert!(!handle.connection_closed(id).await.expect("late close"));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_many_connections_each_evicted_once() {
    init_tracing();
    // 堆容量为 4，16 条连接迫使数组增长路径运转
    // Heap capacity 4 with 16 connections forces the array growth path
    let (handle, table, mut evictions) =
        start_timeout_driver(test_config(EngineKind::MinHeap)).expect("driver must start");

    let ids: Vec<_> = join_all((0..16u16).map(|n| {
        let handle = handle.clone();
        async move {
            handle
                .connection_accepted(peer(100 + n), u64::from(n))
                .await
                .expect("accept")
        }
    }))
    .await;
    assert_eq!(table.len(), 16);

    let mut evicted = HashSet::new();
    for _ in 0..16 {
        let notice = evictions.recv().await.expect("eviction notice");
        assert!(evicted.insert(notice.connection_id), "duplicate eviction");
    }
    assert_eq!(evicted, ids.into_iter().collect::<HashSet<_>>());
    assert!(table.is_empty());

    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.expired_total, 16);
    assert_eq!(stats.engine, EngineKind::MinHeap);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_driver_rejects_invalid_config() {
    let mut config = test_config(EngineKind::TimerWheel);
    config.engine.wheel_slots = 0;
    match start_timeout_driver(config) {
        Err(Error::InvalidSlotCount) => {}
        other => panic!("expected InvalidSlotCount, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_commands_fail_after_shutdown() {
    init_tracing();
    let (handle, _table, _evictions) =
        start_timeout_driver(test_config(EngineKind::SortedList)).expect("driver must start");

    handle.shutdown().await.expect("shutdown");
    // 让驱动器任务处理完关闭命令
    // Let the driver task drain the shutdown command
    sleep(Duration::from_millis(10)).await;

    match handle.connection_accepted(peer(6), 66).await {
        Err(DriverError::DriverShutdown) => {}
        other => panic!("expected DriverShutdown, got {other:?}"),
    }
}
