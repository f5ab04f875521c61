//! 缓冲核心的运行计数。
//!
//! ## 设计要点（Why）
//! - 报文路径上的失败（上报失败、会话缓冲溢出、旁路丢弃）不向调用方返回错误，计数是唯一的观测渠道；
//! - 全部使用 `Relaxed` 原子自增，快照不保证跨字段一致，仅用于趋势观察与测试断言。

use std::sync::atomic::{AtomicU64, Ordering};

/// 原子计数器集合。
#[derive(Debug, Default)]
pub struct BufferMetrics {
    packets_buffered: AtomicU64,
    session_overflow_drops: AtomicU64,
    bypass_enqueued: AtomicU64,
    bypass_drops: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    released_packets: AtomicU64,
    bypass_forwarded: AtomicU64,
    overload_raised: AtomicU64,
    overload_cleared: AtomicU64,
    resize_drops: AtomicU64,
}

/// 某一时刻的计数快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BufferStatsSnapshot {
    pub packets_buffered: u64,
    pub session_overflow_drops: u64,
    pub bypass_enqueued: u64,
    pub bypass_drops: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub released_packets: u64,
    pub bypass_forwarded: u64,
    pub overload_raised: u64,
    pub overload_cleared: u64,
    /// 缩容时因新容量不足被丢弃的旁路报文。
    pub resize_drops: u64,
    pub queue_occupancy: usize,
    pub queue_capacity: usize,
    pub sessions: usize,
}

impl BufferMetrics {
    pub(crate) fn record_buffered(&self, count: u64) {
        add(&self.packets_buffered, count);
    }

    pub(crate) fn record_session_overflow(&self, count: u64) {
        add(&self.session_overflow_drops, count);
    }

    pub(crate) fn record_bypass(&self, accepted: u64, dropped: u64) {
        add(&self.bypass_enqueued, accepted);
        add(&self.bypass_drops, dropped);
    }

    pub(crate) fn record_notifications(&self, sent: u64, failed: u64) {
        add(&self.notifications_sent, sent);
        add(&self.notifications_failed, failed);
    }

    pub(crate) fn record_released(&self, count: u64) {
        add(&self.released_packets, count);
    }

    pub(crate) fn record_forwarded(&self, count: u64) {
        add(&self.bypass_forwarded, count);
    }

    pub(crate) fn record_overload_raised(&self) {
        add(&self.overload_raised, 1);
    }

    pub(crate) fn record_overload_cleared(&self) {
        add(&self.overload_cleared, 1);
    }

    pub(crate) fn record_resize_drops(&self, count: u64) {
        add(&self.resize_drops, count);
    }

    /// 读取计数；队列与会话维度由调用方补齐。
    pub fn snapshot(&self) -> BufferStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        BufferStatsSnapshot {
            packets_buffered: load(&self.packets_buffered),
            session_overflow_drops: load(&self.session_overflow_drops),
            bypass_enqueued: load(&self.bypass_enqueued),
            bypass_drops: load(&self.bypass_drops),
            notifications_sent: load(&self.notifications_sent),
            notifications_failed: load(&self.notifications_failed),
            released_packets: load(&self.released_packets),
            bypass_forwarded: load(&self.bypass_forwarded),
            overload_raised: load(&self.overload_raised),
            overload_cleared: load(&self.overload_cleared),
            resize_drops: load(&self.resize_drops),
            ..BufferStatsSnapshot::default()
        }
    }
}

fn add(counter: &AtomicU64, value: u64) {
    if value != 0 {
        counter.fetch_add(value, Ordering::Relaxed);
    }
}
