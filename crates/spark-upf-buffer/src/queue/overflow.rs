//! # OverflowQueue：带水位滞回的旁路队列
//!
//! ## 核心意图（Why）
//! - 对多个分类线程暴露批量入队，对唯一的调度任务暴露突发出队；
//! - 在占用越过高水位时给出过载边沿，回落到低水位及以下才解除，作为上游限速的唯一依据。
//!
//! ## 行为契约（What）
//! - `enqueue_batch`：接受至多剩余容量的前缀，未接受的尾部原样返回给调用方释放；
//! - `dequeue_burst`：FIFO 取出至多 `max` 个；消费侧由内部互斥串行化，误用不会破坏队列；
//! - `resize`：在写锁下迁移全部在队元素（保持原序，超出新容量的尾部返回给调用方），
//!   写锁等待所有在途生产者/消费者退出，等价于短暂暂停流水线；新缓冲在取锁前分配，
//!   分配失败时旧缓冲完好无损。
//!
//! ## 风险提示（Trade-offs）
//! - 热路径需要获取 `RwLock` 读锁（一次原子操作）；换来的是扩缩容不需要双缓冲代际协议；
//! - 过载信号是建议性的：分类线程与调度任务观察到的占用可能存在瞬时差异，边沿只保证每次跨越报告一次；
//! - 锁存器翻转与边沿交付共用一把压力闸（[`observe_pressure_with`](OverflowQueue::observe_pressure_with)），
//!   上游收到的边沿顺序与翻转顺序一致；代价是交付回调阻塞时，另一侧的观测会在闸上等待。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::ring::MpscRing;
use crate::error::QueueError;

/// 高低水位阈值，随容量重新计算。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Watermarks {
    pub capacity: usize,
    /// 占用严格大于该值时触发过载。
    pub high: usize,
    /// 占用小于等于该值时解除过载。
    pub low: usize,
}

impl Watermarks {
    pub const DEFAULT_HIGH_RATIO: f64 = 0.90;
    pub const DEFAULT_LOW_RATIO: f64 = 0.15;

    /// 按比例计算水位，结果向下取整（容量 1024 → 高 921 / 低 153）。
    ///
    /// 高水位不超过 `capacity - 1`，满队时一定触发过载。
    pub fn for_capacity(capacity: usize, high_ratio: f64, low_ratio: f64) -> Self {
        let ceiling = capacity.saturating_sub(1);
        let scale = |ratio: f64| ((capacity as f64) * ratio).floor() as usize;
        Self {
            capacity,
            high: scale(high_ratio).min(ceiling),
            low: scale(low_ratio).min(ceiling),
        }
    }

    pub fn is_above_high(&self, occupancy: usize) -> bool {
        occupancy > self.high
    }

    pub fn is_at_or_below_low(&self, occupancy: usize) -> bool {
        occupancy <= self.low
    }
}

/// 过载信号的边沿。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverloadEdge {
    Raised,
    Cleared,
}

/// 滞回锁存器。
///
/// # 教案式说明
/// - **契约 (What)**：占用 `> high` 时置位，仅当占用 `<= low` 时复位；
///   [`observe`](Self::observe) 在状态真正翻转时返回边沿，每次跨越恰好一次（`swap` 保证并发下不重复）。
#[derive(Debug, Default)]
pub struct OverloadSignal {
    raised: AtomicBool,
}

impl OverloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    pub fn observe(&self, occupancy: usize, watermarks: &Watermarks) -> Option<OverloadEdge> {
        let raised = self.is_raised();
        if !raised && watermarks.is_above_high(occupancy) {
            if !self.raised.swap(true, Ordering::AcqRel) {
                return Some(OverloadEdge::Raised);
            }
        } else if raised
            && watermarks.is_at_or_below_low(occupancy)
            && self.raised.swap(false, Ordering::AcqRel)
        {
            return Some(OverloadEdge::Cleared);
        }
        None
    }
}

/// 一次批量入队的结果。
#[derive(Debug)]
pub struct EnqueueOutcome<T> {
    pub accepted: usize,
    /// 未被接受的尾部，按原顺序排列。
    pub rejected: Vec<T>,
    /// 入队完成后的占用。
    pub occupancy: usize,
}

/// 一次水位观测。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PressureReading {
    pub occupancy: usize,
    pub watermarks: Watermarks,
    pub edge: Option<OverloadEdge>,
}

struct QueueInner<T> {
    ring: MpscRing<T>,
    watermarks: Watermarks,
}

/// 旁路队列。
pub struct OverflowQueue<T> {
    inner: RwLock<QueueInner<T>>,
    consumer: Mutex<()>,
    pressure: Mutex<()>,
    overload: OverloadSignal,
    generation: AtomicU64,
    high_ratio: f64,
    low_ratio: f64,
}

impl<T: Send> OverflowQueue<T> {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// 以默认水位比例（0.90 / 0.15）创建队列。
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        Self::with_watermark_ratios(
            capacity,
            Watermarks::DEFAULT_HIGH_RATIO,
            Watermarks::DEFAULT_LOW_RATIO,
        )
    }

    pub fn with_watermark_ratios(
        capacity: usize,
        high_ratio: f64,
        low_ratio: f64,
    ) -> Result<Self, QueueError> {
        let ring = MpscRing::try_with_capacity(capacity)?;
        Ok(Self {
            inner: RwLock::new(QueueInner {
                ring,
                watermarks: Watermarks::for_capacity(capacity, high_ratio, low_ratio),
            }),
            consumer: Mutex::new(()),
            pressure: Mutex::new(()),
            overload: OverloadSignal::new(),
            generation: AtomicU64::new(0),
            high_ratio,
            low_ratio,
        })
    }

    /// 多生产者批量入队。
    pub fn enqueue_batch(&self, batch: Vec<T>) -> EnqueueOutcome<T> {
        let requested = batch.len();
        let inner = self.inner.read();
        let rejected = inner.ring.push_batch(batch);
        EnqueueOutcome {
            accepted: requested - rejected.len(),
            rejected,
            occupancy: inner.ring.len(),
        }
    }

    /// 单消费者突发出队，FIFO。
    #[allow(unsafe_code)]
    pub fn dequeue_burst(&self, max: usize) -> Vec<T> {
        let _consumer = self.consumer.lock();
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(max.min(inner.ring.len()));
        // SAFETY: `consumer` 互斥保证同一时刻只有一个消费者。
        unsafe {
            inner.ring.pop_burst(max, &mut out);
        }
        out
    }

    /// 扩缩容。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - `new_capacity == 0` → [`QueueError::InvalidCapacity`]；
    ///   - 分配失败 → [`QueueError::OutOfMemory`]，队列保持原状；
    ///   - 成功时返回因新容量不足而丢弃的尾部元素，水位按新容量重算，代际加一；
    /// - **执行 (How)**：先在锁外分配新缓冲，再取写锁迁移；写锁排除了全部并发访问，迁移期间不存在在途槽位。
    pub fn resize(&self, new_capacity: usize) -> Result<Vec<T>, QueueError> {
        let fresh = MpscRing::try_with_capacity(new_capacity)?;

        let mut inner = self.inner.write();
        let mut migrating = inner.ring.drain();
        let dropped = if migrating.len() > new_capacity {
            migrating.split_off(new_capacity)
        } else {
            Vec::new()
        };
        let overflow = fresh.push_batch(migrating);
        debug_assert!(overflow.is_empty(), "迁移量不应超过新容量");
        inner.ring = fresh;
        inner.watermarks = Watermarks::for_capacity(new_capacity, self.high_ratio, self.low_ratio);
        let occupancy = inner.ring.len();
        let watermarks = inner.watermarks;
        drop(inner);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            capacity = new_capacity,
            occupancy,
            high = watermarks.high,
            low = watermarks.low,
            dropped = dropped.len(),
            generation,
            "overflow queue resized"
        );
        Ok(dropped)
    }

    /// 以当前占用推进过载锁存器，返回读数与本次发生的边沿。
    pub fn observe_pressure(&self) -> PressureReading {
        self.observe_pressure_with(|reading| *reading)
    }

    /// 在压力闸内推进锁存器，并在释放闸之前把读数交给 `deliver`。
    ///
    /// 读取占用、翻转锁存器与交付边沿三者对其他观察者原子，
    /// 因此后翻转的边沿不会先于先翻转的边沿到达上游。
    pub fn observe_pressure_with<R>(&self, deliver: impl FnOnce(&PressureReading) -> R) -> R {
        let _gate = self.pressure.lock();
        let (occupancy, watermarks) = {
            let inner = self.inner.read();
            (inner.ring.len(), inner.watermarks)
        };
        let reading = PressureReading {
            occupancy,
            watermarks,
            edge: self.overload.observe(occupancy, &watermarks),
        };
        deliver(&reading)
    }

    /// 关停时取出全部在队元素。
    pub fn drain(&self) -> Vec<T> {
        self.inner.write().ring.drain()
    }

    pub fn occupancy(&self) -> usize {
        self.inner.read().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().ring.capacity()
    }

    pub fn watermarks(&self) -> Watermarks {
        self.inner.read().watermarks
    }

    pub fn is_overloaded(&self) -> bool {
        self.overload.is_raised()
    }

    /// 扩缩容代际，每次成功 `resize` 加一。
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for OverflowQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("OverflowQueue")
            .field("ring", &inner.ring)
            .field("watermarks", &inner.watermarks)
            .field("overloaded", &self.overload.is_raised())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;

    #[test]
    fn default_watermarks_for_1024() {
        let wm = Watermarks::for_capacity(1024, 0.90, 0.15);
        assert_eq!(wm.high, 921);
        assert_eq!(wm.low, 153);
    }

    #[test]
    fn full_ratio_still_raises_on_a_full_queue() {
        let wm = Watermarks::for_capacity(16, 1.0, 0.15);
        assert_eq!(wm.high, 15);
        let queue = OverflowQueue::with_watermark_ratios(16, 1.0, 0.15).unwrap();
        queue.enqueue_batch((0..16).collect());
        assert_eq!(queue.observe_pressure().edge, Some(OverloadEdge::Raised));
    }

    #[test]
    fn pressure_delivery_runs_inside_the_gate() {
        let queue = OverflowQueue::with_capacity(10).unwrap();
        queue.enqueue_batch((0..10).collect());
        let edge = queue.observe_pressure_with(|reading| {
            // 闸内再次观测会死锁，这里只确认锁存器已翻转且边沿随读数交付。
            assert!(queue.is_overloaded());
            reading.edge
        });
        assert_eq!(edge, Some(OverloadEdge::Raised));
        assert_eq!(queue.observe_pressure().edge, None);
    }

    #[test]
    fn hysteresis_holds_between_watermarks() {
        let wm = Watermarks::for_capacity(100, 0.90, 0.15);
        let signal = OverloadSignal::new();
        assert_eq!(signal.observe(90, &wm), None);
        assert_eq!(signal.observe(91, &wm), Some(OverloadEdge::Raised));
        assert_eq!(signal.observe(95, &wm), None);
        for occupancy in (16..=91).rev() {
            assert_eq!(signal.observe(occupancy, &wm), None);
            assert!(signal.is_raised());
        }
        assert_eq!(signal.observe(15, &wm), Some(OverloadEdge::Cleared));
        assert_eq!(signal.observe(3, &wm), None);
        assert!(!signal.is_raised());
    }

    #[test]
    fn resize_preserves_order_and_returns_dropped_tail() {
        let queue = OverflowQueue::with_capacity(8).unwrap();
        queue.enqueue_batch((0..6).collect());
        let dropped = queue.resize(4).unwrap();
        assert_eq!(dropped, vec![4, 5]);
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.watermarks(), Watermarks::for_capacity(4, 0.90, 0.15));
        assert_eq!(queue.generation(), 1);
        assert_eq!(queue.dequeue_burst(10), vec![0, 1, 2, 3]);
    }

    #[test]
    fn resize_to_zero_keeps_old_ring() {
        let queue = OverflowQueue::with_capacity(4).unwrap();
        queue.enqueue_batch(vec![1, 2]);
        assert!(matches!(
            queue.resize(0),
            Err(QueueError::InvalidCapacity { requested: 0 })
        ));
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.generation(), 0);
        assert_eq!(queue.dequeue_burst(4), vec![1, 2]);
    }

    #[test]
    fn resize_reports_oom_without_touching_entries() {
        let queue = OverflowQueue::<u64>::with_capacity(4).unwrap();
        queue.enqueue_batch(vec![7, 8]);
        assert!(matches!(
            queue.resize(usize::MAX / 2),
            Err(QueueError::OutOfMemory { .. })
        ));
        assert_eq!(queue.occupancy(), 2);
        assert_eq!(queue.dequeue_burst(4), vec![7, 8]);
    }
}
