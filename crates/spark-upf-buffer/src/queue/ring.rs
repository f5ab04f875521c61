//! 多生产者 / 单消费者有界环形缓冲。
//!
//! ## 模块定位（Why）
//! - 旁路报文由多个分类线程并发写入、由唯一的调度任务批量取出，需要无锁的 MPSC 通道；
//! - 每个批次只做一次 CAS 预留与一次 Release 发布，把跨核屏障摊薄到整批报文上。
//!
//! ## 实现策略（How）
//! - 采用 `rte_ring` 的多生产者纪律：`prod_head` 负责预留槽位，`prod_tail` 按预留顺序依次发布，
//!   后预留的生产者须等待前驱发布完成，从而保证跨生产者的全局 FIFO；
//! - 单消费者只推进 `cons_tail`；生产者以 Acquire 读取 `cons_tail` 判断槽位已被读走；
//! - 位置计数为单调递增的 `u64`，槽位下标为 `pos % capacity`，因此容量不要求是 2 的幂。
//!
//! ## 契约（What）
//! - `push_batch`：返回未被接受的尾部报文，调用方负责释放；
//! - `pop_burst`：`unsafe`，调用方必须保证同一时刻只有一个消费者；
//! - `drain`：独占借用下取出全部元素，用于扩缩容迁移与析构。

#![allow(unsafe_code)]

use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::error::QueueError;
use crate::sync::{AtomicU64, Ordering, UnsafeCell, spin_wait};

/// MPSC 有界环形缓冲。
pub struct MpscRing<T> {
    prod_head: CachePadded<AtomicU64>,
    prod_tail: CachePadded<AtomicU64>,
    cons_tail: CachePadded<AtomicU64>,
    capacity: u64,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: 槽位内容只在预留/发布协议保护下由唯一一方访问：生产者写入自己预留的槽位，
// 消费者只读取已发布且未回收的槽位。元素跨线程移动，因此要求 `T: Send`。
unsafe impl<T: Send> Send for MpscRing<T> {}
unsafe impl<T: Send> Sync for MpscRing<T> {}

impl<T> MpscRing<T> {
    /// 分配指定容量的环形缓冲。
    ///
    /// - 容量为 0 返回 [`QueueError::InvalidCapacity`]；
    /// - 分配失败返回 [`QueueError::OutOfMemory`]，不会 abort。
    pub fn try_with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity {
                requested: capacity,
            });
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| QueueError::OutOfMemory {
                requested: capacity,
            })?;
        slots.extend((0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())));

        Ok(Self {
            prod_head: CachePadded::new(AtomicU64::new(0)),
            prod_tail: CachePadded::new(AtomicU64::new(0)),
            cons_tail: CachePadded::new(AtomicU64::new(0)),
            capacity: capacity as u64,
            slots: slots.into_boxed_slice(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// 已发布、尚未被消费的元素数量。
    pub fn len(&self) -> usize {
        // 先读消费计数再读生产计数，保证差值非负。
        let cons = self.cons_tail.load(Ordering::Acquire);
        let prod = self.prod_tail.load(Ordering::Acquire);
        (prod - cons) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, pos: u64) -> &UnsafeCell<MaybeUninit<T>> {
        &self.slots[(pos % self.capacity) as usize]
    }

    /// 批量写入，返回因容量不足而未被接受的尾部元素（保持原顺序）。
    ///
    /// # 执行逻辑（How）
    /// 1. 读取 `prod_head` 与 `cons_tail` 计算空闲槽位，CAS 一次性预留 `min(len, free)` 个槽位；
    /// 2. 依次写入预留槽位；
    /// 3. 等待 `prod_tail` 追上本批起点（前驱生产者全部发布），再以 Release 发布整批。
    pub fn push_batch(&self, items: Vec<T>) -> Vec<T> {
        let wanted = items.len() as u64;
        if wanted == 0 {
            return items;
        }

        let mut head = self.prod_head.load(Ordering::Relaxed);
        let reserved = loop {
            let cons = self.cons_tail.load(Ordering::Acquire);
            // `head` 可能已过期，此时算出的空闲数偏大，但随后的 CAS 必然失败并刷新 `head`。
            let free = self.capacity.wrapping_add(cons).wrapping_sub(head);
            let n = wanted.min(free);
            if n == 0 {
                return items;
            }
            match self.prod_head.compare_exchange_weak(
                head,
                head + n,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break n,
                Err(current) => head = current,
            }
        };

        let mut items = items.into_iter();
        for (offset, item) in items.by_ref().take(reserved as usize).enumerate() {
            self.slot(head + offset as u64).with_mut(|ptr| {
                // SAFETY: `[head, head + reserved)` 已由本生产者独占预留，且 `cons_tail`
                // 的 Acquire 读取保证消费者已读走这些槽位上一轮的内容。
                unsafe {
                    (*ptr).write(item);
                }
            });
        }

        while self.prod_tail.load(Ordering::Acquire) != head {
            spin_wait();
        }
        self.prod_tail.store(head + reserved, Ordering::Release);

        items.collect()
    }

    /// 批量取出至多 `max` 个元素，追加到 `out` 末尾，返回取出数量。
    ///
    /// # Safety
    /// 同一时刻只能有一个线程调用本方法（单消费者）。并发调用会重复读取同一槽位。
    pub unsafe fn pop_burst(&self, max: usize, out: &mut Vec<T>) -> usize {
        let cons = self.cons_tail.load(Ordering::Relaxed);
        let prod = self.prod_tail.load(Ordering::Acquire);
        let n = (prod - cons).min(max as u64);
        if n == 0 {
            return 0;
        }

        out.reserve(n as usize);
        for pos in cons..cons + n {
            let item = self.slot(pos).with_mut(|ptr| {
                // SAFETY: `pos < prod_tail`，槽位已由生产者发布；单消费者保证它只被读取一次。
                unsafe { (*ptr).assume_init_read() }
            });
            out.push(item);
        }
        self.cons_tail.store(cons + n, Ordering::Release);
        n as usize
    }

    /// 独占取出全部元素。
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        // SAFETY: `&mut self` 排除了任何并发生产者与消费者。
        unsafe {
            self.pop_burst(usize::MAX, &mut out);
        }
        out
    }
}

impl<T> Drop for MpscRing<T> {
    fn drop(&mut self) {
        drop(self.drain());
    }
}

impl<T> std::fmt::Debug for MpscRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpscRing")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
