//! # ReleaseScheduler：放行与旁路出队任务
//!
//! ## 核心意图（Why）
//! - 宿主调度器周期性调用 [`ReleaseScheduler::run_task`]，由它把已放行会话的缓冲与旁路队列中的报文交给下游；
//! - 旁路出队受下游背压约束，放行不受约束：放行来自控制面的显式命令，延迟放行只会拉长寻呼时延。
//!
//! ## 执行流程（How）
//! 1. 取走全部 `Released` 会话的缓冲，逐会话整批转发；
//! 2. 下游处于过载 → 返回阻塞结果，不触碰旁路队列；
//! 3. 出队至多 `burst_size` 个旁路报文，观测水位，出现 `Cleared` 边沿时通知上游；
//! 4. 旁路为空 → 阻塞结果；否则转发并返回处理量。
//!
//! ## 风险提示（Trade-offs）
//! - `run_task` 必须由单一任务调用；并发调用不会破坏队列（消费侧有互斥），但会打乱跨突发的转发顺序。

use tracing::{debug, info};

use crate::metrics::BufferMetrics;
use crate::packet::SessionTagged;
use crate::pipeline::{Downstream, Upstream, propagate_pressure};
use crate::queue::OverflowQueue;
use crate::session::SessionTable;

/// 单次调度的结果，供宿主做公平性记账。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TaskResult {
    /// `true` 表示本周期没有可继续处理的旁路工作，宿主可让出调度。
    pub block: bool,
    /// 本周期转发的报文数（放行 + 旁路）。
    pub packets: u32,
    /// 本周期转发的比特数。
    pub bits: u64,
}

impl TaskResult {
    /// 未做任何工作的阻塞结果。
    pub const fn blocked() -> Self {
        Self {
            block: true,
            packets: 0,
            bits: 0,
        }
    }

    fn account<P: SessionTagged>(&mut self, batch: &[P]) {
        let count = u32::try_from(batch.len()).unwrap_or(u32::MAX);
        self.packets = self.packets.saturating_add(count);
        let bits: u64 = batch.iter().map(|p| p.wire_len() as u64 * 8).sum();
        self.bits = self.bits.saturating_add(bits);
    }
}

/// 放行调度器，借用模块共享状态。
pub struct ReleaseScheduler<'a, P> {
    sessions: &'a SessionTable<P>,
    queue: &'a OverflowQueue<P>,
    downstream: &'a dyn Downstream<P>,
    upstream: &'a dyn Upstream,
    metrics: &'a BufferMetrics,
    burst_size: usize,
}

impl<'a, P: SessionTagged> ReleaseScheduler<'a, P> {
    pub fn new(
        sessions: &'a SessionTable<P>,
        queue: &'a OverflowQueue<P>,
        downstream: &'a dyn Downstream<P>,
        upstream: &'a dyn Upstream,
        metrics: &'a BufferMetrics,
        burst_size: usize,
    ) -> Self {
        Self {
            sessions,
            queue,
            downstream,
            upstream,
            metrics,
            burst_size,
        }
    }

    /// 执行一次调度。
    ///
    /// # 契约（What）
    /// - 每个已放行会话的缓冲作为一个批次转发，批次内保持到达顺序；
    /// - 返回的 `packets`/`bits` 同时包含放行与旁路的报文，阻塞结果也会计入本周期已放行的部分。
    pub fn run_task(&self) -> TaskResult {
        let mut result = TaskResult::blocked();

        for batch in self.sessions.take_released() {
            let released = batch.packets.len();
            result.account(&batch.packets);
            self.metrics.record_released(released as u64);
            info!(session_id = %batch.session, released, "forwarding released session buffer");
            self.downstream.forward(batch.packets);
        }

        if self.downstream.is_overloaded() {
            debug!("downstream overloaded, leaving bypass queue untouched");
            return result;
        }

        let burst = self.queue.dequeue_burst(self.burst_size);
        let reading = propagate_pressure(self.queue, self.upstream, self.metrics);

        if burst.is_empty() {
            return result;
        }
        result.account(&burst);
        self.metrics.record_forwarded(burst.len() as u64);
        debug!(
            forwarded = burst.len(),
            occupancy = reading.occupancy,
            "forwarding bypass burst"
        );
        self.downstream.forward(burst);
        result.block = false;
        result
    }
}
