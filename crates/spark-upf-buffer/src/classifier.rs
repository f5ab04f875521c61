//! # BufferClassifier：入口批次分类
//!
//! ## 核心意图（Why）
//! - 对每个入口批次逐包判定去向：命中缓冲会话则追加到会话缓冲，否则汇入旁路批次；
//! - 缓冲周期内首个报文触发一次控制面上报，上报在条目锁释放之后发送，避免持锁做 I/O。
//!
//! ## 执行流程（How）
//! 1. [`SessionTable::buffer_packet`] 在条目锁内完成判态、追加与取上报标记；
//! 2. 需要上报时经由 [`NotifierSlot`] 发送，失败记录 `warn` 并计数，不重试；
//! 3. 旁路报文整批调用一次 `enqueue_batch`，未被接受的尾部在此处释放；
//! 4. 批次结束后观测队列水位，出现 `Raised` 边沿时通知上游。
//!
//! ## 风险提示（Trade-offs）
//! - 分类器只借用模块内的共享状态，可以在任意数量的工作线程上并发构造与调用。

use tracing::{debug, warn};

use crate::metrics::BufferMetrics;
use crate::notify::NotifierSlot;
use crate::packet::SessionTagged;
use crate::pipeline::{Upstream, propagate_pressure};
use crate::queue::OverflowQueue;
use crate::session::{BufferOutcome, SessionTable};

/// 单个批次的分类结果。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClassifyOutcome {
    /// 追加到会话缓冲的报文数。
    pub buffered: usize,
    /// 被旁路队列接受的报文数。
    pub bypassed: usize,
    /// 因会话缓冲已满或旁路队列已满而丢弃的报文数。
    pub dropped: usize,
    /// 成功发送的上报次数。
    pub notifications: usize,
    pub notify_failures: usize,
}

/// 入口分类器，借用模块共享状态。
pub struct BufferClassifier<'a, P> {
    sessions: &'a SessionTable<P>,
    queue: &'a OverflowQueue<P>,
    notifier: &'a NotifierSlot,
    upstream: &'a dyn Upstream,
    metrics: &'a BufferMetrics,
}

impl<'a, P: SessionTagged> BufferClassifier<'a, P> {
    pub fn new(
        sessions: &'a SessionTable<P>,
        queue: &'a OverflowQueue<P>,
        notifier: &'a NotifierSlot,
        upstream: &'a dyn Upstream,
        metrics: &'a BufferMetrics,
    ) -> Self {
        Self {
            sessions,
            queue,
            notifier,
            upstream,
            metrics,
        }
    }

    /// 分类一个入口批次。
    ///
    /// # 契约（What）
    /// - 同一会话的报文按批次内顺序追加；
    /// - 旁路报文保持批次内相对顺序入队；
    /// - 返回值中的计数同时累加到 [`BufferMetrics`]。
    pub fn process_batch<I>(&self, batch: I) -> ClassifyOutcome
    where
        I: IntoIterator<Item = P>,
    {
        let batch = batch.into_iter();
        let mut outcome = ClassifyOutcome::default();
        let mut bypass = Vec::with_capacity(batch.size_hint().0);

        for packet in batch {
            match self.sessions.buffer_packet(packet) {
                BufferOutcome::Buffered { session, notify } => {
                    outcome.buffered += 1;
                    if notify {
                        match self.notifier.notify(session) {
                            Ok(report) => {
                                outcome.notifications += 1;
                                debug!(session_id = %session, sequence = report.sequence, "downlink data report sent");
                            }
                            Err(err) => {
                                outcome.notify_failures += 1;
                                warn!(session_id = %session, error = %err, "failed to notify control plane");
                            }
                        }
                    }
                }
                BufferOutcome::SessionFull { session, packet } => {
                    outcome.dropped += 1;
                    self.metrics.record_session_overflow(1);
                    warn!(
                        session_id = %session,
                        limit = self.sessions.session_limit(),
                        "session buffer full, dropping packet"
                    );
                    drop(packet);
                }
                BufferOutcome::Bypass(packet) => bypass.push(packet),
            }
        }

        if !bypass.is_empty() {
            let enqueued = self.queue.enqueue_batch(bypass);
            outcome.bypassed = enqueued.accepted;
            let rejected = enqueued.rejected.len();
            if rejected > 0 {
                outcome.dropped += rejected;
                warn!(
                    dropped = rejected,
                    occupancy = enqueued.occupancy,
                    "bypass queue full, dropping packets"
                );
            }
            self.metrics
                .record_bypass(enqueued.accepted as u64, rejected as u64);
        }

        let reading = propagate_pressure(self.queue, self.upstream, self.metrics);

        self.metrics.record_buffered(outcome.buffered as u64);
        self.metrics.record_notifications(
            outcome.notifications as u64,
            outcome.notify_failures as u64,
        );
        debug!(
            buffered = outcome.buffered,
            bypassed = outcome.bypassed,
            dropped = outcome.dropped,
            occupancy = reading.occupancy,
            "classified ingress batch"
        );
        outcome
    }
}
