//! 缓冲核心性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以随机操作序列驱动真实组件，并与一个直观的影子模型逐步比对，
//!   覆盖手写用例难以穷举的交错：旁路队列的有界 FIFO、水位滞回、每个缓冲周期恰好一次上报、放行保序。
//! - **设计手法 (How)**：`proptest` 生成操作序列；影子模型只用 `VecDeque`/`HashMap` 等标准容器表达期望语义。
//! - **合同 (What)**：任一步骤出现偏差即失败，并由 proptest 收缩出最短反例。

#![cfg(not(any(loom, spark_loom)))]

mod support;

use std::collections::{HashMap, VecDeque};

use proptest::prelude::*;
use spark_upf_buffer::{
    OverflowQueue, OverloadEdge, OverloadSignal, Packet, SessionId, SessionState, Watermarks,
};
use support::{Harness, tags};

#[derive(Clone, Debug)]
enum QueueOp {
    Enqueue(usize),
    Dequeue(usize),
}

fn queue_ops() -> impl Strategy<Value = Vec<QueueOp>> {
    prop::collection::vec(
        prop_oneof![
            (1usize..40).prop_map(QueueOp::Enqueue),
            (1usize..40).prop_map(QueueOp::Dequeue),
        ],
        1..80,
    )
}

#[derive(Clone, Debug)]
enum SessionOp {
    Add(u32),
    Release(u32),
    Packet(u32),
    Tick,
}

fn session_ops() -> impl Strategy<Value = Vec<SessionOp>> {
    prop::collection::vec(
        prop_oneof![
            1 => (0u32..4).prop_map(SessionOp::Add),
            1 => (0u32..4).prop_map(SessionOp::Release),
            4 => (0u32..4).prop_map(SessionOp::Packet),
            1 => Just(SessionOp::Tick),
        ],
        1..120,
    )
}

/// 影子会话：仅记录状态与待上报标记。
#[derive(Default)]
struct ShadowSession {
    buffering: bool,
    notify_pending: bool,
}

proptest! {
    #[test]
    fn bypass_queue_is_bounded_fifo(capacity in 1usize..64, ops in queue_ops()) {
        let queue = OverflowQueue::<u64>::with_capacity(capacity).unwrap();
        let mut model = VecDeque::new();
        let mut next = 0u64;

        for op in ops {
            match op {
                QueueOp::Enqueue(n) => {
                    let batch: Vec<u64> = (next..next + n as u64).collect();
                    next += n as u64;
                    let outcome = queue.enqueue_batch(batch.clone());
                    let room = capacity - model.len();
                    let accepted = n.min(room);
                    prop_assert_eq!(outcome.accepted, accepted);
                    prop_assert_eq!(&outcome.rejected[..], &batch[accepted..]);
                    model.extend(batch[..accepted].iter().copied());
                }
                QueueOp::Dequeue(n) => {
                    let got = queue.dequeue_burst(n);
                    let take = n.min(model.len());
                    let expected: Vec<u64> = model.drain(..take).collect();
                    prop_assert_eq!(got, expected);
                }
            }
            prop_assert_eq!(queue.occupancy(), model.len());
        }
    }

    #[test]
    fn overload_signal_has_hysteresis(
        capacity in 8usize..2048,
        permille in prop::collection::vec(0usize..=1000, 1..200),
    ) {
        let watermarks = Watermarks::for_capacity(capacity, 0.90, 0.15);
        let signal = OverloadSignal::new();
        let mut raised = false;

        for step in permille {
            let occupancy = capacity * step / 1000;
            let edge = signal.observe(occupancy, &watermarks);
            let expected = if !raised && occupancy > watermarks.high {
                raised = true;
                Some(OverloadEdge::Raised)
            } else if raised && occupancy <= watermarks.low {
                raised = false;
                Some(OverloadEdge::Cleared)
            } else {
                None
            };
            prop_assert_eq!(edge, expected);
            prop_assert_eq!(signal.is_raised(), raised);
        }
    }

    #[test]
    fn each_buffering_episode_reports_exactly_once(ops in session_ops()) {
        let harness = Harness::with_defaults();
        let mut shadow: HashMap<u32, ShadowSession> = HashMap::new();
        let mut expected_reports: Vec<u64> = Vec::new();

        for op in ops {
            match op {
                SessionOp::Add(id) => {
                    harness.module.add_session(SessionId::new(id));
                    let entry = shadow.entry(id).or_default();
                    entry.buffering = true;
                    entry.notify_pending = true;
                }
                SessionOp::Release(id) => {
                    harness.module.release_session(SessionId::new(id));
                    if let Some(entry) = shadow.get_mut(&id) {
                        entry.buffering = false;
                        entry.notify_pending = false;
                    }
                }
                SessionOp::Packet(id) => {
                    harness.module.process_batch(vec![Packet::tagged(id, vec![0u8])]);
                    if let Some(entry) = shadow.get_mut(&id) {
                        if entry.buffering && entry.notify_pending {
                            entry.notify_pending = false;
                            expected_reports.push(u64::from(id));
                        }
                    }
                }
                SessionOp::Tick => {
                    harness.module.run_task();
                }
            }
        }

        let reported: Vec<u64> = harness.notifier.reports().iter().map(|r| r.seid).collect();
        prop_assert_eq!(reported, expected_reports);
        for (id, entry) in &shadow {
            let session = harness.module.session(SessionId::new(*id)).unwrap();
            let state = if entry.buffering { SessionState::Buffering } else { SessionState::Released };
            prop_assert_eq!(session.state(), state);
            prop_assert_eq!(session.notify_pending(), entry.notify_pending);
        }
    }

    #[test]
    fn release_preserves_arrival_order(
        payloads in prop::collection::vec(any::<u8>(), 1..200),
        batch_size in 1usize..16,
    ) {
        let harness = Harness::with_defaults();
        let session = SessionId::new(1);
        harness.module.add_session(session);
        for chunk in payloads.chunks(batch_size) {
            harness
                .module
                .process_batch(chunk.iter().map(|&b| Packet::tagged(session, vec![b])));
        }
        harness.module.release_session(session);
        let result = harness.module.run_task();
        prop_assert_eq!(result.packets as usize, payloads.len());

        let batches = harness.sink.take_batches();
        prop_assert_eq!(batches.len(), 1);
        prop_assert_eq!(tags(&batches[0]), payloads);
        prop_assert_eq!(harness.notifier.reports().len(), 1);
    }
}
