//! 旁路队列：有界 MPSC 环形缓冲 + 高低水位滞回背压。
//!
//! ## 模块定位（Why）
//! - 未命中缓冲会话的报文经由旁路队列交给调度任务转发；
//! - 队列占用越过高水位时向上游发出过载信号，回落到低水位以下才解除，避免在单一阈值附近抖动。
//!
//! ## 结构（How）
//! - [`ring`]：无锁 MPSC 核心；
//! - [`overflow`]：对外的 [`OverflowQueue`]，负责扩缩容、水位与过载信号。

pub mod overflow;
pub mod ring;

pub use overflow::{
    EnqueueOutcome, OverflowQueue, OverloadEdge, OverloadSignal, PressureReading, Watermarks,
};
pub use ring::MpscRing;
