#![deny(unsafe_code)]

//! # spark-upf-buffer
//!
//! ## 定位与职责（Why）
//! - 用户面下行数据缓冲核心：会话处于寻呼/空闲时缓存其下行报文，收到放行命令后一次性转发；
//! - 每个缓冲周期首个报文到达时向控制面发送一次下行数据上报（PFCP Session Report Request）；
//! - 未命中缓冲会话的报文经由带高低水位滞回的旁路队列转发，并据此向上游发出过载信号。
//!
//! ## 架构嵌入（Where）
//! - `packet`：会话标识与报文契约；
//! - `session`：基于 `dashmap` 的会话缓冲仓储；
//! - `queue`：无锁 MPSC 环形缓冲与旁路队列；
//! - `notify`：上报报文构造与 `socket2` 数据报传输；
//! - `classifier` / `scheduler`：报文入口与调度出口；
//! - `module`：组装上述组件并分发控制面命令。
//!
//! ## 并发模型（Trade-offs）
//! - 分类可在任意数量的工作线程上并发执行，调度任务单线程运行；报文类型须为 `Send + Sync`；
//! - 过载边沿在旁路队列的压力闸内翻转并送达上游，两侧观测不会让边沿乱序；
//! - 唯一的 `unsafe` 代码集中在 `queue::ring`，由限定抢占次数的 `loom` 模型（`--cfg spark_loom`）覆盖。

/// 控制面命令与响应。
pub mod command;

/// 配置解析与校验。
///
/// - **契约定位 (What)**：`serde` + `toml`，所有字段带缺省值；
/// - **风险提示 (Trade-offs)**：水位比例过小会导致滞回区间退化。
pub mod config;

pub mod classifier;

/// 错误类型与稳定错误码集中声明处。
pub mod error;

pub mod metrics;
pub mod module;
pub mod notify;
pub mod packet;
pub mod pipeline;

/// 旁路队列。
///
/// - **意图说明 (Why)**：为多个分类线程提供有界、保序的旁路缓冲；
/// - **契约定位 (What)**：容量可在运行期调整，扩缩容期间短暂阻塞生产者与消费者。
pub mod queue;

pub mod scheduler;
pub mod session;

mod sync;

pub use classifier::{BufferClassifier, ClassifyOutcome};
pub use command::{Command, CommandResponse};
pub use config::{BufferConfig, NotifierConfig};
pub use error::{BufferError, ConfigError, NotifierError, QueueError};
pub use metrics::{BufferMetrics, BufferStatsSnapshot};
pub use module::{BufferModule, ShutdownReport};
pub use notify::{ControlPlaneNotifier, NotifierSlot, SessionReport, UdpNotifier};
pub use packet::{Packet, SessionId, SessionTagged};
pub use pipeline::{Downstream, NoopUpstream, Upstream};
pub use queue::{
    EnqueueOutcome, MpscRing, OverflowQueue, OverloadEdge, OverloadSignal, PressureReading,
    Watermarks,
};
pub use scheduler::{ReleaseScheduler, TaskResult};
pub use session::{Session, SessionState, SessionTable};
