//! # BufferModule：缓冲核心门面
//!
//! ## 核心意图（Why）
//! - 把会话仓储、旁路队列、上报槽、计数与出口契约组装为一个可跨线程共享的对象，
//!   宿主只需持有 `Arc<BufferModule<P>>` 并在工作线程调用 [`process_batch`](BufferModule::process_batch)、
//!   在调度任务调用 [`run_task`](BufferModule::run_task)、在命令通道调用 [`handle_command`](BufferModule::handle_command)；
//!
//! ## 契约（What）
//! - 构造时校验配置；配置中预置的上报对端在构造阶段连接，失败即构造失败；
//! - 命令处理与报文路径可以并发进行，各组件自身保证一致性；
//! - [`shutdown`](BufferModule::shutdown) 释放全部在缓冲与在队报文，之后模块仍可继续使用。

use tracing::{debug, info, warn};

use crate::classifier::{BufferClassifier, ClassifyOutcome};
use crate::command::{Command, CommandResponse};
use crate::config::BufferConfig;
use crate::error::BufferError;
use crate::metrics::{BufferMetrics, BufferStatsSnapshot};
use crate::notify::{ControlPlaneNotifier, NotifierSlot, UdpNotifier};
use crate::packet::{SessionId, SessionTagged};
use crate::pipeline::{Downstream, Upstream};
use crate::queue::OverflowQueue;
use crate::scheduler::{ReleaseScheduler, TaskResult};
use crate::session::{SessionRef, SessionTable};

/// 下行数据缓冲模块。
pub struct BufferModule<P> {
    config: BufferConfig,
    sessions: SessionTable<P>,
    queue: OverflowQueue<P>,
    notifier: NotifierSlot,
    metrics: BufferMetrics,
    downstream: Box<dyn Downstream<P>>,
    upstream: Box<dyn Upstream>,
}

/// 关停时释放的报文数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ShutdownReport {
    pub session_packets: usize,
    pub queued_packets: usize,
}

impl<P: SessionTagged> BufferModule<P> {
    pub fn new<D, U>(config: BufferConfig, downstream: D, upstream: U) -> Result<Self, BufferError>
    where
        D: Downstream<P> + 'static,
        U: Upstream + 'static,
    {
        config.validate()?;
        let queue = OverflowQueue::with_watermark_ratios(
            config.queue_capacity,
            config.high_watermark_ratio,
            config.low_watermark_ratio,
        )?;
        let notifier = NotifierSlot::new(config.report_pdr_id);
        if let Some(peer) = &config.notifier {
            notifier.install(UdpNotifier::connect(&peer.peer_address, peer.port)?);
        }
        let watermarks = queue.watermarks();
        info!(
            capacity = config.queue_capacity,
            high = watermarks.high,
            low = watermarks.low,
            burst = config.burst_size,
            notifier = notifier.is_configured(),
            "buffer module initialised"
        );
        Ok(Self {
            sessions: SessionTable::new(config.session_buffer_limit),
            queue,
            notifier,
            metrics: BufferMetrics::default(),
            downstream: Box::new(downstream),
            upstream: Box::new(upstream),
            config,
        })
    }

    /// 入口：分类一个报文批次。
    pub fn process_batch<I>(&self, batch: I) -> ClassifyOutcome
    where
        I: IntoIterator<Item = P>,
    {
        BufferClassifier::new(
            &self.sessions,
            &self.queue,
            &self.notifier,
            self.upstream.as_ref(),
            &self.metrics,
        )
        .process_batch(batch)
    }

    /// 调度入口：执行一次放行与旁路出队。
    pub fn run_task(&self) -> TaskResult {
        ReleaseScheduler::new(
            &self.sessions,
            &self.queue,
            self.downstream.as_ref(),
            self.upstream.as_ref(),
            &self.metrics,
            self.config.burst_size,
        )
        .run_task()
    }

    /// 命令分发。
    pub fn handle_command(&self, command: Command) -> CommandResponse {
        debug!(?command, "handling buffer command");
        let result = match command {
            Command::AddSession { session_id } => {
                self.add_session(session_id);
                Ok(())
            }
            Command::ReleaseSession { session_id } => {
                self.release_session(session_id);
                Ok(())
            }
            Command::ConfigureNotifierTransport { peer_address, port } => {
                self.configure_notifier_transport(&peer_address, port)
            }
            Command::RemoveSession { session_id } => {
                self.remove_session(session_id);
                Ok(())
            }
            Command::ResizeQueue { capacity } => self.resize_queue(capacity).map(|_| ()),
        };
        if let Err(err) = &result {
            warn!(code = err.code(), error = %err, "buffer command failed");
        }
        CommandResponse::from(result)
    }

    /// 开始或重新开始缓冲会话；返回是否为新建记录。
    pub fn add_session(&self, session_id: SessionId) -> bool {
        let created = self.sessions.add_session(session_id);
        info!(session_id = %session_id, created, "session armed for buffering");
        created
    }

    /// 放行会话；未知会话静默成功。
    pub fn release_session(&self, session_id: SessionId) -> bool {
        let known = self.sessions.mark_released(session_id);
        if known {
            info!(session_id = %session_id, "session released");
        } else {
            debug!(session_id = %session_id, "release for unknown session ignored");
        }
        known
    }

    /// 移除会话，返回随之释放的缓冲报文数。
    pub fn remove_session(&self, session_id: SessionId) -> usize {
        let freed = self
            .sessions
            .remove_session(session_id)
            .map_or(0, |packets| packets.len());
        info!(session_id = %session_id, freed, "session removed");
        freed
    }

    /// 连接控制面对端并替换当前上报传输；失败时保留原传输。
    pub fn configure_notifier_transport(&self, peer_address: &str, port: u16) -> Result<(), BufferError> {
        let transport = UdpNotifier::connect(peer_address, port)?;
        info!(peer = %transport.peer(), "control-plane notifier configured");
        self.notifier.install(transport);
        Ok(())
    }

    /// 注入自定义上报传输。
    pub fn install_notifier<N>(&self, notifier: N)
    where
        N: ControlPlaneNotifier + 'static,
    {
        self.notifier.install(notifier);
    }

    /// 调整旁路队列容量，返回因缩容被丢弃的报文数。
    pub fn resize_queue(&self, capacity: usize) -> Result<usize, BufferError> {
        let dropped = self.queue.resize(capacity)?.len();
        self.metrics.record_resize_drops(dropped as u64);
        Ok(dropped)
    }

    /// 释放全部在缓冲与在队报文。
    pub fn shutdown(&self) -> ShutdownReport {
        let report = ShutdownReport {
            session_packets: self.sessions.drain_all().len(),
            queued_packets: self.queue.drain().len(),
        };
        info!(
            session_packets = report.session_packets,
            queued_packets = report.queued_packets,
            "buffer module drained"
        );
        report
    }

    pub fn stats(&self) -> BufferStatsSnapshot {
        BufferStatsSnapshot {
            queue_occupancy: self.queue.occupancy(),
            queue_capacity: self.queue.capacity(),
            sessions: self.sessions.len(),
            ..self.metrics.snapshot()
        }
    }

    pub fn session(&self, session_id: SessionId) -> Option<SessionRef<'_, P>> {
        self.sessions.lookup(session_id)
    }

    pub fn queue(&self) -> &OverflowQueue<P> {
        &self.queue
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn is_overloaded(&self) -> bool {
        self.queue.is_overloaded()
    }

    pub fn notifier_configured(&self) -> bool {
        self.notifier.is_configured()
    }
}

impl<P: SessionTagged> std::fmt::Debug for BufferModule<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferModule")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("queue", &self.queue)
            .field("notifier", &self.notifier)
            .finish()
    }
}
