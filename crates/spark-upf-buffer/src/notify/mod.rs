//! 控制面上报：传输契约、报文构造与运行期可替换的上报槽。
//!
//! ## 模块定位（Why）
//! - 缓冲周期内首个报文到达时需通知控制面发起寻呼；传输细节（对端地址、套接字）在运行期通过命令配置，
//!   因此报文路径只依赖 [`ControlPlaneNotifier`] 契约；
//! - 上报是“发射即忘”：失败只记录与计数，不重试，也不回传到报文路径。
//!
//! ## 结构（How）
//! - [`report`]：31 字节 Session Report Request 的构造；
//! - [`udp`]：基于 `socket2` 的已连接、非阻塞数据报传输；
//! - [`NotifierSlot`]：以 `ArcSwapOption` 承载当前传输，读路径无锁，配置命令原子替换。

pub mod report;
pub mod udp;

pub use report::{REPORT_LEN, SessionReport};
pub use udp::UdpNotifier;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arc_swap::ArcSwapOption;

use crate::error::NotifierError;
use crate::packet::SessionId;

/// 控制面上报传输契约。
///
/// # 教案式说明
/// - **契约 (What)**：`send` 通过预先建立的传输发送一次上报；实现不得阻塞调用线程，
///   调用方视失败为非致命。
/// - **风险 (Trade-offs)**：调用发生在分类线程上，若实现内部需要等待（如 TCP 重连），应自行异步化。
pub trait ControlPlaneNotifier: Send + Sync {
    fn send(&self, report: &SessionReport) -> Result<(), NotifierError>;
}

impl<N> ControlPlaneNotifier for Arc<N>
where
    N: ControlPlaneNotifier + ?Sized,
{
    fn send(&self, report: &SessionReport) -> Result<(), NotifierError> {
        (**self).send(report)
    }
}

impl<N> ControlPlaneNotifier for Box<N>
where
    N: ControlPlaneNotifier + ?Sized,
{
    fn send(&self, report: &SessionReport) -> Result<(), NotifierError> {
        (**self).send(report)
    }
}

/// `ArcSwapOption` 需要定长载荷，故以此包装动态传输。
struct NotifierHandle(Box<dyn ControlPlaneNotifier>);

/// 运行期可替换的上报槽。
///
/// # 教案式说明
/// - **意图 (Why)**：配置命令与报文路径并发执行，读取当前传输必须无锁；
/// - **契约 (What)**：
///   - `install` 原子替换传输，已在途的发送继续使用旧传输直至完成；
///   - `notify` 为会话构造上报（SEID = 会话标识，序号单调递增、24 位回绕）；
///     未配置传输时返回 [`NotifierError::NotConfigured`]。
pub struct NotifierSlot {
    current: ArcSwapOption<NotifierHandle>,
    sequence: AtomicU32,
    pdr_id: u16,
}

impl NotifierSlot {
    pub fn new(pdr_id: u16) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            sequence: AtomicU32::new(0),
            pdr_id,
        }
    }

    pub fn install<N>(&self, notifier: N)
    where
        N: ControlPlaneNotifier + 'static,
    {
        self.current
            .store(Some(Arc::new(NotifierHandle(Box::new(notifier)))));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn is_configured(&self) -> bool {
        self.current.load().is_some()
    }

    /// 为会话发送一次下行数据上报。
    pub fn notify(&self, session: SessionId) -> Result<SessionReport, NotifierError> {
        let guard = self.current.load();
        let handle = guard.as_ref().ok_or(NotifierError::NotConfigured)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let report = SessionReport::downlink_data(session, sequence, self.pdr_id);
        handle.0.send(&report)?;
        Ok(report)
    }
}

impl std::fmt::Debug for NotifierSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierSlot")
            .field("configured", &self.is_configured())
            .field("pdr_id", &self.pdr_id)
            .finish()
    }
}
