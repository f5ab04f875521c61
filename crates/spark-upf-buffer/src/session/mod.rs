//! # 会话缓冲状态（Session）
//!
//! ## 核心意图（Why）
//! - 建模寻呼期间的下行缓冲会话：控制面下发 Add 后开始缓冲，下发 Release 后由调度任务一次性放行；
//! - 每个缓冲周期（episode）只向控制面上报一次，`notify_pending` 记录本周期是否仍待上报。
//!
//! ## 状态机约束（What）
//! - `Buffering(notify_pending) --release--> Released --drain--> Released`；
//! - 任何状态下再次 Add 都会回到 `Buffering(notify_pending = true)`，并保留已缓冲的报文；
//! - 放行后保持 `Released`，直到下一次 Add 显式重新武装。期间到达的报文不会被缓冲，直接走旁路。

mod table;

pub use table::{BufferOutcome, ReleasedBatch, SessionRef, SessionTable};

use std::collections::VecDeque;

use crate::packet::SessionId;

/// 会话缓冲状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// 正在缓冲该会话的下行报文。
    Buffering,
    /// 已收到放行命令，缓冲内容等待调度任务转发。
    Released,
}

/// 单个会话的缓冲记录。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `buffered` 的顺序即到达顺序，放行时原序转发；
///   - `notify_pending` 仅在 `Buffering` 且本周期尚未上报时为 `true`；
///   - `episodes` 统计被 Add 武装的次数，用于观测重复寻呼。
/// - **风险 (Trade-offs)**：记录在放行后不会自动回收，需由 `RemoveSession` 命令显式移除。
#[derive(Debug)]
pub struct Session<P> {
    id: SessionId,
    buffered: VecDeque<P>,
    state: SessionState,
    notify_pending: bool,
    episodes: u64,
}

impl<P> Session<P> {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            buffered: VecDeque::new(),
            state: SessionState::Buffering,
            notify_pending: true,
            episodes: 1,
        }
    }

    /// 重新武装：回到缓冲态并恢复待上报标记，已缓冲报文保持不变。
    pub(crate) fn rearm(&mut self) {
        self.state = SessionState::Buffering;
        self.notify_pending = true;
        self.episodes += 1;
    }

    /// 标记放行。放行即结束当前周期，未发送的上报不再补发。
    pub(crate) fn release(&mut self) {
        self.state = SessionState::Released;
        self.notify_pending = false;
    }

    pub(crate) fn push(&mut self, packet: P) {
        self.buffered.push_back(packet);
    }

    /// 取出本周期待上报标记，保证一次周期最多上报一次。
    pub(crate) fn take_notify(&mut self) -> bool {
        std::mem::replace(&mut self.notify_pending, false)
    }

    /// 以空缓冲替换当前缓冲并返回原内容。
    pub(crate) fn take_buffered(&mut self) -> Vec<P> {
        Vec::from(std::mem::take(&mut self.buffered))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn notify_pending(&self) -> bool {
        self.notify_pending
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn buffered(&self) -> impl Iterator<Item = &P> {
        self.buffered.iter()
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn is_buffering(&self) -> bool {
        self.state == SessionState::Buffering
    }
}
