//! # SessionTable：会话缓冲仓储
//!
//! ## 核心意图（Why）
//! - 以 `DashMap` 按会话标识分片存储，分类线程查询/追加与控制面 Add/Release 之间通过分片锁串行化，
//!   查找成本与会话总数无关；
//! - 每个会话的状态只在持有其条目锁时修改，分类线程与调度任务之间不共享裸可变状态。
//!
//! ## 行为契约（What）
//! - `add_session`：不存在则插入，存在则重新武装，始终成功；
//! - `mark_released`：未知标识静默忽略；
//! - `buffer_packet`：分类热路径，在条目锁内完成“判态 + 追加 + 取上报标记”；
//! - `take_released`：调度任务的放行入口，一次取走全部已放行会话的缓冲。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` guard 在持有期间会阻塞同分片写操作，调用者应缩短持有时间，禁止持锁发送上报；
//! - `take_released` 需遍历全表，借助 `released_hint` 计数在无放行命令时跳过扫描。

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, mapref::entry::Entry, mapref::one::Ref};

use super::{Session, SessionState};
use crate::packet::{SessionId, SessionTagged};

/// 分类热路径上单个报文的去向。
#[derive(Debug)]
pub enum BufferOutcome<P> {
    /// 已追加到会话缓冲；`notify` 为 `true` 时调用方需发送本周期唯一一次上报。
    Buffered { session: SessionId, notify: bool },
    /// 会话缓冲已达上限，报文被尾部丢弃。
    SessionFull { session: SessionId, packet: P },
    /// 无匹配的缓冲会话，报文应进入旁路队列。
    Bypass(P),
}

/// 一次放行取出的会话缓冲。
#[derive(Debug)]
pub struct ReleasedBatch<P> {
    pub session: SessionId,
    pub packets: Vec<P>,
}

/// `DashMap` 读锁的类型别名，简化调用方签名。
pub type SessionRef<'a, P> = Ref<'a, SessionId, Session<P>>;

/// 会话缓冲仓储。
///
/// # 教案式注释
/// - **意图 (Why)**：封装并发安全存储，避免分类器/调度器直接操作 `DashMap`；
/// - **契约 (What)**：`session_limit` 为单会话缓冲上限，超出后尾部丢弃；
/// - **风险 (Trade-offs)**：会话记录在进程生命周期内累积，需由上层下发移除命令回收。
#[derive(Debug)]
pub struct SessionTable<P> {
    sessions: DashMap<SessionId, Session<P>>,
    released_hint: AtomicUsize,
    session_limit: usize,
}

impl<P: SessionTagged> SessionTable<P> {
    pub fn new(session_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            released_hint: AtomicUsize::new(0),
            session_limit,
        }
    }

    /// 注册或重新武装会话。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 不存在时插入 `{Buffering, notify_pending = true, 空缓冲}`，返回 `true`；
    ///   - 已存在时恢复到 `Buffering` 并重新置位 `notify_pending`，保留已缓冲报文，返回 `false`；
    /// - **后置条件**：表中该标识恰有一条记录。
    pub fn add_session(&self, id: SessionId) -> bool {
        match self.sessions.entry(id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().rearm();
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Session::new(id));
                true
            }
        }
    }

    /// 标记会话放行；未知标识返回 `false` 且不做任何修改。
    pub fn mark_released(&self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.release();
                // 条目锁内递增，保证调度器观测到计数时状态已可见。
                self.released_hint.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// 只读查询。
    pub fn lookup(&self, id: SessionId) -> Option<SessionRef<'_, P>> {
        self.sessions.get(&id)
    }

    /// 移除会话并返回仍在缓冲中的报文，调用方负责释放。
    pub fn remove_session(&self, id: SessionId) -> Option<Vec<P>> {
        self.sessions
            .remove(&id)
            .map(|(_, mut session)| session.take_buffered())
    }

    /// 分类热路径：尝试把报文追加到其会话缓冲。
    ///
    /// # 执行逻辑（How）
    /// 1. 报文缺失会话属性或会话不存在 → `Bypass`；
    /// 2. 会话非 `Buffering` → `Bypass`；
    /// 3. 缓冲已满 → `SessionFull`（上报标记不受影响）；
    /// 4. 追加后取出上报标记，由调用方在释放条目锁之后发送。
    pub fn buffer_packet(&self, packet: P) -> BufferOutcome<P> {
        let Some(id) = packet.session_id() else {
            return BufferOutcome::Bypass(packet);
        };
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return BufferOutcome::Bypass(packet);
        };
        if !session.is_buffering() {
            return BufferOutcome::Bypass(packet);
        }
        if session.buffered_len() >= self.session_limit {
            return BufferOutcome::SessionFull {
                session: id,
                packet,
            };
        }
        session.push(packet);
        let notify = session.take_notify();
        BufferOutcome::Buffered {
            session: id,
            notify,
        }
    }

    /// 取走全部 `Released` 会话的缓冲内容。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：一次调度周期内放行所有已放行会话，而非只处理首个命中；
    /// - **契约 (What)**：返回的每个批次保持到达顺序；空缓冲的会话不出现在结果中；
    ///   会话状态保持 `Released`，等待下一次 Add；
    /// - **执行 (How)**：先清零 `released_hint`，再遍历全表。遍历期间新到的放行命令会再次递增计数，
    ///   由下一次调度周期处理。
    pub fn take_released(&self) -> Vec<ReleasedBatch<P>> {
        if self.released_hint.swap(0, Ordering::AcqRel) == 0 {
            return Vec::new();
        }
        let mut batches = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            if entry.state() != SessionState::Released || entry.buffered_len() == 0 {
                continue;
            }
            let session = *entry.key();
            let packets = entry.value_mut().take_buffered();
            batches.push(ReleasedBatch { session, packets });
        }
        batches
    }

    /// 清空全部会话缓冲，用于模块关停。
    pub fn drain_all(&self) -> Vec<P> {
        let mut packets = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            packets.extend(entry.value_mut().take_buffered());
        }
        packets
    }

    /// 当前缓冲在各会话中的报文总数。
    pub fn buffered_total(&self) -> usize {
        self.sessions
            .iter()
            .map(|entry| entry.buffered_len())
            .sum()
    }

    pub fn session_limit(&self) -> usize {
        self.session_limit
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
