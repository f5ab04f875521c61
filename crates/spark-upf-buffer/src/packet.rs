//! 报文引用与会话标识。
//!
//! ## 模块定位（Why）
//! - 会话标识（FAR id）由上游阶段从报文元数据中提取，本模块只约定读取方式；
//! - 核心组件对报文类型保持泛型，便于宿主直接传入自身的报文句柄，`Drop` 即归还到宿主的报文池。
//!
//! ## 契约（What）
//! - [`SessionTagged`]：核心对报文的唯一要求，提供可选会话标识与线上长度；
//! - [`Packet`]：基于 `bytes::Bytes` 的默认实现，供回放工具与测试使用。

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 转发动作规则（FAR）标识，即本 crate 所说的“会话标识”。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u32);

impl SessionId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for SessionId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 携带会话标识属性的报文。
///
/// # 教案式说明
/// - **意图 (Why)**：会话标识的提取属于上游职责，核心只需读取结果；缺失属性视为“无匹配会话”，报文走旁路。
/// - **契约 (What)**：
///   - `session_id`：返回上游写入的属性；`None` 表示属性缺失；
///   - `wire_len`：报文字节长度，调度器据此向宿主汇报 `bits`；
///   - 实现者须满足 `Send + Sync + 'static`：报文会跨越分类线程与调度任务，
///     且会话缓冲驻留在共享的 `DashMap` 中，模块要在多个分类线程间共享就要求报文可 `Sync`。
pub trait SessionTagged: Send + Sync + 'static {
    fn session_id(&self) -> Option<SessionId>;

    fn wire_len(&self) -> usize;
}

/// 默认报文实现：会话属性 + 只读负载。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    session: Option<SessionId>,
    payload: Bytes,
}

impl Packet {
    /// 构造带会话属性的报文。
    pub fn tagged(session: impl Into<SessionId>, payload: impl Into<Bytes>) -> Self {
        Self {
            session: Some(session.into()),
            payload: payload.into(),
        }
    }

    /// 构造缺失会话属性的报文，分类时必然进入旁路队列。
    pub fn untagged(payload: impl Into<Bytes>) -> Self {
        Self {
            session: None,
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl SessionTagged for Packet {
    fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    fn wire_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_packet_has_no_session() {
        let pkt = Packet::untagged(&b"abc"[..]);
        assert_eq!(pkt.session_id(), None);
        assert_eq!(pkt.wire_len(), 3);

        let tagged = Packet::tagged(7u32, Bytes::from_static(b"x"));
        assert_eq!(tagged.session_id(), Some(SessionId::new(7)));
    }
}
