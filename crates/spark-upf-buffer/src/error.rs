//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为缓冲核心对外暴露的错误语义提供集中定义，覆盖队列容量管理、控制面上报传输与配置解析三类失败；
//! - 命令入口需要把错误折叠为 `Failure(reason)`，因此每个错误都提供稳定的错误码，便于运维检索。
//!
//! ## 设计要求（What）
//! - 所有错误类型均派生 `thiserror::Error`，保留底层 `std::io::Error`/`toml` 错误作为 `source`；
//! - 报文路径上的失败（上报发送失败、队列溢出）不会经由这些类型抛给入口调用方，只记录日志与计数。

use std::io;

use thiserror::Error;

/// 旁路队列的容量管理错误。
#[derive(Debug, Error)]
pub enum QueueError {
    /// 容量必须为正数。
    #[error("overflow queue capacity must be positive, got {requested}")]
    InvalidCapacity { requested: usize },

    /// 分配新环形缓冲失败；旧缓冲保持完整可用。
    ///
    /// - **契约 (What)**：`requested` 为申请的槽位数；返回该错误时队列内容、水位与代际均未改变。
    #[error("failed to allocate overflow queue with {requested} slots")]
    OutOfMemory { requested: usize },
}

/// 控制面上报传输相关错误。
///
/// # 教案式说明
/// - **意图 (Why)**：配置命令需要同步得知连接失败的原因，报文路径则只需统计；
///   统一枚举让两条路径共享同一份诊断信息。
/// - **契约 (What)**：`Connect`/`Send`/`Resolve` 保留原始 `io::Error`；`NotConfigured` 表示尚未执行传输配置命令。
#[derive(Debug, Error)]
pub enum NotifierError {
    /// 尚未配置上报传输。
    #[error("control-plane notifier transport is not configured")]
    NotConfigured,

    /// 对端地址既不是 IP 字面量也无法解析出任何地址。
    #[error("peer address `{peer}` does not resolve to any socket address")]
    InvalidAddress { peer: String },

    /// 主机名解析失败。
    #[error("failed to resolve peer address `{peer}`: {source}")]
    Resolve { peer: String, source: io::Error },

    /// 创建或连接数据报套接字失败。
    #[error("failed to connect notifier socket to {peer}: {source}")]
    Connect { peer: String, source: io::Error },

    /// 发送上报报文失败（包括非阻塞套接字的 `WouldBlock`）。
    #[error("failed to send session report: {source}")]
    Send { source: io::Error },

    /// 数据报被截断发送。
    #[error("session report truncated: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },
}

/// 配置解析与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法或字段类型错误。
    #[error("failed to parse buffer configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段取值违反约束。
    #[error("invalid buffer configuration field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    /// 读取配置文件失败。
    #[error("failed to read buffer configuration from `{path}`: {source}")]
    Read { path: String, source: io::Error },
}

/// 缓冲模块的顶层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：模块构造与命令分发会同时触达配置、队列与传输三个子域，
///   顶层枚举通过 `#[from]` 让内部实现直接使用 `?` 传播；
/// - **契约 (What)**：[`BufferError::code`] 返回形如 `buffer.queue.oom` 的稳定错误码，
///   命令响应中的 `Failure` 即由错误码与 `Display` 文本组成。
#[derive(Debug, Error)]
pub enum BufferError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
}

impl BufferError {
    /// 稳定错误码，供命令响应与告警维度使用。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::Config(ConfigError::Parse(_)) => "buffer.config.parse",
            BufferError::Config(ConfigError::Invalid { .. }) => "buffer.config.invalid",
            BufferError::Config(ConfigError::Read { .. }) => "buffer.config.read",
            BufferError::Queue(QueueError::InvalidCapacity { .. }) => "buffer.queue.capacity",
            BufferError::Queue(QueueError::OutOfMemory { .. }) => "buffer.queue.oom",
            BufferError::Notifier(NotifierError::NotConfigured) => "buffer.notifier.unconfigured",
            BufferError::Notifier(NotifierError::InvalidAddress { .. })
            | BufferError::Notifier(NotifierError::Resolve { .. }) => "buffer.notifier.address",
            BufferError::Notifier(NotifierError::Connect { .. }) => "buffer.notifier.connect",
            BufferError::Notifier(NotifierError::Send { .. })
            | BufferError::Notifier(NotifierError::ShortWrite { .. }) => "buffer.notifier.send",
        }
    }
}
