//! 控制面命令与响应。
//!
//! ## 契约（What）
//! - [`Command`] 以 `command` 字段作为标签反序列化，同时接受早期命令名（`add`、`release`、`add_socket`）
//!   与字段名（`farid`、`pfcpagentaddr`）作为别名；
//! - [`CommandResponse::Failure`] 携带稳定错误码与可读原因，只有传输配置与队列扩缩容会失败。

use serde::{Deserialize, Serialize};

use crate::error::BufferError;
use crate::notify::udp::DEFAULT_PFCP_PORT;
use crate::packet::SessionId;

/// 控制面下发的命令。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// 开始（或重新开始）缓冲会话，恢复一次性上报。
    #[serde(alias = "add")]
    AddSession {
        #[serde(alias = "farid")]
        session_id: SessionId,
    },
    /// 放行会话缓冲；未知会话视为成功。
    #[serde(alias = "release")]
    ReleaseSession {
        #[serde(alias = "farid")]
        session_id: SessionId,
    },
    /// 配置控制面上报对端。
    #[serde(alias = "add_socket")]
    ConfigureNotifierTransport {
        #[serde(alias = "pfcpagentaddr")]
        peer_address: String,
        #[serde(default = "default_port")]
        port: u16,
    },
    /// 移除会话记录并释放其仍在缓冲中的报文。
    RemoveSession {
        #[serde(alias = "farid")]
        session_id: SessionId,
    },
    /// 调整旁路队列容量。
    ResizeQueue { capacity: usize },
}

fn default_port() -> u16 {
    DEFAULT_PFCP_PORT
}

/// 命令执行结果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    Success,
    Failure { code: &'static str, reason: String },
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResponse::Success)
    }
}

impl From<Result<(), BufferError>> for CommandResponse {
    fn from(result: Result<(), BufferError>) -> Self {
        match result {
            Ok(()) => CommandResponse::Success,
            Err(err) => CommandResponse::Failure {
                code: err.code(),
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifierError;

    #[derive(Deserialize)]
    struct Script {
        commands: Vec<Command>,
    }

    #[test]
    fn legacy_command_names_are_accepted() {
        let script: Script = toml::from_str(
            r#"
            [[commands]]
            command = "add"
            farid = 7

            [[commands]]
            command = "release_session"
            session_id = 7

            [[commands]]
            command = "add_socket"
            pfcpagentaddr = "127.0.0.1"
            "#,
        )
        .unwrap();
        assert_eq!(
            script.commands,
            vec![
                Command::AddSession {
                    session_id: SessionId::new(7)
                },
                Command::ReleaseSession {
                    session_id: SessionId::new(7)
                },
                Command::ConfigureNotifierTransport {
                    peer_address: "127.0.0.1".to_owned(),
                    port: 8805,
                },
            ]
        );
    }

    #[test]
    fn failure_carries_code_and_reason() {
        let response = CommandResponse::from(Err(BufferError::from(NotifierError::InvalidAddress {
            peer: "nowhere".to_owned(),
        })));
        match response {
            CommandResponse::Failure { code, reason } => {
                assert_eq!(code, "buffer.notifier.address");
                assert!(reason.contains("nowhere"));
            }
            CommandResponse::Success => panic!("应返回失败"),
        }
    }
}
