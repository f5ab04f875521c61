//! # 缓冲模块配置
//!
//! ## 角色定位（Why）
//! - 队列容量、水位比例、突发大小等参数在部署间差异较大，统一由 TOML 描述，缺省值与历史行为一致；
//! - 上报对端可以在配置中预置，也可以在运行期通过 `ConfigureNotifierTransport` 命令下发。
//!
//! ## 契约（What）
//! - 所有字段带缺省值，空文档即为缺省配置；
//! - [`BufferConfig::validate`] 在模块构造前调用，拒绝零容量、零突发、越界比例以及 `low >= high`。
//!
//! ```toml
//! queue_capacity = 1024
//! high_watermark_ratio = 0.90
//! low_watermark_ratio = 0.15
//! burst_size = 32
//! session_buffer_limit = 2048
//! report_pdr_id = 2
//!
//! [notifier]
//! peer_address = "10.0.0.1"
//! port = 8805
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::notify::udp::DEFAULT_PFCP_PORT;
use crate::queue::Watermarks;

/// 缓冲模块配置。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// 旁路队列容量（报文个数）。
    pub queue_capacity: usize,
    pub high_watermark_ratio: f64,
    pub low_watermark_ratio: f64,
    /// 每次调度周期最多出队的旁路报文数。
    pub burst_size: usize,
    /// 单会话缓冲上限，超出后尾部丢弃。
    pub session_buffer_limit: usize,
    /// 上报中 PDR ID IE 的取值。
    pub report_pdr_id: u16,
    pub notifier: Option<NotifierConfig>,
}

/// 控制面上报对端。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    pub peer_address: String,
    #[serde(default = "default_pfcp_port")]
    pub port: u16,
}

fn default_pfcp_port() -> u16 {
    DEFAULT_PFCP_PORT
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            high_watermark_ratio: Watermarks::DEFAULT_HIGH_RATIO,
            low_watermark_ratio: Watermarks::DEFAULT_LOW_RATIO,
            burst_size: 32,
            session_buffer_limit: 2048,
            report_pdr_id: 2,
            notifier: None,
        }
    }
}

impl BufferConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 校验字段约束。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：比例须落在 `(0, 1]`，且 `low < high`；容量、突发、单会话上限须为正；
    /// - **风险 (Trade-offs)**：比例合法但容量很小时，向下取整后的水位可能相等（例如容量 1），
    ///   此时滞回区间退化，信号仍保持正确但会更频繁地翻转。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than zero"));
        }
        if self.burst_size == 0 {
            return Err(invalid("burst_size", "must be greater than zero"));
        }
        if self.session_buffer_limit == 0 {
            return Err(invalid("session_buffer_limit", "must be greater than zero"));
        }
        check_ratio("high_watermark_ratio", self.high_watermark_ratio)?;
        check_ratio("low_watermark_ratio", self.low_watermark_ratio)?;
        if self.low_watermark_ratio >= self.high_watermark_ratio {
            return Err(invalid(
                "low_watermark_ratio",
                format!(
                    "must be below high_watermark_ratio ({} >= {})",
                    self.low_watermark_ratio, self.high_watermark_ratio
                ),
            ));
        }
        if let Some(notifier) = &self.notifier {
            if notifier.peer_address.trim().is_empty() {
                return Err(invalid("notifier.peer_address", "must not be empty"));
            }
        }
        Ok(())
    }

    /// 按当前容量与比例计算水位。
    pub fn watermarks(&self) -> Watermarks {
        Watermarks::for_capacity(
            self.queue_capacity,
            self.high_watermark_ratio,
            self.low_watermark_ratio,
        )
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must lie in (0, 1), got {value}")))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
