//! PFCP Session Report Request（下行数据上报）报文构造。
//!
//! ## 报文布局（What）
//! ```text
//! 0      1      2..4        4..12   12..15     15
//! 0x21   0x38   len=0x001b  SEID    sequence   spare
//! IE Report Type (39) len=1 value=DLDR(0x01)
//! IE Downlink Data Report (83) len=6
//!     IE PDR ID (56) len=2 value=pdr_id
//! ```
//! - 固定 31 字节；`len` 为首 4 字节之后的长度（27）。
//! - [`SessionReport::legacy`] 生成 SEID 为 1、序号为 1、PDR ID 为 2 的历史常量报文；
//!   正常路径由 [`SessionReport::downlink_data`] 填入会话标识与递增序号，线上字节随之变化。

use crate::packet::SessionId;

/// 上报报文长度。
pub const REPORT_LEN: usize = 31;

const PFCP_VERSION_WITH_SEID: u8 = 0x21;
const MSG_SESSION_REPORT_REQUEST: u8 = 0x38;
const IE_REPORT_TYPE: u16 = 39;
const IE_DOWNLINK_DATA_REPORT: u16 = 83;
const IE_PDR_ID: u16 = 56;
const REPORT_TYPE_DLDR: u8 = 0x01;
const SEQUENCE_MASK: u32 = 0x00ff_ffff;

/// 下行数据上报的动态字段。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionReport {
    pub seid: u64,
    /// 24 位序号，高 8 位在编码时被截断。
    pub sequence: u32,
    pub pdr_id: u16,
}

impl SessionReport {
    /// 会话标识写入 SEID 低 32 位。
    pub fn downlink_data(session: SessionId, sequence: u32, pdr_id: u16) -> Self {
        Self {
            seid: u64::from(session.get()),
            sequence: sequence & SEQUENCE_MASK,
            pdr_id,
        }
    }

    /// 与早期实现逐字节一致的常量报文。
    pub fn legacy() -> Self {
        Self {
            seid: 1,
            sequence: 1,
            pdr_id: 2,
        }
    }

    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = PFCP_VERSION_WITH_SEID;
        buf[1] = MSG_SESSION_REPORT_REQUEST;
        buf[2..4].copy_from_slice(&((REPORT_LEN - 4) as u16).to_be_bytes());
        buf[4..12].copy_from_slice(&self.seid.to_be_bytes());
        buf[12..15].copy_from_slice(&(self.sequence & SEQUENCE_MASK).to_be_bytes()[1..]);
        // buf[15]: spare

        buf[16..18].copy_from_slice(&IE_REPORT_TYPE.to_be_bytes());
        buf[18..20].copy_from_slice(&1u16.to_be_bytes());
        buf[20] = REPORT_TYPE_DLDR;

        buf[21..23].copy_from_slice(&IE_DOWNLINK_DATA_REPORT.to_be_bytes());
        buf[23..25].copy_from_slice(&6u16.to_be_bytes());
        buf[25..27].copy_from_slice(&IE_PDR_ID.to_be_bytes());
        buf[27..29].copy_from_slice(&2u16.to_be_bytes());
        buf[29..31].copy_from_slice(&self.pdr_id.to_be_bytes());
        buf
    }
}
