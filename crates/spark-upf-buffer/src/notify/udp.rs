//! 基于已连接数据报套接字的上报传输。
//!
//! # 模块定位（Why）
//! - 上报在分类线程上同步触发，不能依赖异步运行时，也不能阻塞报文路径；
//!   因此直接使用 `socket2` 创建非阻塞 UDP 套接字并在配置阶段 `connect` 到控制面对端。
//!
//! # 契约（What）
//! - [`UdpNotifier::connect`]：解析对端（IP 字面量或主机名），创建并连接套接字；失败同步返回给配置命令；
//! - `send`：一次 `send` 系统调用，`WouldBlock` 等错误原样包装为 [`NotifierError::Send`]。

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::{ControlPlaneNotifier, SessionReport};
use crate::error::NotifierError;

/// PFCP 默认端口。
pub const DEFAULT_PFCP_PORT: u16 = 8805;

/// 已连接的 UDP 上报传输。
#[derive(Debug)]
pub struct UdpNotifier {
    socket: Socket,
    peer: SocketAddr,
}

impl UdpNotifier {
    /// 连接到控制面对端。
    ///
    /// # 错误处理
    /// - 地址无法解析 → [`NotifierError::Resolve`] / [`NotifierError::InvalidAddress`]；
    /// - 创建、设置非阻塞或连接失败 → [`NotifierError::Connect`]，附带对端地址字符串。
    pub fn connect(peer_address: &str, port: u16) -> Result<Self, NotifierError> {
        let peer = resolve_peer(peer_address, port)?;
        let connect_err = |source: io::Error| NotifierError::Connect {
            peer: peer.to_string(),
            source,
        };

        let socket = Socket::new(Domain::for_address(peer), Type::DGRAM, Some(Protocol::UDP))
            .map_err(connect_err)?;
        socket.set_nonblocking(true).map_err(connect_err)?;
        socket
            .connect(&SockAddr::from(peer))
            .map_err(connect_err)?;
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "notifier socket is not an inet socket")
        })
    }

    /// 发送原始字节，供调试或历史常量报文使用。
    pub fn send_bytes(&self, payload: &[u8]) -> Result<(), NotifierError> {
        let sent = self
            .socket
            .send(payload)
            .map_err(|source| NotifierError::Send { source })?;
        if sent != payload.len() {
            return Err(NotifierError::ShortWrite {
                sent,
                expected: payload.len(),
            });
        }
        Ok(())
    }
}

impl ControlPlaneNotifier for UdpNotifier {
    fn send(&self, report: &SessionReport) -> Result<(), NotifierError> {
        self.send_bytes(&report.encode())
    }
}

/// 解析对端地址：优先按 IP 字面量处理，否则走系统解析并取第一个结果。
fn resolve_peer(peer_address: &str, port: u16) -> Result<SocketAddr, NotifierError> {
    if let Ok(ip) = peer_address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let mut candidates =
        (peer_address, port)
            .to_socket_addrs()
            .map_err(|source| NotifierError::Resolve {
                peer: peer_address.to_owned(),
                source,
            })?;
    candidates
        .next()
        .ok_or_else(|| NotifierError::InvalidAddress {
            peer: peer_address.to_owned(),
        })
}
