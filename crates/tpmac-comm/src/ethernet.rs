//! 以太网载体
//!
//! 控制器以太网口的请求/响应封包：每条命令前置 8 字节请求头，
//! 响应以单字节终结符分类结束。长响应按传输包上限分片，宿主机
//! 用固定的续传请求逐片拉取。

use crate::{Carrier, CommError, TERM_ACK, TERM_ERR, TERM_NULL};
use regex::Regex;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 单个传输包的响应上限；等于该长度说明还有后续分片
const MAX_PACKET: usize = 1400;

/// 单次读取缓冲
const READ_BUF: usize = 2048;

/// 请求头魔数（get-response）
const GETRESPONSE_MAGIC: [u8; 2] = [0x40, 0xBF];

/// 续传请求封包（get-buffer，载荷长度 2048）
const GETBUFFER_REQUEST: [u8; 8] = [0xC0, 0xC5, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00];

/// 分片响应末尾缺少回车时附加的警告标记
const TRUNCATION_WARNING: &str = " WARNING: response truncated.";

/// 连接校验：固件版本响应形如 `1.945  \r`
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\s*\r$").unwrap()
});

/// 以太网口载体
pub struct EthernetCarrier {
    stream: TcpStream,
    peer: String,
}

impl EthernetCarrier {
    /// 连接控制器并校验设备身份
    ///
    /// 建链后发送 `i6=1 i3=2 ver`（设置应答模式并查询固件版本）；
    /// 响应不是版本号说明对端不是控制器，立即断开并报连接失败。
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, CommError> {
        let peer = format!("{host}:{port}");
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: "unknown host".into(),
            })?
            .next()
            .ok_or_else(|| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: "unknown host".into(),
            })?;

        let stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|e| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: e.to_string(),
            })?;
        stream.set_write_timeout(Some(timeout))?;

        let mut carrier = Self { stream, peer };

        let response = carrier.exchange("i6=1 i3=2 ver", timeout).map_err(|e| {
            CommError::ConnectFailed {
                addr: carrier.peer.clone(),
                reason: format!("device failed to respond to a \"ver\" command: {e}"),
            }
        })?;
        if !VERSION_RE.is_match(&response) {
            return Err(CommError::ConnectFailed {
                addr: carrier.peer.clone(),
                reason: format!("device did not respond correctly to a \"ver\" command: {response:?}"),
            });
        }
        info!(peer = %carrier.peer, firmware = response.trim_end_matches(['\r', ' ']), "connected");

        Ok(carrier)
    }

    #[cfg(test)]
    pub(crate) fn from_stream(stream: TcpStream, peer: String) -> Self {
        Self { stream, peer }
    }

    /// 读取一个响应分片（至多一个传输包）
    fn read_packet(&mut self) -> Result<Vec<u8>, CommError> {
        let mut buf = [0u8; READ_BUF];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            // 对端关闭连接
            return Err(CommError::NullResponse);
        }
        trace!(len = n, "received packet");
        Ok(buf[..n].to_vec())
    }
}

/// 构建 get-response 请求封包：8 字节头 + 原始命令字节
fn getresponse_request(command: &str) -> Result<Vec<u8>, CommError> {
    if command.len() > u8::MAX as usize {
        return Err(CommError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "command exceeds single-packet length",
        )));
    }

    let mut request = Vec::with_capacity(8 + command.len());
    request.extend_from_slice(&GETRESPONSE_MAGIC);
    request.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, command.len() as u8]);
    request.extend_from_slice(command.as_bytes());
    Ok(request)
}

impl Carrier for EthernetCarrier {
    fn exchange(&mut self, command: &str, timeout: Duration) -> Result<String, CommError> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.write_all(&getresponse_request(command)?)?;
        debug!(command, "sent");

        let mut reply = self.read_packet()?;

        // 短响应：终结符已经到手，直接分类
        if reply.len() < MAX_PACKET {
            match reply.last() {
                Some(&TERM_ACK) => {}
                Some(&TERM_ERR) => return Err(CommError::Controller),
                Some(&TERM_NULL) => return Err(CommError::NullResponse),
                _ => return Err(CommError::Malformed),
            }
            if reply.len() > 1 && reply[reply.len() - 2] != b'\r' {
                return Err(CommError::Truncated);
            }
            reply.pop();
            return Ok(String::from_utf8_lossy(&reply).into_owned());
        }

        // 满包：响应还没结束，续传拉取直到观察到终结符
        while !matches!(reply.last(), Some(&TERM_ACK) | Some(&TERM_ERR)) {
            self.stream.write_all(&GETBUFFER_REQUEST)?;
            let fragment = self.read_packet()?;
            if fragment.len() < MAX_PACKET && fragment.last() == Some(&TERM_NULL) {
                return Err(CommError::NullResponse);
            }
            reply.extend_from_slice(&fragment);
        }

        if reply.last() == Some(&TERM_ERR) {
            return Err(CommError::Controller);
        }

        let truncated = reply.len() > 1 && reply[reply.len() - 2] != b'\r';
        reply.pop();
        let mut text = String::from_utf8_lossy(&reply).into_owned();
        if truncated {
            // 分片响应的截断不丢弃内容，打标记交给调用方
            warn!(command, "multi-packet response truncated");
            text.push_str(TRUNCATION_WARNING);
        }
        Ok(text)
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
