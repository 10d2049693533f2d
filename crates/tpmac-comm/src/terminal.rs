//! 终端会话载体
//!
//! 经终端服务器的行会话与控制器通讯。没有封包头可用，响应的完成
//! 只能按形态判定：错误码、十六进制/十进制单值、四行状态块，或
//! 裸终结符。发送前先排掉上一次超时交换遗留的陈旧字节，避免把
//! 旧响应安到新命令头上。

use crate::{Carrier, CommError};
use regex::bytes::Regex;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 响应形态，按匹配优先级排列
///
/// 形态 0：报警铃 + 错误码；1：`$` 前缀十六进制单值；2：带符号
/// 十进制单值；3：`#x?PVF` 的状态/位置/速度/跟随误差四行块；
/// 4：其余一切有终结符的响应（含无返回值命令）。
static RESPONSE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\x07ERR\d{3}\r",
        r"^\$[A-Z0-9]+\r\x06",
        r"^-?(\d*\.)?\d+\s*\r\x06",
        r"^[A-Z0-9]+\r-?(\d*\.)?\d+\r-?(\d*\.)?\d+\r-?(\d*\.)?\d+\r\x06",
        r"\x06",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// 终端会话载体
pub struct TerminalCarrier {
    stream: TcpStream,
    peer: String,
}

impl TerminalCarrier {
    /// 连接终端服务器并确认串口后面是控制器
    ///
    /// 基本的 `ver` 交换失败通常意味着端口被占用、接错端口或
    /// 波特率配置错误。
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, CommError> {
        let peer = format!("{host}:{port}");
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: "unknown host or addressing problem".into(),
            })?
            .next()
            .ok_or_else(|| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: "unknown host or addressing problem".into(),
            })?;

        let stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|e| CommError::ConnectFailed {
                addr: peer.clone(),
                reason: e.to_string(),
            })?;
        stream.set_write_timeout(Some(timeout))?;

        let mut carrier = Self { stream, peer };

        carrier.exchange("ver", timeout).map_err(|e| CommError::ConnectFailed {
            addr: carrier.peer.clone(),
            reason: format!("did not get expected response from \"ver\": {e}"),
        })?;
        info!(peer = %carrier.peer, "terminal session established");

        Ok(carrier)
    }

    #[cfg(test)]
    pub(crate) fn from_stream(stream: TcpStream, peer: String) -> Self {
        Self { stream, peer }
    }

    /// 排空上一次交换遗留的未读字节
    ///
    /// 上一条命令超时后其响应可能晚到；不清掉会被当成下一条命令
    /// 的响应。
    fn drain_stale(&mut self) -> Result<(), CommError> {
        self.stream.set_nonblocking(true)?;

        let mut discarded = 0usize;
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.stream.set_nonblocking(false)?;
                    return Err(e.into());
                }
            }
        }

        self.stream.set_nonblocking(false)?;
        if discarded > 0 {
            warn!(bytes = discarded, "discarding unexpected stale output from controller");
        }
        Ok(())
    }
}

impl Carrier for TerminalCarrier {
    fn exchange(&mut self, command: &str, timeout: Duration) -> Result<String, CommError> {
        self.drain_stale()?;

        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        debug!(command, "sent");

        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(CommError::Timeout {
                    received: String::from_utf8_lossy(&received).into_owned(),
                });
            };
            // 零超时会被解释为阻塞读，压到最小正值
            self.stream
                .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            match self.stream.read(&mut buf) {
                Ok(0) => return Err(CommError::NullResponse),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(CommError::Timeout {
                        received: String::from_utf8_lossy(&received).into_owned(),
                    });
                }
                Err(e) => return Err(e.into()),
            }

            for (class, pattern) in RESPONSE_PATTERNS.iter().enumerate() {
                if let Some(found) = pattern.find(&received) {
                    trace!(class, len = found.end(), "response matched");
                    let mut text =
                        String::from_utf8_lossy(&received[..found.end()]).into_owned();
                    if text.ends_with('\x06') {
                        text.pop();
                    }
                    return Ok(text);
                }
            }
        }
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
