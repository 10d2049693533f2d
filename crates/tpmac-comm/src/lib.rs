//! # TPMAC Comm
//!
//! 控制器命令/响应传输层。
//!
//! 两种载体实现同一个 [`Carrier`] 契约：
//!
//! - [`EthernetCarrier`]：原始流式套接字，自定义 8 字节请求头 +
//!   单字节终结符协议；
//! - [`TerminalCarrier`]：终端服务器行会话，按响应形态正则匹配。
//!
//! [`CommandChannel`] 在载体之上提供互斥访问、慢命令的双倍超时
//! 以及不可交错的批量发送。上层对载体种类不可见。

pub mod ethernet;
pub mod terminal;

pub use ethernet::EthernetCarrier;
pub use terminal::TerminalCarrier;

use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// 响应成功终结符
pub const TERM_ACK: u8 = 0x06;
/// 响应错误/超时终结符
pub const TERM_ERR: u8 = 0x0D;
/// 忙/连接丢失终结符
pub const TERM_NULL: u8 = 0x00;

/// 传输层统一错误类型
///
/// 所有变体对当前交换都是致命的；传输层不做自动重试。
/// [`CommError::NullResponse`] 仅在 [`CommandChannel::send_slow`]
/// 路径上被视为良性。
#[derive(Error, Debug)]
pub enum CommError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// 控制器以错误终结符（0x0D）结束响应
    #[error("Controller communication error")]
    Controller,

    /// 控制器以空终结符（0x00）结束响应：忙或连接丢失
    #[error("Controller did not respond: busy or connection lost")]
    NullResponse,

    /// 响应未以任何已知终结符结束
    #[error("Malformed response")]
    Malformed,

    /// 短响应终结符前缺少回车：内容被截断
    #[error("Truncated short response")]
    Truncated,

    /// 超时前没有响应形态匹配
    #[error("Timed out waiting for expected response. Got only: {received:?}")]
    Timeout { received: String },
}

/// 命令/响应载体
///
/// 一次 [`exchange`](Carrier::exchange) 是一个完整的阻塞命令/响应
/// 周期：发送命令、读取（可能多片的）响应、按终结符分类。成功时
/// 返回去掉末尾成功终结符的响应文本，内部 `\r` 行分隔保留。
pub trait Carrier: Send {
    fn exchange(&mut self, command: &str, timeout: Duration) -> Result<String, CommError>;

    /// 对端描述，用于日志
    fn peer(&self) -> &str;
}

/// 载体之上的独占命令通道
///
/// 同一连接同时最多一个在途交换，由内部互斥锁保证。
pub struct CommandChannel<C: Carrier> {
    carrier: Mutex<C>,
    timeout: Duration,
}

impl<C: Carrier> CommandChannel<C> {
    pub fn new(carrier: C, timeout: Duration) -> Self {
        Self {
            carrier: Mutex::new(carrier),
            timeout,
        }
    }

    /// 常规命令交换
    ///
    /// 空终结符按连接丢失处理并向上传播，避免掩盖真实断连。
    pub fn send(&self, command: &str) -> Result<String, CommError> {
        let mut carrier = self.carrier.lock();
        debug!(command, "sending command");
        let response = carrier.exchange(command, self.timeout)?;
        trace!(len = response.len(), "response complete");
        Ok(response)
    }

    /// 慢命令交换（如持久化保存）
    ///
    /// 仅本次交换使用双倍超时；空终结符视为良性忙信号，
    /// 返回空响应。该容忍不会泄漏到后续命令。
    pub fn send_slow(&self, command: &str) -> Result<String, CommError> {
        let mut carrier = self.carrier.lock();
        debug!(command, "sending slow command (doubled timeout)");
        match carrier.exchange(command, self.timeout * 2) {
            Err(CommError::NullResponse) => {
                warn!(command, "controller returned a null byte; treating as busy on a slow command");
                Ok(String::new())
            }
            other => other,
        }
    }

    /// 获取整个命令序列期间的独占访问
    ///
    /// 锁在返回的批次存活期间一直持有，序列中的命令不会与其他
    /// 调用方交错；提前丢弃批次即释放。
    pub fn batch(&self) -> ChannelBatch<'_, C> {
        ChannelBatch {
            carrier: self.carrier.lock(),
            timeout: self.timeout,
        }
    }

    /// 常规响应超时
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// 持锁的命令批次
pub struct ChannelBatch<'a, C: Carrier> {
    carrier: MutexGuard<'a, C>,
    timeout: Duration,
}

impl<C: Carrier> ChannelBatch<'_, C> {
    pub fn send(&mut self, command: &str) -> Result<String, CommError> {
        debug!(command, "sending command (batched)");
        self.carrier.exchange(command, self.timeout)
    }
}
