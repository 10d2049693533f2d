//! # TPMAC Client
//!
//! 控制器领域客户端：在 [`tpmac_comm`] 的命令通道之上组合出变量
//! 读写、内存读写、电机指派、程序启停和双缓冲填充等领域操作。
//!
//! 一个 [`ControllerClient`] 在其生命周期内独占一条连接；
//! 用 [`ControllerBuilder`] 以显式的主机/端口/超时配置构建。

mod client;
mod cs;
mod points;

// 测试模块
#[cfg(test)]
mod test_support;

pub use client::{ControllerBuilder, ControllerClient, StatusSnapshot};
pub use cs::CoordinateSystem;
pub use points::{PointSet, Trajectory};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use tpmac_comm::CommError;
use tpmac_protocol::{AxisKey, ProtocolError};

/// 运动程序状态码（`P4001`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ScanStatus {
    /// 程序已加载未运行
    Initialised = 0,
    /// 扫描进行中
    Active = 1,
    /// 扫描结束（正常完成或中止后）
    Idle = 2,
    /// 程序报故障
    Error = 3,
}

/// 半缓冲区标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum BufferId {
    A = 0,
    B = 1,
}

impl BufferId {
    /// 另一个半缓冲区
    pub fn other(self) -> Self {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }
}

/// 客户端错误类型
///
/// 校验类变体都在任何传输 I/O 之前触发；
/// 控制器上报的程序故障不是错误，见 `P4015` 状态读取。
#[derive(Error, Debug)]
pub enum ClientError {
    /// 传输层错误
    #[error("Comm error: {0}")]
    Comm(#[from] CommError),

    /// 协议层校验错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Read failed ({command:?}): {source}")]
    ReadFailed { command: String, source: CommError },

    #[error("Write failed ({command:?}): {source}")]
    WriteFailed { command: String, source: CommError },

    /// 响应到手但无法按预期解析
    #[error("Malformed reply to {command:?}: {reply:?}")]
    MalformedReply { command: String, reply: String },

    #[error("Unknown status code {code}")]
    UnknownStatus { code: i64 },

    #[error("Point set cannot be longer than the controller buffer length ({buffer_length}), got {len}")]
    PointSetTooLong { len: usize, buffer_length: usize },

    #[error("Point set must have equal points in all axes")]
    UnevenPointSet,

    #[error("Points would exceed the maximum velocity of motor {motor} on axis {axis:?}")]
    VelocityExceeded { motor: u8, axis: AxisKey },

    #[error("No motors assigned in coordinate system {cs}")]
    UnknownCoordinateSystem { cs: u8 },
}
