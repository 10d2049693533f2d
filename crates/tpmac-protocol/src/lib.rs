//! # TPMAC Protocol
//!
//! Turbo PMAC 轨迹扫描协议定义（无 I/O 依赖）
//!
//! ## 模块
//!
//! - `float`: 控制器 48 位定点浮点格式编码
//! - `timeword`: 时间字编码（移动时间 + 速度模式 + 子程序触发）
//! - `layout`: 双缓冲区各轴子缓冲地址分配
//! - `command`: 在线命令文本构建（含 255 字符分块写入）
//! - `vars`: 运动程序控制变量名常量
//!
//! ## 数制
//!
//! 控制器内存地址与编码值均以十六进制文本传输，小写、无前导零；
//! 数值字面量以 `$` 前缀标记。

pub mod command;
pub mod float;
pub mod layout;
pub mod timeword;
pub mod vars;

// 重新导出常用类型
pub use command::*;
pub use float::PmacFloat;
pub use layout::{AxisKey, BufferLayout};
pub use timeword::{TimePoint, TimeWord, VelocityMode};

use thiserror::Error;

/// 协议层错误类型
///
/// 所有变体都在任何传输 I/O 之前触发。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Motor selection invalid: {motor} (expected 1..=15)")]
    InvalidMotor { motor: u8 },

    #[error("Axis selection invalid: the time slot cannot be assigned to a motor")]
    InvalidAxis,

    #[error("Move time {ticks} does not fit the 24-bit time field")]
    MoveTimeTooLong { ticks: u32 },

    #[error("Subroutine must be in range 10..=15, got {subroutine}")]
    InvalidSubroutine { subroutine: u8 },

    #[error("Encoded value of {len} characters cannot fit a {max}-character write command")]
    ValueTooLong { len: usize, max: usize },
}
