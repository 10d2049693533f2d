//! 在线命令文本构建
//!
//! 控制器的命令协议是行导向 ASCII：变量读写、内存读写、电机指派、
//! 程序启动都是一条短文本。单条命令长度受传输层上限约束，整缓冲区
//! 的点数据必须按字符预算分块下发。

use crate::{AxisKey, ProtocolError};
use std::fmt::Write as _;

/// 单条命令的字符上限
pub const MAX_COMMAND_LEN: usize = 255;

/// 在线全局中止命令
pub const ABORT_COMMAND: &str = "A";

/// 电机到坐标系轴的一条指派
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorAssignment {
    /// 电机号（1..=15）
    pub motor: u8,
    /// 目标轴
    pub axis: AxisKey,
    /// EGU 换算系数（counts / engineering unit）
    pub scaling: f64,
}

impl MotorAssignment {
    pub fn new(motor: u8, axis: AxisKey, scaling: f64) -> Self {
        Self {
            motor,
            axis,
            scaling,
        }
    }
}

/// 变量写入命令：`NAME=VALUE`
pub fn variable_write(variable: &str, value: &str) -> String {
    format!("{variable}={value}")
}

/// 内存读取命令：`R<mode> $<addr>`
pub fn address_read(mode: char, address: u32) -> String {
    format!("R{mode} ${address:x}")
}

/// 内存写入命令（单值）：`W<mode> $<addr> <value>`
pub fn address_write(mode: char, address: u32, value: &str) -> String {
    format!("W{mode} ${address:x} {value}")
}

/// 分块内存写入命令：`W<mode>$<addr>,<v1>,<v2>,...`
///
/// 从 `values` 头部贪心取值，保证命令不超过 [`MAX_COMMAND_LEN`]；
/// 返回命令文本和本块消费的值个数。调用方循环调用并把地址前移
/// 消费个数，直到值列表耗尽。
///
/// 单个值连同前缀都放不进预算时拒绝（否则调用方会死循环）。
pub fn write_command(
    mode: char,
    address: u32,
    values: &[String],
) -> Result<(String, usize), ProtocolError> {
    let mut command = format!("W{mode}${address:x}");

    let mut sent = 0;
    for value in values {
        if command.len() + 1 + value.len() > MAX_COMMAND_LEN {
            break;
        }
        // 预算校验过，写 String 不会失败
        let _ = write!(command, ",{value}");
        sent += 1;
    }

    if sent == 0 && !values.is_empty() {
        return Err(ProtocolError::ValueTooLong {
            len: values[0].len(),
            max: MAX_COMMAND_LEN - command.len() - 1,
        });
    }

    Ok((command, sent))
}

/// 电机指派命令：`&<cs> #<m>-><scaling><AXIS> ...`
///
/// 电机号与轴字母在发出任何 I/O 之前校验。
pub fn assign_motors_command(
    cs: u8,
    assignments: &[MotorAssignment],
) -> Result<String, ProtocolError> {
    let mut command = format!("&{cs}");
    for assignment in assignments {
        if !(1..=15).contains(&assignment.motor) {
            return Err(ProtocolError::InvalidMotor {
                motor: assignment.motor,
            });
        }
        let letter = assignment.axis.letter().ok_or(ProtocolError::InvalidAxis)?;
        let _ = write!(
            command,
            " #{}->{}{}",
            assignment.motor, assignment.scaling, letter
        );
    }
    Ok(command)
}

/// 归零命令：`#<m>HMZ` 级联
pub fn home_command(motors: impl IntoIterator<Item = u8>) -> String {
    let mut command = String::new();
    for motor in motors {
        let _ = write!(command, "#{motor}HMZ");
    }
    command
}

/// 程序启动命令：点动释放每个电机，再启动坐标系内的程序
///
/// `#<m>J/ ...&<cs>B<prog>R`
pub fn run_program_command(motors: impl IntoIterator<Item = u8>, cs: u8, program: u16) -> String {
    let mut command = String::new();
    for motor in motors {
        let _ = write!(command, "#{motor}J/");
    }
    let _ = write!(command, "&{cs}B{program}R");
    command
}

/// 电机当前位置查询：`#<m>P`
pub fn motor_position_command(motor: u8) -> String {
    format!("#{motor}P")
}

/// 电机当前速度查询：`#<m>V`
pub fn motor_velocity_command(motor: u8) -> String {
    format!("#{motor}V")
}
