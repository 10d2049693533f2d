//! 控制器 48 位定点浮点格式
//!
//! 控制器的 L 类型内存字不是 IEEE-754：它由一个带符号尾数（高位）和
//! 一个偏置 12 位指数（低 12 位）拼接而成。本模块将宿主机的 `f64`
//! 按位精确地编码为该格式；解码由控制器固件完成，宿主侧不需要逆变换。

use std::fmt;

/// 尾数归一化上限（2^35）
///
/// 原始幅值左移到不低于该阈值后再右移一位，使尾数在不溢出字段的
/// 前提下取得最大精度。
const MAX_MANTISSA: f64 = 34359738368.0;

/// 负数尾数的取反基（2^44 − 1）
const MANTISSA_NEGATE: u64 = 0xFFF_FFFF_FFFF;

/// 指数偏置（提供 ±2048 的可用范围）
const EXPONENT_BIAS: i32 = 0x800;

/// 控制器浮点字
///
/// 一次性创建、不可变；`Display` 输出控制器的数值字面量形式
/// （`$` + 小写十六进制，无前导零）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmacFloat(u64);

impl PmacFloat {
    /// 全零字（编码退化值时返回）
    pub const ZERO: PmacFloat = PmacFloat(0);

    /// 将 `f64` 编码为控制器浮点字
    ///
    /// 算法与控制器固件的解码端逐位对应：
    ///
    /// 1. 退化检查 `value == value * 10`（零、无穷）返回全零字；
    /// 2. 幅值归一化到 [1, 2) 得到指数，偏置 0x800 后截取低 12 位；
    /// 3. 原始幅值按 2 的幂放大到 2^35 以上再除以 2，截断为整数尾数；
    /// 4. 负值的尾数替换为 `0xFFFFFFFFFFF − mantissa`（尾数字段内取反，
    ///    不是整字的补码）；
    /// 5. `word = mantissa << 12 | exponent`。
    pub fn encode(value: f64) -> Self {
        if value == value * 10.0 {
            return Self::ZERO;
        }

        let negative = value < 0.0;
        let magnitude = value.abs();

        // 归一化求指数
        let mut exp_value = magnitude;
        let mut exponent: i32 = 0;
        while exp_value >= 2.0 {
            exp_value /= 2.0;
            exponent += 1;
        }
        while exp_value < 1.0 {
            exp_value *= 2.0;
            exponent -= 1;
        }
        let exponent = ((exponent + EXPONENT_BIAS) & 0xFFF) as u64;

        // 原始幅值移位到最大尾数精度
        let mut mantissa_value = magnitude;
        while mantissa_value < MAX_MANTISSA {
            mantissa_value *= 2.0;
        }
        mantissa_value /= 2.0;

        let mut mantissa = mantissa_value as u64;
        if negative {
            mantissa = MANTISSA_NEGATE - mantissa;
        }

        Self((mantissa << 12) | exponent)
    }

    /// 原始 64 位字
    pub fn word(self) -> u64 {
        self.0
    }

    /// 尾数字段
    pub fn mantissa(self) -> u64 {
        self.0 >> 12
    }

    /// 指数字段（低 12 位）
    pub fn exponent(self) -> u16 {
        (self.0 & 0xFFF) as u16
    }
}

impl fmt::Display for PmacFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:x}", self.0)
    }
}
