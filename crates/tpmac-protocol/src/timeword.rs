//! 时间字编码
//!
//! 轨迹缓冲的 time 子缓冲每点存一个 32 位时间字，固件按位段拆解：
//!
//! ```text
//! bit 0..24   移动时间（1/4 毫秒计数，Y 字 24 位）
//! bit 24..28  子程序触发（0 = 无，10..=15 有效）
//! bit 28..32  速度模式
//! ```

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 时间字段上限（24 位）
const MAX_TICKS: u32 = 1 << 24;

/// 速度模式
///
/// 决定固件如何为该点计算进给速度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum VelocityMode {
    /// 前后两段移动的平均速度（默认）
    Average = 0,
    /// 仅按上一段移动计算（一段行程的末点）
    PreviousMove = 1,
    /// 仅按下一段移动计算（一段行程的起点）
    NextMove = 2,
}

impl Default for VelocityMode {
    fn default() -> Self {
        VelocityMode::Average
    }
}

/// 单点调度元数据（编码前）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePoint {
    /// 移动时间，1/4 毫秒计数
    pub ticks: u32,
    /// 速度模式
    pub vel_mode: VelocityMode,
    /// 子程序触发，0 表示无
    pub subroutine: u8,
}

impl TimePoint {
    /// 以默认速度模式、无子程序触发创建
    pub fn new(ticks: u32) -> Self {
        Self {
            ticks,
            vel_mode: VelocityMode::Average,
            subroutine: 0,
        }
    }

    /// 设置速度模式
    pub fn with_vel_mode(mut self, vel_mode: VelocityMode) -> Self {
        self.vel_mode = vel_mode;
        self
    }

    /// 设置子程序触发（10..=15）
    pub fn with_subroutine(mut self, subroutine: u8) -> Self {
        self.subroutine = subroutine;
        self
    }

    /// 编码为时间字
    ///
    /// 时间超出 24 位或子程序号非法时在任何 I/O 之前拒绝。
    /// 时间为零是合法编码：固件将其作为运行期故障上报。
    pub fn encode(self) -> Result<TimeWord, ProtocolError> {
        if self.ticks >= MAX_TICKS {
            return Err(ProtocolError::MoveTimeTooLong { ticks: self.ticks });
        }
        if self.subroutine != 0 && !(10..=15).contains(&self.subroutine) {
            return Err(ProtocolError::InvalidSubroutine {
                subroutine: self.subroutine,
            });
        }

        let word = self.ticks
            | u32::from(self.subroutine) << 24
            | u32::from(u8::from(self.vel_mode)) << 28;
        Ok(TimeWord(word))
    }
}

/// 编码后的时间字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWord(u32);

impl TimeWord {
    /// 原始 32 位字
    pub fn word(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimeWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_move_time() {
        let word = TimePoint::new(4000).encode().unwrap();
        assert_eq!(word.word(), 4000);
        assert_eq!(word.to_string(), "$fa0");
    }

    /// 速度模式占 bit 28..32
    #[test]
    fn test_vel_mode_nibble() {
        let word = TimePoint::new(0x1003)
            .with_vel_mode(VelocityMode::NextMove)
            .encode()
            .unwrap();
        assert_eq!(word.word(), 0x2000_1003);
        assert_eq!(word.to_string(), "$20001003");
    }

    /// 子程序触发占 bit 24..28
    #[test]
    fn test_subroutine_nibble() {
        let word = TimePoint::new(0x1003).with_subroutine(10).encode().unwrap();
        assert_eq!(word.word(), 0x0A00_1003);
    }

    #[test]
    fn test_combined_fields() {
        let word = TimePoint::new(250)
            .with_vel_mode(VelocityMode::PreviousMove)
            .with_subroutine(15)
            .encode()
            .unwrap();
        assert_eq!(word.word(), 250 | 15 << 24 | 1 << 28);
    }

    /// 零移动时间是合法编码，由固件在运行时报故障
    #[test]
    fn test_zero_ticks_encodes() {
        assert_eq!(TimePoint::new(0).encode().unwrap().to_string(), "$0");
    }

    #[test]
    fn test_ticks_overflow_rejected() {
        let err = TimePoint::new(1 << 24).encode().unwrap_err();
        assert_eq!(err, ProtocolError::MoveTimeTooLong { ticks: 1 << 24 });
    }

    #[test]
    fn test_invalid_subroutine_rejected() {
        for subroutine in [1u8, 9, 16, 255] {
            let err = TimePoint::new(250).with_subroutine(subroutine).encode().unwrap_err();
            assert_eq!(err, ProtocolError::InvalidSubroutine { subroutine });
        }
    }

    #[test]
    fn test_velocity_mode_from_code() {
        assert_eq!(VelocityMode::try_from(0u8).unwrap(), VelocityMode::Average);
        assert_eq!(VelocityMode::try_from(2u8).unwrap(), VelocityMode::NextMove);
        assert!(VelocityMode::try_from(3u8).is_err());
    }
}
