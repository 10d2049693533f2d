//! 点集
//!
//! 轨迹点按固定形状存放：一个 time 序列加九个运动轴序列（轴序列
//! 允许为空，表示该轴不参与）。形状在构造与发送前校验，而不是在
//! 每次访问时猜测。
//!
//! [`Trajectory`] 持有编码前的原始值（f64 坐标 + 调度元数据），
//! [`PointSet`] 是编码后的可下发形式。

use crate::{ClientError, CoordinateSystem};
use tpmac_protocol::{AxisKey, PmacFloat, TimePoint, TimeWord};
use tracing::debug;

/// 编码前的轨迹段
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    /// 每点调度元数据
    pub time: Vec<TimePoint>,
    /// 九个运动轴的坐标序列（EGU），槽位顺序
    axes: [Vec<f64>; 9],
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置一根轴的坐标序列
    pub fn set_axis(&mut self, axis: AxisKey, values: Vec<f64>) -> Result<(), ClientError> {
        let index = axis
            .motion_index()
            .ok_or(tpmac_protocol::ProtocolError::InvalidAxis)?;
        self.axes[index] = values;
        Ok(())
    }

    /// 一根轴的坐标序列
    pub fn axis(&self, axis: AxisKey) -> &[f64] {
        match axis.motion_index() {
            Some(index) => &self.axes[index],
            None => &[],
        }
    }

    /// 点数
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// 校验隐含速度不超过坐标系内电机的最大速度
    ///
    /// 速度上限以 counts/ms 读回，经指派的换算系数折成 EGU/ms；
    /// 移动时间从 1/4 毫秒计数折成毫秒。没有指派的轴无从校验，跳过。
    pub fn check_max_velocity(&self, cs: &CoordinateSystem) -> Result<(), ClientError> {
        for axis in AxisKey::MOTION_AXES {
            let points = self.axis(axis);
            if points.is_empty() {
                continue;
            }
            let Some(assignment) = cs.assignment_for_axis(axis) else {
                debug!(?axis, "no motor assigned; skipping velocity check");
                continue;
            };
            let max_vel_egu = cs.max_velocity_of_motor(assignment.motor) / assignment.scaling;

            for i in 1..points.len() {
                let move_time_ms = f64::from(self.time[i].ticks) / 4.0;
                let velocity = (points[i] - points[i - 1]) / move_time_ms;
                if velocity > max_vel_egu {
                    return Err(ClientError::VelocityExceeded {
                        motor: assignment.motor,
                        axis,
                    });
                }
            }
        }
        Ok(())
    }

    /// 编码为可下发的点集
    pub fn format(&self) -> Result<PointSet, ClientError> {
        let time = self
            .time
            .iter()
            .map(|point| point.encode())
            .collect::<Result<Vec<_>, _>>()?;

        let mut set = PointSet::new(time);
        for axis in AxisKey::MOTION_AXES {
            let values = self.axis(axis);
            if !values.is_empty() {
                set.set_axis(axis, values.iter().map(|&v| PmacFloat::encode(v)).collect())?;
            }
        }
        Ok(set)
    }
}

/// 编码后的点集
///
/// time 序列是时间字，轴序列是控制器浮点字；空轴序列表示该轴不下发。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointSet {
    time: Vec<TimeWord>,
    axes: [Vec<PmacFloat>; 9],
}

impl PointSet {
    pub fn new(time: Vec<TimeWord>) -> Self {
        Self {
            time,
            axes: Default::default(),
        }
    }

    /// 全零点集（两个缓冲清零时用）
    pub fn zeroes(len: usize) -> Result<Self, ClientError> {
        let zero = TimePoint::new(0).encode()?;
        let mut set = Self::new(vec![zero; len]);
        for axis in AxisKey::MOTION_AXES {
            set.set_axis(axis, vec![PmacFloat::ZERO; len])?;
        }
        Ok(set)
    }

    /// 设置一根轴的编码序列
    pub fn set_axis(&mut self, axis: AxisKey, values: Vec<PmacFloat>) -> Result<(), ClientError> {
        let index = axis
            .motion_index()
            .ok_or(tpmac_protocol::ProtocolError::InvalidAxis)?;
        self.axes[index] = values;
        Ok(())
    }

    /// 一根轴的编码序列
    pub fn axis(&self, axis: AxisKey) -> &[PmacFloat] {
        match axis.motion_index() {
            Some(index) => &self.axes[index],
            None => &[],
        }
    }

    /// time 序列
    pub fn time(&self) -> &[TimeWord] {
        &self.time
    }

    /// 点数（fill length）
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// 形状校验：轴序列等长、不超缓冲容量
    ///
    /// 违反在任何传输 I/O 之前拒绝。
    pub fn validate(&self, buffer_length: u32) -> Result<(), ClientError> {
        if self.len() > buffer_length as usize {
            return Err(ClientError::PointSetTooLong {
                len: self.len(),
                buffer_length: buffer_length as usize,
            });
        }
        for axis in AxisKey::MOTION_AXES {
            let values = self.axis(axis);
            if !values.is_empty() && values.len() != self.len() {
                return Err(ClientError::UnevenPointSet);
            }
        }
        Ok(())
    }

    /// 渲染为每槽位的命令值文本，time 在前、轴按槽位顺序
    pub(crate) fn rendered(&self) -> Vec<(AxisKey, Vec<String>)> {
        let mut slots = Vec::with_capacity(10);
        slots.push((
            AxisKey::Time,
            self.time.iter().map(|word| word.to_string()).collect(),
        ));
        for axis in AxisKey::MOTION_AXES {
            let values = self.axis(axis);
            if !values.is_empty() {
                slots.push((axis, values.iter().map(|word| word.to_string()).collect()));
            }
        }
        slots
    }
}
