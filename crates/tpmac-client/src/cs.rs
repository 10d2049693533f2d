//! 坐标系簿记
//!
//! 一个坐标系是一组带换算系数的电机到轴的指派，外加从控制器读回
//! 的每电机最大速度。只保留缓冲内容校验所需的最小信息。

use tpmac_protocol::{AxisKey, MotorAssignment};

/// 坐标系
#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    number: u8,
    assignments: Vec<MotorAssignment>,
    /// 电机最大速度（counts/ms），下标 = 电机号 − 1
    max_velocities: [f64; 9],
}

impl CoordinateSystem {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            assignments: Vec::new(),
            max_velocities: [0.0; 9],
        }
    }

    /// 坐标系号
    pub fn number(&self) -> u8 {
        self.number
    }

    /// 记录一条电机指派；同一电机的旧指派被替换
    pub fn add_assignment(&mut self, assignment: MotorAssignment) {
        self.assignments.retain(|a| a.motor != assignment.motor);
        self.assignments.push(assignment);
    }

    /// 已指派的电机号，按指派顺序
    pub fn motors(&self) -> impl Iterator<Item = u8> + '_ {
        self.assignments.iter().map(|a| a.motor)
    }

    /// 指派列表
    pub fn assignments(&self) -> &[MotorAssignment] {
        &self.assignments
    }

    /// 某根轴对应的指派
    pub fn assignment_for_axis(&self, axis: AxisKey) -> Option<&MotorAssignment> {
        self.assignments.iter().find(|a| a.axis == axis)
    }

    /// 设置每电机最大速度（counts/ms）
    pub fn set_max_velocities(&mut self, velocities: [f64; 9]) {
        self.max_velocities = velocities;
    }

    /// 电机最大速度（counts/ms）；电机号超界返回 0
    pub fn max_velocity_of_motor(&self, motor: u8) -> f64 {
        if (1..=9).contains(&motor) {
            self.max_velocities[motor as usize - 1]
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_replaces_same_motor() {
        let mut cs = CoordinateSystem::new(1);
        cs.add_assignment(MotorAssignment::new(1, AxisKey::X, 100.0));
        cs.add_assignment(MotorAssignment::new(1, AxisKey::Y, 50.0));

        assert_eq!(cs.assignments().len(), 1);
        assert_eq!(cs.assignment_for_axis(AxisKey::Y).unwrap().motor, 1);
        assert!(cs.assignment_for_axis(AxisKey::X).is_none());
    }

    #[test]
    fn test_max_velocities_by_motor() {
        let mut cs = CoordinateSystem::new(1);
        cs.set_max_velocities([10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0]);

        assert_eq!(cs.max_velocity_of_motor(1), 10.0);
        assert_eq!(cs.max_velocity_of_motor(9), 90.0);
        assert_eq!(cs.max_velocity_of_motor(10), 0.0);
    }
}
