//! 点源
//!
//! 流送循环按缓冲长度向点源索要连续切片。环形源在序列末尾回绕
//! （如闭合轨迹反复扫描），一次性源在耗尽后给出空切片，流送器据
//! 此让程序在当前缓冲走完后自然结束。

use tpmac_client::PointSet;
use tpmac_protocol::AxisKey;

/// 轨迹点的来源
pub trait PointSource {
    /// 下一段至多 `len` 个点的连续切片
    fn next_slice(&mut self, len: usize) -> PointSet;

    /// 是否已无更多点可供
    fn is_exhausted(&self) -> bool;
}

/// 取出源点集的一段，必要时回绕
fn slice_of(points: &PointSet, start: usize, len: usize, wrap: bool) -> PointSet {
    let total = points.len();
    let indices: Vec<usize> = if wrap {
        (0..len).map(|i| (start + i) % total).collect()
    } else {
        (start..total.min(start + len)).collect()
    };

    let time = indices.iter().map(|&i| points.time()[i]).collect();
    let mut slice = PointSet::new(time);
    for axis in AxisKey::MOTION_AXES {
        let values = points.axis(axis);
        if !values.is_empty() {
            let picked = indices.iter().map(|&i| values[i]).collect();
            // 槽位来自 MOTION_AXES，set_axis 不会失败
            let _ = slice.set_axis(axis, picked);
        }
    }
    slice
}

/// 环形点源：到末尾回绕，永不耗尽
pub struct CircularSource {
    points: PointSet,
    cursor: usize,
}

impl CircularSource {
    pub fn new(points: PointSet) -> Self {
        Self { points, cursor: 0 }
    }
}

impl PointSource for CircularSource {
    fn next_slice(&mut self, len: usize) -> PointSet {
        if self.points.is_empty() {
            return PointSet::new(Vec::new());
        }
        let slice = slice_of(&self.points, self.cursor, len, true);
        self.cursor = (self.cursor + len) % self.points.len();
        slice
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}

/// 一次性点源：顺序给出，到末尾为止
pub struct OneShotSource {
    points: PointSet,
    cursor: usize,
}

impl OneShotSource {
    pub fn new(points: PointSet) -> Self {
        Self { points, cursor: 0 }
    }
}

impl PointSource for OneShotSource {
    fn next_slice(&mut self, len: usize) -> PointSet {
        let slice = slice_of(&self.points, self.cursor, len, false);
        self.cursor += slice.len();
        slice
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpmac_client::Trajectory;
    use tpmac_protocol::TimePoint;

    fn points(n: usize) -> PointSet {
        let mut traj = Trajectory::new();
        traj.time = (0..n as u32).map(|i| TimePoint::new(100 + i)).collect();
        traj.set_axis(AxisKey::X, (0..n).map(|i| i as f64).collect())
            .unwrap();
        traj.format().unwrap()
    }

    #[test]
    fn test_circular_source_wraps_around() {
        let source_points = points(5);
        let mut source = CircularSource::new(source_points.clone());

        let first = source.next_slice(3);
        assert_eq!(first.time(), &source_points.time()[..3]);

        // 第二段跨越末尾：4, 0
        let second = source.next_slice(3);
        assert_eq!(second.time()[0], source_points.time()[3]);
        assert_eq!(second.time()[1], source_points.time()[4]);
        assert_eq!(second.time()[2], source_points.time()[0]);
        assert_eq!(second.axis(AxisKey::X)[2], source_points.axis(AxisKey::X)[0]);

        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_one_shot_source_runs_dry() {
        let mut source = OneShotSource::new(points(5));

        assert_eq!(source.next_slice(3).len(), 3);
        assert!(!source.is_exhausted());

        let tail = source.next_slice(3);
        assert_eq!(tail.len(), 2);
        assert!(source.is_exhausted());

        assert_eq!(source.next_slice(3).len(), 0);
    }

    #[test]
    fn test_slices_preserve_axis_alignment() {
        let source_points = points(6);
        let mut source = OneShotSource::new(source_points.clone());

        let slice = source.next_slice(4);
        assert_eq!(slice.axis(AxisKey::X), &source_points.axis(AxisKey::X)[..4]);
        assert!(slice.validate(50).is_ok());
    }
}
