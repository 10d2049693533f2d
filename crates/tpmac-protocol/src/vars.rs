//! 运动程序控制变量名
//!
//! 驻留运动程序通过一组 P 变量与宿主机交换控制与遥测信息；
//! 变量号基址 4000 与固件侧约定一致。

/// 程序状态：0 已初始化，1 运行中，2 空闲，3 故障
pub const VAR_STATUS: &str = "P4001";

/// 中止触发：宿主机写 1 请求停止
pub const VAR_ABORT: &str = "P4002";

/// 请求轴位掩码（1..=511）
pub const VAR_AXES: &str = "P4003";

/// 单轴子缓冲长度（点数）
pub const VAR_BUFFER_LENGTH: &str = "P4004";

/// 已扫描总点数
pub const VAR_TOTAL_POINTS: &str = "P4005";

/// 当前缓冲内索引
pub const VAR_CURRENT_INDEX: &str = "P4006";

/// 当前活动缓冲：0 = A，1 = B
pub const VAR_CURRENT_BUFFER: &str = "P4007";

/// 缓冲 A 根地址
pub const VAR_BUFFER_ADDRESS_A: &str = "P4008";

/// 缓冲 B 根地址
pub const VAR_BUFFER_ADDRESS_B: &str = "P4009";

/// 缓冲 A 填充水位
pub const VAR_BUFFER_FILL_A: &str = "P4011";

/// 缓冲 B 填充水位
pub const VAR_BUFFER_FILL_B: &str = "P4012";

/// 程序错误码（0 = 无错误）
pub const VAR_ERROR: &str = "P4015";

/// 运动程序版本
pub const VAR_VERSION: &str = "P4020";

/// 坐标系第 n 号电机的最大速度变量：`i<n>16`（counts/ms）
pub fn max_velocity_var(motor: u8) -> String {
    format!("i{motor}16")
}
