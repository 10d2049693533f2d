//! 控制器客户端
//!
//! 所有领域操作都由 [`tpmac_comm::CommandChannel`] 的交换加字符串
//! 格式化组合而成。每次交换都有固定的传输开销，状态轮询因此合并
//! 为单次多变量读取。

use crate::{BufferId, ClientError, CoordinateSystem, PointSet, ScanStatus};
use std::collections::HashMap;
use std::time::Duration;
use tpmac_comm::{Carrier, CommandChannel, EthernetCarrier, TerminalCarrier};
use tpmac_protocol::{
    command, vars, AxisKey, BufferLayout, MotorAssignment,
};
use tracing::{debug, info};

/// 控制器默认以太网端口
pub const DEFAULT_PORT: u16 = 1025;

/// 默认响应超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// 一次状态轮询的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ScanStatus,
    /// 程序错误码，0 = 无错误
    pub error: u16,
    /// 已扫描总点数
    pub total_points: u64,
    /// 当前缓冲内索引
    pub current_index: u32,
    /// 控制器正在消费的缓冲
    pub current_buffer: BufferId,
}

/// 连接配置构建器
///
/// 连接归调用方所有：构建 → N 次交换 → 随客户端一起丢弃。
#[derive(Debug, Clone)]
pub struct ControllerBuilder {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ControllerBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 端口（默认 1025）
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 响应超时（默认 3 秒）
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 经以太网口连接
    pub fn connect(self) -> Result<ControllerClient<EthernetCarrier>, ClientError> {
        let carrier = EthernetCarrier::connect(&self.host, self.port, self.timeout)?;
        ControllerClient::from_channel(CommandChannel::new(carrier, self.timeout))
    }

    /// 经终端服务器会话连接
    pub fn connect_terminal(self) -> Result<ControllerClient<TerminalCarrier>, ClientError> {
        let carrier = TerminalCarrier::connect(&self.host, self.port, self.timeout)?;
        ControllerClient::from_channel(CommandChannel::new(carrier, self.timeout))
    }
}

/// 控制器客户端
pub struct ControllerClient<C: Carrier> {
    channel: CommandChannel<C>,
    /// 单轴子缓冲长度（点数），连接时读取一次
    buffer_length: u32,
    buffer_address_a: u32,
    buffer_address_b: u32,
    /// 最近一次状态轮询得到的活动缓冲
    current_buffer: BufferId,
    coordinate_systems: HashMap<u8, CoordinateSystem>,
}

impl<C: Carrier> ControllerClient<C> {
    /// 在已建立的通道上初始化客户端
    ///
    /// 读取程序状态与固定配置（缓冲长度、两个缓冲根地址）。
    pub fn from_channel(channel: CommandChannel<C>) -> Result<Self, ClientError> {
        let mut client = Self {
            channel,
            buffer_length: 0,
            buffer_address_a: 0,
            buffer_address_b: 0,
            current_buffer: BufferId::A,
            coordinate_systems: HashMap::new(),
        };

        let status = client.read_parsed::<u8>(vars::VAR_STATUS)?;
        let error = client.read_parsed::<u16>(vars::VAR_ERROR)?;
        client.buffer_length = client.read_parsed(vars::VAR_BUFFER_LENGTH)?;
        client.buffer_address_a = client.read_parsed(vars::VAR_BUFFER_ADDRESS_A)?;
        client.buffer_address_b = client.read_parsed(vars::VAR_BUFFER_ADDRESS_B)?;

        info!(
            status,
            error,
            buffer_length = client.buffer_length,
            "controller client initialised (buffers at {:x}/{:x})",
            client.buffer_address_a,
            client.buffer_address_b,
        );
        Ok(client)
    }

    // ==================== 变量与内存访问 ====================

    /// 读取一个命名变量
    pub fn read_variable(&self, variable: &str) -> Result<String, ClientError> {
        let reply = self
            .channel
            .send(variable)
            .map_err(|source| ClientError::ReadFailed {
                command: variable.to_string(),
                source,
            })?;
        Ok(first_field(&reply).to_string())
    }

    /// 读取并解析一个命名变量
    fn read_parsed<T: std::str::FromStr>(&self, variable: &str) -> Result<T, ClientError> {
        let value = self.read_variable(variable)?;
        value.parse().map_err(|_| ClientError::MalformedReply {
            command: variable.to_string(),
            reply: value,
        })
    }

    /// 设置一个命名变量
    pub fn set_variable(&self, variable: &str, value: &str) -> Result<(), ClientError> {
        let cmd = command::variable_write(variable, value);
        self.channel
            .send(&cmd)
            .map_err(|source| ClientError::WriteFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(())
    }

    /// 一次交换读取多个命名变量
    ///
    /// 多个读取表达式拼成一条命令，按 `\r` 拆分多行响应。
    pub fn read_multiple_variables(&self, variables: &[&str]) -> Result<Vec<String>, ClientError> {
        let cmd = variables.concat();
        let reply = self
            .channel
            .send(&cmd)
            .map_err(|source| ClientError::ReadFailed {
                command: cmd.clone(),
                source,
            })?;

        let values: Vec<String> = split_fields(&reply).map(str::to_string).collect();
        if values.len() != variables.len() {
            return Err(ClientError::MalformedReply {
                command: cmd,
                reply,
            });
        }
        Ok(values)
    }

    /// 按读模式读取内存地址的值
    pub fn read_address(&self, mode: char, address: u32) -> Result<String, ClientError> {
        let cmd = command::address_read(mode, address);
        let reply = self
            .channel
            .send(&cmd)
            .map_err(|source| ClientError::ReadFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(first_field(&reply).to_string())
    }

    /// 按写模式向内存地址写入单值
    pub fn write_to_address(
        &self,
        mode: char,
        address: u32,
        value: &str,
    ) -> Result<(), ClientError> {
        let cmd = command::address_write(mode, address, value);
        self.channel
            .send(&cmd)
            .map_err(|source| ClientError::WriteFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(())
    }

    // ==================== 电机与程序控制 ====================

    /// 把电机指派到坐标系的轴上
    ///
    /// 电机号与轴在发出任何 I/O 之前校验；指派记入坐标系簿记，
    /// 供程序启动和速度校验使用。
    pub fn assign_motors(
        &mut self,
        cs: u8,
        assignments: &[MotorAssignment],
    ) -> Result<(), ClientError> {
        let cmd = command::assign_motors_command(cs, assignments)?;

        let entry = self
            .coordinate_systems
            .entry(cs)
            .or_insert_with(|| CoordinateSystem::new(cs));
        for assignment in assignments {
            entry.add_assignment(*assignment);
        }

        self.channel
            .send(&cmd)
            .map_err(|source| ClientError::WriteFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(())
    }

    /// 归零坐标系内已指派的电机
    pub fn home_motors(&self, cs: u8) -> Result<(), ClientError> {
        let cs = self.require_cs(cs)?;
        let cmd = command::home_command(cs.motors());
        self.channel
            .send(&cmd)
            .map_err(|source| ClientError::WriteFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(())
    }

    /// 启动运动程序
    ///
    /// 先点动释放坐标系内实际指派的电机，再启动程序；
    /// 控制器开始按自身时钟消费当前缓冲，与宿主机无关。
    pub fn run_motion_program(&self, program: u16, cs: u8) -> Result<(), ClientError> {
        let cs = self.require_cs(cs)?;
        let cmd = command::run_program_command(cs.motors(), cs.number(), program);
        info!(program, cs = cs.number(), "starting motion program");
        self.channel
            .send(&cmd)
            .map_err(|source| ClientError::WriteFailed {
                command: cmd.clone(),
                source,
            })?;
        Ok(())
    }

    /// 在线全局中止
    pub fn force_abort(&self) -> Result<(), ClientError> {
        self.channel
            .send(command::ABORT_COMMAND)
            .map_err(|source| ClientError::WriteFailed {
                command: command::ABORT_COMMAND.to_string(),
                source,
            })?;
        Ok(())
    }

    /// 置中止变量，请求程序协作停止
    pub fn set_abort(&self) -> Result<(), ClientError> {
        self.set_variable(vars::VAR_ABORT, "1")
    }

    /// 设置请求轴位掩码
    pub fn set_axes(&self, axes: &[AxisKey]) -> Result<(), ClientError> {
        let mask: u16 = axes.iter().filter_map(|axis| axis.bit()).sum();
        self.set_variable(vars::VAR_AXES, &mask.to_string())
    }

    /// 读取坐标系内电机 1..=9 的最大速度（`i<n>16`）
    pub fn read_cs_max_velocities(&mut self, cs: u8) -> Result<(), ClientError> {
        let names: Vec<String> = (1..=9).map(vars::max_velocity_var).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let values = self.read_multiple_variables(&refs)?;

        let mut velocities = [0.0f64; 9];
        for (slot, value) in velocities.iter_mut().zip(&values) {
            *slot = value.parse().map_err(|_| ClientError::MalformedReply {
                command: "i<n>16".into(),
                reply: value.clone(),
            })?;
        }

        self.coordinate_systems
            .entry(cs)
            .or_insert_with(|| CoordinateSystem::new(cs))
            .set_max_velocities(velocities);
        Ok(())
    }

    /// 电机当前位置（counts）
    pub fn read_motor_position(&self, motor: u8) -> Result<f64, ClientError> {
        let cmd = command::motor_position_command(motor);
        let reply = self
            .channel
            .send(&cmd)
            .map_err(|source| ClientError::ReadFailed {
                command: cmd.clone(),
                source,
            })?;
        parse_field(&cmd, &reply)
    }

    /// 电机当前速度（counts/servo cycle）
    pub fn read_motor_velocity(&self, motor: u8) -> Result<f64, ClientError> {
        let cmd = command::motor_velocity_command(motor);
        let reply = self
            .channel
            .send(&cmd)
            .map_err(|source| ClientError::ReadFailed {
                command: cmd.clone(),
                source,
            })?;
        parse_field(&cmd, &reply)
    }

    /// 持久化保存控制器配置
    ///
    /// 已知的慢命令：双倍超时，且允许空终结符作为忙信号。
    pub fn save(&self) -> Result<(), ClientError> {
        self.channel.send_slow("SAVE").map_err(|source| {
            ClientError::WriteFailed {
                command: "SAVE".into(),
                source,
            }
        })?;
        Ok(())
    }

    /// 运动程序版本
    pub fn program_version(&self) -> Result<String, ClientError> {
        self.read_variable(vars::VAR_VERSION)
    }

    // ==================== 状态轮询 ====================

    /// 单次交换更新全部状态变量
    pub fn update_status(&mut self) -> Result<StatusSnapshot, ClientError> {
        let values = self.read_multiple_variables(&[
            vars::VAR_STATUS,
            vars::VAR_ERROR,
            vars::VAR_TOTAL_POINTS,
            vars::VAR_CURRENT_INDEX,
            vars::VAR_CURRENT_BUFFER,
        ])?;

        let status_code: i64 = parse_value(vars::VAR_STATUS, &values[0])?;
        let status = ScanStatus::try_from(u8::try_from(status_code).map_err(|_| {
            ClientError::UnknownStatus { code: status_code }
        })?)
        .map_err(|_| ClientError::UnknownStatus { code: status_code })?;

        let buffer_code: i64 = parse_value(vars::VAR_CURRENT_BUFFER, &values[4])?;
        let current_buffer = BufferId::try_from(u8::try_from(buffer_code).map_err(|_| {
            ClientError::MalformedReply {
                command: vars::VAR_CURRENT_BUFFER.into(),
                reply: values[4].clone(),
            }
        })?)
        .map_err(|_| ClientError::MalformedReply {
            command: vars::VAR_CURRENT_BUFFER.into(),
            reply: values[4].clone(),
        })?;

        let snapshot = StatusSnapshot {
            status,
            error: parse_value(vars::VAR_ERROR, &values[1])?,
            total_points: parse_value(vars::VAR_TOTAL_POINTS, &values[2])?,
            current_index: parse_value(vars::VAR_CURRENT_INDEX, &values[3])?,
            current_buffer,
        };

        self.current_buffer = snapshot.current_buffer;
        debug!(?snapshot, "status updated");
        Ok(snapshot)
    }

    // ==================== 缓冲填充 ====================

    /// 填充控制器正在消费的缓冲（仅在程序启动前有意义）
    pub fn fill_current_buffer(&self, points: &PointSet) -> Result<(), ClientError> {
        self.fill_buffer(self.layout(self.current_buffer), points)
    }

    /// 填充空闲缓冲
    ///
    /// 布局按最近一次状态轮询的活动缓冲重新计算；
    /// 绝不触碰控制器正在读取的那一半。
    pub fn fill_idle_buffer(&self, points: &PointSet) -> Result<(), ClientError> {
        self.fill_buffer(self.layout(self.current_buffer.other()), points)
    }

    fn fill_buffer(&self, layout: BufferLayout, points: &PointSet) -> Result<(), ClientError> {
        points.validate(self.buffer_length)?;

        // 整个缓冲的写序列持锁完成，不与其他调用方交错
        let mut batch = self.channel.batch();
        for (key, values) in points.rendered() {
            let mut address = layout.address(key);
            let mut remaining = values.as_slice();
            while !remaining.is_empty() {
                let (cmd, sent) = command::write_command('L', address, remaining)?;
                batch
                    .send(&cmd)
                    .map_err(|source| ClientError::WriteFailed {
                        command: cmd.clone(),
                        source,
                    })?;
                address += sent as u32;
                remaining = &remaining[sent..];
            }
        }
        debug!(points = points.len(), "points sent to {:x}", layout.root());
        Ok(())
    }

    /// 设置当前缓冲的填充水位
    pub fn set_current_buffer_fill(&self, fill_level: u32) -> Result<(), ClientError> {
        self.set_variable(self.fill_var(self.current_buffer), &fill_level.to_string())
    }

    /// 设置空闲缓冲的填充水位
    pub fn set_idle_buffer_fill(&self, fill_level: u32) -> Result<(), ClientError> {
        self.set_variable(
            self.fill_var(self.current_buffer.other()),
            &fill_level.to_string(),
        )
    }

    /// 两个缓冲全部清零
    pub fn reset_buffers(&self) -> Result<(), ClientError> {
        let zeroes = PointSet::zeroes(self.buffer_length as usize)?;
        self.fill_current_buffer(&zeroes)?;
        self.fill_idle_buffer(&zeroes)?;
        Ok(())
    }

    /// 读回缓冲内存里的点（验证用）
    ///
    /// 先读 time 子缓冲，再按槽位顺序读前 `num_axes` 根轴。
    pub fn read_points(
        &self,
        num_points: u32,
        buffer: BufferId,
        num_axes: usize,
    ) -> Result<Vec<String>, ClientError> {
        let layout = self.layout(buffer);
        let mut values = Vec::new();

        for key in AxisKey::ALL.iter().take(num_axes + 1) {
            let start = layout.address(*key);
            for offset in 0..num_points {
                values.push(self.read_address('L', start + offset)?);
            }
        }
        Ok(values)
    }

    // ==================== 访问器 ====================

    /// 单轴子缓冲长度（点数）
    pub fn buffer_length(&self) -> u32 {
        self.buffer_length
    }

    /// 某个半缓冲的地址布局
    pub fn layout(&self, buffer: BufferId) -> BufferLayout {
        let root = match buffer {
            BufferId::A => self.buffer_address_a,
            BufferId::B => self.buffer_address_b,
        };
        BufferLayout::new(root, self.buffer_length)
    }

    /// 最近一次状态轮询得到的活动缓冲
    pub fn current_buffer(&self) -> BufferId {
        self.current_buffer
    }

    /// 坐标系簿记
    pub fn coordinate_system(&self, cs: u8) -> Option<&CoordinateSystem> {
        self.coordinate_systems.get(&cs)
    }

    fn require_cs(&self, cs: u8) -> Result<&CoordinateSystem, ClientError> {
        self.coordinate_systems
            .get(&cs)
            .filter(|entry| !entry.assignments().is_empty())
            .ok_or(ClientError::UnknownCoordinateSystem { cs })
    }

    fn fill_var(&self, buffer: BufferId) -> &'static str {
        match buffer {
            BufferId::A => vars::VAR_BUFFER_FILL_A,
            BufferId::B => vars::VAR_BUFFER_FILL_B,
        }
    }
}

/// 响应的第一个 `\r` 分隔字段
fn first_field(reply: &str) -> &str {
    reply.split('\r').next().unwrap_or(reply)
}

/// 多行响应的全部字段（末尾 `\r` 之后的空段丢弃）
fn split_fields(reply: &str) -> impl Iterator<Item = &str> {
    let trimmed = reply.strip_suffix('\r').unwrap_or(reply);
    trimmed.split('\r').filter(|field| !field.is_empty())
}

fn parse_field<T: std::str::FromStr>(command: &str, reply: &str) -> Result<T, ClientError> {
    parse_value(command, first_field(reply))
}

fn parse_value<T: std::str::FromStr>(command: &str, value: &str) -> Result<T, ClientError> {
    value.parse().map_err(|_| ClientError::MalformedReply {
        command: command.to_string(),
        reply: value.to_string(),
    })
}

impl ControllerClient<EthernetCarrier> {
    /// 以默认端口与超时连接控制器
    pub fn connect(host: &str) -> Result<Self, ClientError> {
        ControllerBuilder::new(host).connect()
    }
}
