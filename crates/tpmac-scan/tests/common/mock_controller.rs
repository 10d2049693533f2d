//! 模拟控制器
//!
//! 用于测试的控制器行为模型：P 变量、L 内存、按轮询计数翻转的
//! 双缓冲消费，以及启动时的轴掩码/零移动时间故障。作为 [`Carrier`]
//! 直接挂在命令通道下面，没有真实 I/O。
//!
//! 每次对 `P4007`（当前缓冲）的状态轮询推进一个仿真节拍；连续
//! `polls_per_flip` 个节拍消费完一个缓冲。翻转时若另一半水位为零，
//! 程序正常结束；运行期间任何落在活动缓冲地址范围内的写入都被记
//! 为违规。

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tpmac_comm::{Carrier, CommError};

/// 缓冲 A / B 的根地址
pub const ROOTS: [u32; 2] = [0x30000, 0x30226];

/// 模拟控制器状态
pub struct MockControllerState {
    pub status: u8,
    pub error: u16,
    pub abort: u8,
    pub axes: u16,
    pub buffer_length: u32,
    pub total_points: u64,
    pub current_index: u32,
    pub current_buffer: u8,
    pub fill: [u32; 2],
    /// L 内存
    pub memory: HashMap<u32, String>,
    pub started: bool,
    /// 消费完一个缓冲所需的状态轮询数
    pub polls_per_flip: u32,
    status_polls: u32,
    /// 观察到的缓冲翻转次数
    pub flips: u32,
    /// 程序运行期间每个缓冲的水位设置次数（即回填完成次数）
    pub refills: [u32; 2],
    /// 运行期间写入活动缓冲的违规命令
    pub violations: Vec<String>,
    /// 收到的全部命令
    pub commands: Vec<String>,
}

impl MockControllerState {
    fn new(buffer_length: u32, polls_per_flip: u32) -> Self {
        Self {
            status: 0,
            error: 0,
            abort: 0,
            axes: 0,
            buffer_length,
            total_points: 0,
            current_index: 0,
            current_buffer: 0,
            fill: [0, 0],
            memory: HashMap::new(),
            started: false,
            polls_per_flip,
            status_polls: 0,
            flips: 0,
            refills: [0, 0],
            violations: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn running(&self) -> bool {
        self.started && self.status == 1
    }

    /// 一个仿真节拍：消费进度推进，必要时翻转或结束
    fn tick(&mut self) {
        if !self.running() {
            return;
        }
        if self.abort == 1 {
            self.status = 2;
            return;
        }

        self.status_polls += 1;
        let cur = self.current_buffer as usize;

        if self.status_polls % self.polls_per_flip == 0 {
            // 当前缓冲消费完
            self.total_points += u64::from(self.fill[cur]);
            self.current_index = 0;
            let next = 1 - cur;
            if self.fill[next] == 0 {
                self.status = 2;
            } else {
                // 消费过的水位作废，等宿主机回填
                self.fill[cur] = 0;
                self.current_buffer = next as u8;
                self.flips += 1;
            }
        } else {
            let progress = self.status_polls % self.polls_per_flip;
            self.current_index = self.fill[cur] * progress / self.polls_per_flip;
        }
    }

    fn start_program(&mut self) {
        self.started = true;
        self.status_polls = 0;
        self.total_points = 0;
        self.current_index = 0;

        // 轴掩码校验
        if self.axes == 0 || self.axes > 511 {
            self.status = 3;
            self.error = 1;
            self.abort = 1;
            return;
        }

        // 当前缓冲首点零移动时间
        let cur = self.current_buffer as usize;
        let first_time = self.memory.get(&ROOTS[cur]);
        if self.fill[cur] > 0 && first_time.is_some_and(|word| word == "$0") {
            self.status = 3;
            self.error = 2;
            self.abort = 1;
            return;
        }

        self.status = 1;
    }

    fn active_range(&self) -> (u32, u32) {
        let root = ROOTS[self.current_buffer as usize];
        (root, root + 10 * self.buffer_length)
    }

    fn write_memory(&mut self, address: u32, values: &[&str], command: &str) {
        if self.running() {
            let (start, end) = self.active_range();
            let write_end = address + values.len() as u32;
            if address < end && write_end > start {
                self.violations.push(command.to_string());
            }
        }
        for (offset, value) in values.iter().enumerate() {
            self.memory.insert(address + offset as u32, value.to_string());
        }
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        match name {
            "P4002" => self.abort = value.parse().unwrap_or(0),
            "P4003" => self.axes = value.parse().unwrap_or(0),
            "P4011" => {
                self.fill[0] = value.parse().unwrap_or(0);
                if self.running() {
                    self.refills[0] += 1;
                }
            }
            "P4012" => {
                self.fill[1] = value.parse().unwrap_or(0);
                if self.running() {
                    self.refills[1] += 1;
                }
            }
            _ => {}
        }
    }

    fn variable_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "P4001" => self.status.to_string(),
            "P4002" => self.abort.to_string(),
            "P4003" => self.axes.to_string(),
            "P4004" => self.buffer_length.to_string(),
            "P4005" => self.total_points.to_string(),
            "P4006" => self.current_index.to_string(),
            "P4007" => self.current_buffer.to_string(),
            "P4008" => ROOTS[0].to_string(),
            "P4009" => ROOTS[1].to_string(),
            "P4011" => self.fill[0].to_string(),
            "P4012" => self.fill[1].to_string(),
            "P4015" => self.error.to_string(),
            "P4020" => "1".to_string(),
            name if name.starts_with('i') && name.ends_with("16") => "100".to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// 把拼接的变量读取命令拆回单个变量名（`P4001P4015…`、`i116i216…`）
fn split_variable_names(command: &str) -> Vec<&str> {
    let mut boundaries: Vec<usize> = command
        .char_indices()
        .filter(|&(i, c)| i > 0 && (c == 'P' || c == 'i'))
        .map(|(i, _)| i)
        .collect();
    boundaries.push(command.len());

    let mut names = Vec::new();
    let mut start = 0;
    for end in boundaries {
        names.push(&command[start..end]);
        start = end;
    }
    names
}

/// 模拟控制器载体
pub struct MockController {
    state: Arc<Mutex<MockControllerState>>,
}

/// 新建模拟控制器及其状态句柄
pub fn mock_controller(
    buffer_length: u32,
    polls_per_flip: u32,
) -> (MockController, Arc<Mutex<MockControllerState>>) {
    let state = Arc::new(Mutex::new(MockControllerState::new(
        buffer_length,
        polls_per_flip,
    )));
    (
        MockController {
            state: state.clone(),
        },
        state,
    )
}

impl Carrier for MockController {
    fn exchange(&mut self, command: &str, _timeout: Duration) -> Result<String, CommError> {
        let mut state = self.state.lock();
        state.commands.push(command.to_string());

        // 在线全局中止
        if command == "A" {
            state.abort = 1;
            if state.status == 1 {
                state.status = 2;
            }
            return Ok("\r".to_string());
        }

        // 分块内存写入：W<mode>$<addr>,<v1>,...
        if command.len() > 2
            && command.starts_with('W')
            && command.as_bytes()[2] == b'$'
            && command.contains(',')
        {
            let payload = &command[3..];
            let (addr_text, values_text) = payload
                .split_once(',')
                .ok_or(CommError::Malformed)?;
            let address =
                u32::from_str_radix(addr_text, 16).map_err(|_| CommError::Malformed)?;
            let values: Vec<&str> = values_text.split(',').collect();
            state.write_memory(address, &values, command);
            return Ok("\r".to_string());
        }

        // 单值内存写入：W<mode> $<addr> <value>
        if command.starts_with('W') && command.contains(" $") {
            let mut parts = command.split_whitespace();
            let _mode = parts.next();
            let addr_text = parts.next().and_then(|t| t.strip_prefix('$'));
            let value = parts.next();
            if let (Some(addr_text), Some(value)) = (addr_text, value) {
                let address =
                    u32::from_str_radix(addr_text, 16).map_err(|_| CommError::Malformed)?;
                state.write_memory(address, &[value], command);
                return Ok("\r".to_string());
            }
            return Err(CommError::Malformed);
        }

        // 内存读取：R<mode> $<addr>
        if command.starts_with('R') && command.contains(" $") {
            let addr_text = command
                .split_whitespace()
                .nth(1)
                .and_then(|t| t.strip_prefix('$'))
                .ok_or(CommError::Malformed)?;
            let address =
                u32::from_str_radix(addr_text, 16).map_err(|_| CommError::Malformed)?;
            let value = state
                .memory
                .get(&address)
                .cloned()
                .unwrap_or_else(|| "$0".to_string());
            return Ok(format!("{value}\r"));
        }

        // 电机指派
        if command.starts_with('&') && command.contains("->") {
            return Ok("\r".to_string());
        }

        // 归零
        if command.contains("HMZ") {
            return Ok("\r".to_string());
        }

        // 程序启动：#..J/..&<cs>B<prog>R
        if command.starts_with('#') && command.contains('&') && command.ends_with('R') {
            state.start_program();
            return Ok("\r".to_string());
        }

        // 变量写入
        if let Some((name, value)) = command.split_once('=') {
            state.set_variable(name, value);
            return Ok("\r".to_string());
        }

        // 变量读取（单个或拼接多个）；读到 P4007 视作一次状态轮询节拍
        if command.contains("P4007") {
            state.tick();
        }
        let mut reply = String::new();
        for name in split_variable_names(command) {
            match state.variable_value(name) {
                Some(value) => {
                    reply.push_str(&value);
                    reply.push('\r');
                }
                None => return Err(CommError::Controller),
            }
        }
        Ok(reply)
    }

    fn peer(&self) -> &str {
        "mock-controller"
    }
}
