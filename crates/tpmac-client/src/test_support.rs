//! 测试用脚本化载体
//!
//! 按序回放预置响应，并把收到的命令与超时记录到共享句柄里，
//! 供测试在客户端夺走载体所有权之后检查。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tpmac_comm::{Carrier, CommError, CommandChannel};

use crate::ControllerClient;

type Reply = Result<String, CommError>;

/// 脚本化载体
pub struct ScriptedCarrier {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    commands: Arc<Mutex<Vec<String>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

/// 载体的检查句柄
#[derive(Clone)]
pub struct ScriptHandle {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    commands: Arc<Mutex<Vec<String>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl ScriptHandle {
    /// 追加一条预置响应
    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// 目前为止发出的全部命令
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// 每次交换使用的超时
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

impl Carrier for ScriptedCarrier {
    fn exchange(&mut self, command: &str, timeout: Duration) -> Result<String, CommError> {
        self.commands.lock().unwrap().push(command.to_string());
        self.timeouts.lock().unwrap().push(timeout);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CommError::Malformed))
    }

    fn peer(&self) -> &str {
        "scripted"
    }
}

/// 新建脚本化载体及其检查句柄
pub fn scripted_carrier(replies: Vec<Reply>) -> (ScriptedCarrier, ScriptHandle) {
    let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let timeouts = Arc::new(Mutex::new(Vec::new()));

    let carrier = ScriptedCarrier {
        replies: replies.clone(),
        commands: commands.clone(),
        timeouts: timeouts.clone(),
    };
    let handle = ScriptHandle {
        replies,
        commands,
        timeouts,
    };
    (carrier, handle)
}

/// 客户端初始化时读取的五个固定变量的标准响应
///
/// 缓冲长度 50，缓冲根地址 0x30000 / 0x30226（十进制上报）。
pub fn boot_replies() -> Vec<Reply> {
    vec![
        Ok("0\r".into()),      // P4001 状态
        Ok("0\r".into()),      // P4015 错误码
        Ok("50\r".into()),     // P4004 缓冲长度
        Ok("196608\r".into()), // P4008 = 0x30000
        Ok("197158\r".into()), // P4009 = 0x30226
    ]
}

/// 在脚本化载体上构建客户端
pub fn scripted_client(
    replies: Vec<Reply>,
) -> (ControllerClient<ScriptedCarrier>, ScriptHandle) {
    let (carrier, handle) = scripted_carrier(replies);
    let channel = CommandChannel::new(carrier, Duration::from_secs(3));
    let client = ControllerClient::from_channel(channel).expect("scripted boot failed");
    (client, handle)
}
