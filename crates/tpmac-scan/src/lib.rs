//! # TPMAC Scan
//!
//! 双缓冲轨迹流送。控制器从驻留缓冲执行运动程序，宿主机持续把
//! 下一段点数据写进它没在读的那一半，扫描长度因此不受板载容量
//! 限制。
//!
//! 核心是 [`BufferStreamer`] 状态机：两个缓冲先行填满、启动程序，
//! 然后以有界间隔轮询状态，在观察到缓冲翻转时从 [`PointSource`]
//! 拉取下一段并回填空闲缓冲。实时约束是宿主机必须赶在控制器耗尽
//! 新活动缓冲之前完成回填。

pub mod config;
pub mod source;
pub mod streamer;

pub use config::{ConfigError, ScanConfig};
pub use source::{CircularSource, OneShotSource, PointSource};
pub use streamer::{poll_interval_for, BufferStreamer, ScanOptions, ScanOutcome};

use thiserror::Error;
use tpmac_client::ClientError;

/// 扫描层错误类型
///
/// 控制器上报的程序故障不在此列：它是状态机的合法终态
/// [`ScanOutcome::Faulted`]，以数据形式交给调用方。
#[derive(Error, Debug)]
pub enum ScanError {
    /// 客户端/传输错误；运行中回填失败必须停环，不能静默跳过
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Operation requires scan state {required}, but scan is {state}")]
    InvalidState {
        state: &'static str,
        required: &'static str,
    },

    #[error("Point source yielded an empty slice")]
    EmptySlice,
}
