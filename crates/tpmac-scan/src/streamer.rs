//! 双缓冲流送状态机
//!
//! ```text
//! Idle ──prime()──► Primed ──start()──► Running ──► Complete | Aborted | Faulted
//! ```
//!
//! Running 循环是同步阻塞的「睡一个有界间隔 → 轮询状态 → 条件回填」。
//! 控制器翻转活动缓冲后，宿主机必须严格赶在它需要下一缓冲之前把
//! 空闲缓冲填好，且绝不写控制器正在读的那一半。取消是协作式的：
//! 中止请求是轮询间隙发出的普通命令，退出条件在下一次轮询观察到。

use crate::{PointSource, ScanError};
use std::time::Duration;
use tpmac_client::{BufferId, ControllerClient, ScanStatus, StatusSnapshot};
use tpmac_comm::Carrier;
use tpmac_protocol::vars;
use tracing::{debug, info, warn};

/// 扫描参数
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 运动程序号
    pub program: u16,
    /// 坐标系号
    pub cs: u8,
    /// 状态轮询间隔；None 时用 [`poll_interval_for`] 自行推导
    pub poll_interval: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            program: 1,
            cs: 1,
            poll_interval: None,
        }
    }
}

/// 由每点移动时间与缓冲长度推导轮询间隔
///
/// 一个缓冲的播放时长是 `ticks/4 毫秒 × buffer_length`；取其四分之
/// 一作为间隔，保证翻转后至少还剩大半个缓冲的时间完成回填。
/// 钳位在 [10ms, 1s]。
pub fn poll_interval_for(move_time_ticks: u32, buffer_length: u32) -> Duration {
    let playback_ms = u64::from(move_time_ticks) * u64::from(buffer_length) / 4;
    Duration::from_millis((playback_ms / 4).clamp(10, 1000))
}

/// 扫描终态
///
/// 控制器上报的故障码按数据呈现（[`ScanOutcome::Faulted`]），
/// 不是 Rust 错误：它是状态机的合法出口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// 点源走完、程序自然结束
    Complete { total_points: u64 },
    /// 中止确认：状态离开运行且中止标志已置位
    Aborted { total_points: u64 },
    /// 程序故障（如请求轴数越界、零移动时间）
    Faulted { code: u16 },
}

/// 状态机所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Primed,
    Running,
    Finished,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Primed => "Primed",
            Stage::Running => "Running",
            Stage::Finished => "Finished",
        }
    }
}

/// 双缓冲流送器
///
/// 独占客户端（及其连接）直到扫描结束；[`into_client`](Self::into_client)
/// 归还所有权。
pub struct BufferStreamer<C: Carrier, S: PointSource> {
    client: ControllerClient<C>,
    source: S,
    options: ScanOptions,
    stage: Stage,
    /// 宿主机最近写入的缓冲
    prev_buffer_write: BufferId,
    /// 是否已观察到程序进入运行态
    seen_active: bool,
    /// 点源耗尽后是否已把空闲缓冲水位清零
    drained: bool,
}

impl<C: Carrier, S: PointSource> BufferStreamer<C, S> {
    pub fn new(client: ControllerClient<C>, source: S, options: ScanOptions) -> Self {
        Self {
            client,
            source,
            options,
            stage: Stage::Idle,
            prev_buffer_write: BufferId::A,
            seen_active: false,
            drained: false,
        }
    }

    /// 启动前把两个缓冲填满
    ///
    /// 第一段进当前缓冲；点源还有余量时第二段进空闲缓冲，否则空闲
    /// 水位清零，程序会在第一缓冲走完后自然结束。
    pub fn prime(&mut self) -> Result<(), ScanError> {
        self.require(Stage::Idle, "prime")?;

        let snapshot = self.client.update_status()?;
        let current = snapshot.current_buffer;
        let capacity = self.client.buffer_length() as usize;

        let first = self.source.next_slice(capacity);
        if first.is_empty() {
            return Err(ScanError::EmptySlice);
        }
        self.client.fill_current_buffer(&first)?;
        self.client.set_current_buffer_fill(first.len() as u32)?;
        self.prev_buffer_write = current;

        if self.source.is_exhausted() {
            self.client.set_idle_buffer_fill(0)?;
            self.drained = true;
        } else {
            let second = self.source.next_slice(capacity);
            self.client.fill_idle_buffer(&second)?;
            self.client.set_idle_buffer_fill(second.len() as u32)?;
            self.prev_buffer_write = current.other();
        }

        info!(
            first_fill = first.len(),
            buffer = ?current,
            "buffers primed"
        );
        self.stage = Stage::Primed;
        Ok(())
    }

    /// 启动运动程序
    ///
    /// 控制器从此按自身时钟消费当前缓冲，与宿主机无关。
    pub fn start(&mut self) -> Result<(), ScanError> {
        self.require(Stage::Primed, "start")?;
        self.client
            .run_motion_program(self.options.program, self.options.cs)?;
        self.stage = Stage::Running;
        Ok(())
    }

    /// 轮询一次：更新状态，必要时回填空闲缓冲
    ///
    /// 返回 `Some(outcome)` 表示扫描已进入终态。回填失败立即向上
    /// 传播：错过回填窗口会写坏轨迹，绝不静默跳过一轮。
    pub fn poll_once(&mut self) -> Result<Option<ScanOutcome>, ScanError> {
        self.require(Stage::Running, "poll_once")?;

        let snapshot = self.client.update_status()?;

        match snapshot.status {
            ScanStatus::Active => {
                self.seen_active = true;
                self.refill_if_flipped(&snapshot)?;
                Ok(None)
            }
            ScanStatus::Initialised if !self.seen_active => {
                // 程序还没转起来，继续等
                Ok(None)
            }
            ScanStatus::Error => {
                warn!(code = snapshot.error, "controller reported a fault");
                self.stage = Stage::Finished;
                Ok(Some(ScanOutcome::Faulted {
                    code: snapshot.error,
                }))
            }
            _ => {
                self.stage = Stage::Finished;
                let aborted = self.read_abort_flag()?;
                let outcome = if snapshot.error != 0 {
                    ScanOutcome::Faulted {
                        code: snapshot.error,
                    }
                } else if aborted {
                    ScanOutcome::Aborted {
                        total_points: snapshot.total_points,
                    }
                } else {
                    ScanOutcome::Complete {
                        total_points: snapshot.total_points,
                    }
                };
                info!(?outcome, "scan finished");
                Ok(Some(outcome))
            }
        }
    }

    /// 缓冲翻转后回填空闲缓冲
    ///
    /// 控制器进入宿主机最近写过的缓冲，说明另一半已被消费、
    /// 可以安全重写。写入永远落在 `current` 的另一半。
    fn refill_if_flipped(&mut self, snapshot: &StatusSnapshot) -> Result<(), ScanError> {
        if snapshot.current_buffer != self.prev_buffer_write {
            return Ok(());
        }

        if self.source.is_exhausted() {
            if !self.drained {
                // 点源走完：空闲水位清零，当前缓冲走完即结束
                self.client.set_idle_buffer_fill(0)?;
                self.drained = true;
                debug!("point source exhausted; idle buffer drained");
            }
            return Ok(());
        }

        let capacity = self.client.buffer_length() as usize;
        let slice = self.source.next_slice(capacity);
        self.client.fill_idle_buffer(&slice)?;
        self.client.set_idle_buffer_fill(slice.len() as u32)?;
        self.prev_buffer_write = snapshot.current_buffer.other();
        debug!(
            fill = slice.len(),
            buffer = ?self.prev_buffer_write,
            index = snapshot.current_index,
            total = snapshot.total_points,
            "idle buffer refilled"
        );
        Ok(())
    }

    /// 请求协作式中止
    ///
    /// 置中止变量；程序停止在之后的轮询里确认。
    pub fn request_abort(&mut self) -> Result<(), ScanError> {
        info!("abort requested");
        self.client.set_abort()?;
        Ok(())
    }

    /// 轮询到终态为止
    pub fn run_to_completion(&mut self) -> Result<ScanOutcome, ScanError> {
        self.run_until(|| false)
    }

    /// 轮询到终态为止，每轮之前询问是否要求中止
    ///
    /// 间隔睡眠用 spin_sleep 保持轮询节拍精度。
    pub fn run_until(
        &mut self,
        mut abort_requested: impl FnMut() -> bool,
    ) -> Result<ScanOutcome, ScanError> {
        let interval = self.options.poll_interval.unwrap_or_else(|| {
            // 没给间隔也没有移动时间可查时的保守缺省
            Duration::from_millis(250)
        });

        let mut abort_sent = false;
        loop {
            spin_sleep::sleep(interval);
            if !abort_sent && abort_requested() {
                self.request_abort()?;
                abort_sent = true;
            }
            if let Some(outcome) = self.poll_once()? {
                return Ok(outcome);
            }
        }
    }

    /// 交还客户端
    pub fn into_client(self) -> ControllerClient<C> {
        self.client
    }

    fn read_abort_flag(&self) -> Result<bool, ScanError> {
        Ok(self.client.read_variable(vars::VAR_ABORT)? == "1")
    }

    fn require(&self, required: Stage, operation: &'static str) -> Result<(), ScanError> {
        if self.stage != required {
            debug!(operation, stage = self.stage.name(), "invalid stage");
            return Err(ScanError::InvalidState {
                state: self.stage.name(),
                required: required.name(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_derivation() {
        // 4000 ticks = 1000ms/点 × 50 点 = 50s 播放；间隔 = 12.5s → 钳到 1s
        assert_eq!(poll_interval_for(4000, 50), Duration::from_millis(1000));
        // 250 ticks = 62.5ms/点 × 16 点 = 1000ms；间隔 250ms
        assert_eq!(poll_interval_for(250, 16), Duration::from_millis(250));
        // 极短缓冲钳到下限
        assert_eq!(poll_interval_for(4, 4), Duration::from_millis(10));
    }
}
