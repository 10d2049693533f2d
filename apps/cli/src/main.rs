//! # TPMAC CLI
//!
//! 轨迹扫描命令行工具（薄消费层：只调公开 API）。
//!
//! ```bash
//! # 查询控制器状态
//! tpmac-cli --config scan.toml status
//!
//! # 流送一条线性爬坡轨迹；Ctrl-C 协作式中止
//! tpmac-cli --config scan.toml run --points 50 --move-time 4000 --axis x
//!
//! # 请求中止正在运行的扫描
//! tpmac-cli --config scan.toml abort
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tpmac_client::{ControllerClient, Trajectory};
use tpmac_comm::EthernetCarrier;
use tpmac_protocol::{AxisKey, MotorAssignment, TimePoint};
use tpmac_scan::{
    poll_interval_for, BufferStreamer, CircularSource, OneShotSource, ScanConfig, ScanOutcome,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// TPMAC CLI - 轨迹扫描命令行工具
#[derive(Parser, Debug)]
#[command(name = "tpmac-cli")]
#[command(about = "Command-line interface for Turbo PMAC trajectory scans", long_about = None)]
#[command(version)]
struct Cli {
    /// 扫描配置文件（TOML）
    #[arg(short, long, default_value = "scan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 查询状态变量
    Status,

    /// 请求协作式中止并等待确认
    Abort,

    /// 流送一条线性爬坡轨迹
    Run {
        /// 点数
        #[arg(long, default_value_t = 50)]
        points: usize,

        /// 每点移动时间（1/4 毫秒计数）
        #[arg(long, default_value_t = 4000)]
        move_time: u32,

        /// 运动轴字母
        #[arg(long, default_value_t = 'x')]
        axis: char,

        /// 每点步进（EGU）
        #[arg(long, default_value_t = 1.0)]
        step: f64,

        /// 电机号
        #[arg(long, default_value_t = 1)]
        motor: u8,

        /// 环形重放（直到 Ctrl-C），否则走完一遍结束
        #[arg(long)]
        circular: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ScanConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Status => status(&config),
        Commands::Abort => abort(&config),
        Commands::Run {
            points,
            move_time,
            axis,
            step,
            motor,
            circular,
        } => run(&config, points, move_time, axis, step, motor, circular),
    }
}

fn connect(config: &ScanConfig) -> Result<ControllerClient<EthernetCarrier>> {
    config
        .builder()
        .connect()
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))
}

fn status(config: &ScanConfig) -> Result<()> {
    let mut client = connect(config)?;
    let snapshot = client.update_status()?;

    println!(
        "Status: {:?} - Buffer: {:?} - Index: {} - Total Points: {} - Error: {}",
        snapshot.status,
        snapshot.current_buffer,
        snapshot.current_index,
        snapshot.total_points,
        snapshot.error,
    );
    Ok(())
}

fn abort(config: &ScanConfig) -> Result<()> {
    let mut client = connect(config)?;
    client.set_abort()?;

    // 停止在之后的轮询里确认
    for _ in 0..10 {
        std::thread::sleep(config.timeout() / 10);
        let snapshot = client.update_status()?;
        if snapshot.status != tpmac_client::ScanStatus::Active {
            println!("Scan stopped, status {:?}", snapshot.status);
            return Ok(());
        }
    }
    bail!("controller still reports an active scan after abort request");
}

#[allow(clippy::too_many_arguments)]
fn run(
    config: &ScanConfig,
    points: usize,
    move_time: u32,
    axis: char,
    step: f64,
    motor: u8,
    circular: bool,
) -> Result<()> {
    let axis = AxisKey::from_letter(axis)
        .with_context(|| format!("{axis:?} is not a motion axis letter"))?;

    let mut client = connect(config)?;
    let cs = config.coordinate_system;

    client.assign_motors(cs, &[MotorAssignment::new(motor, axis, 1.0)])?;
    client.set_axes(&[axis])?;
    client.read_cs_max_velocities(cs)?;

    let mut trajectory = Trajectory::new();
    trajectory.time = vec![TimePoint::new(move_time); points];
    trajectory.set_axis(axis, (0..points).map(|i| i as f64 * step).collect())?;
    if let Some(cs_entry) = client.coordinate_system(cs) {
        trajectory.check_max_velocity(cs_entry)?;
    }
    let point_set = trajectory.format()?;

    let mut options = config.scan_options();
    if options.poll_interval.is_none() {
        options.poll_interval = Some(poll_interval_for(move_time, client.buffer_length()));
    }
    info!(?options, points, "starting trajectory scan");

    // Ctrl-C 只请求协作式中止，不打断在途交换
    let (abort_tx, abort_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = abort_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let outcome = if circular {
        let mut streamer =
            BufferStreamer::new(client, CircularSource::new(point_set), options);
        streamer.prime()?;
        streamer.start()?;
        streamer.run_until(|| abort_rx.try_recv().is_ok())?
    } else {
        let mut streamer =
            BufferStreamer::new(client, OneShotSource::new(point_set), options);
        streamer.prime()?;
        streamer.start()?;
        streamer.run_until(|| abort_rx.try_recv().is_ok())?
    };

    match outcome {
        ScanOutcome::Complete { total_points } => {
            println!("Scan complete - Total Points: {total_points}");
            Ok(())
        }
        ScanOutcome::Aborted { total_points } => {
            println!("Scan aborted - Total Points: {total_points}");
            Ok(())
        }
        ScanOutcome::Faulted { code } => {
            bail!("controller reported fault code {code}");
        }
    }
}
