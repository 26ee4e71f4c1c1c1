//! # liu-recv
//!
//! Liu 流接收器: 连接 H.264 TCP 流服务端, 运行完整的
//! 接收-分帧-配置-解码-交付管线.
//!
//! 支持:
//! - 可插拔解码引擎 (内置 null 引擎用于无解码器环境下的码流诊断)
//! - 连接状态与管线计数器实时日志
//! - 解码帧原始平面数据落盘 (`--dump`)
//! - 机器可读的 JSON 统计汇总 (`--json`)

mod logging;

use std::fs::File;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use liu_codec::EngineRegistry;
use liu_stream::{ConnectionEvent, StreamConfig, StreamPipeline};

/// Liu 流接收器
#[derive(Parser, Debug)]
#[command(name = "liu-recv", version, about = "H.264 TCP 流接收与解码工具")]
struct Cli {
    /// 流服务端主机
    host: String,

    /// 流服务端端口
    port: u16,

    /// 解码引擎名称
    #[arg(long, default_value = "null")]
    engine: String,

    /// 参数集变化时重建解码会话 (默认每个连接只配置一次)
    #[arg(long)]
    reconfigure: bool,

    /// 接收时长 (秒, 0 表示直到流结束)
    #[arg(long, default_value_t = 0)]
    duration: u64,

    /// 把解码帧的原始平面数据依次追加写入文件
    #[arg(long)]
    dump: Option<String>,

    /// 以 JSON 格式输出最终统计
    #[arg(long)]
    json: bool,

    /// 日志详细程度 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 最终统计汇总 (JSON 输出)
#[derive(Serialize)]
struct ReceiveReport<'a> {
    host: &'a str,
    port: u16,
    engine: &'a str,
    elapsed_secs: f64,
    connection_failed: bool,
    bytes_received: u64,
    chunks_received: u64,
    nal_units_framed: u64,
    nal_units_dropped: u64,
    sessions_configured: u64,
    frames_decoded: u64,
    frames_delivered: u64,
    frames_dropped: u64,
    decode_errors: u64,
}

fn main() {
    let cli = Cli::parse();
    logging::init("liu-recv", cli.verbose);

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("liu-recv: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let mut registry = EngineRegistry::new();
    liu_codec::engines::register_all(&mut registry);
    let engine = registry
        .create(&cli.engine)
        .with_context(|| format!("可用引擎: {}", registry.names().join(", ")))?;

    info!(
        "liu-recv: 目标 {}:{}, 引擎 {}",
        cli.host, cli.port, cli.engine
    );

    let mut config = StreamConfig::new(cli.host.clone(), cli.port);
    config.reconfigure_on_change = cli.reconfigure;

    let mut pipeline = StreamPipeline::start(config, engine).context("启动管线失败")?;
    let events = pipeline.take_events().context("事件通道不可用")?;
    let frames = pipeline.take_frames().context("帧通道不可用")?;

    // 事件线程: 连接状态日志 + 失败标志
    let failed = Arc::new(AtomicBool::new(false));
    let failed_flag = Arc::clone(&failed);
    let event_thread = thread::spawn(move || {
        for event in events {
            match event {
                ConnectionEvent::Connecting => info!("正在连接..."),
                ConnectionEvent::Ready => info!("连接就绪, 开始接收"),
                ConnectionEvent::Closed => info!("连接已结束"),
                ConnectionEvent::Failed(msg) => {
                    warn!("连接失败: {}", msg);
                    failed_flag.store(true, Ordering::Release);
                }
            }
        }
    });

    let mut dump_file = match &cli.dump {
        Some(path) => Some(File::create(path).with_context(|| format!("无法创建 {}", path))?),
        None => None,
    };

    let started = Instant::now();
    let deadline = (cli.duration > 0).then(|| started + Duration::from_secs(cli.duration));
    let mut last_report = Instant::now();

    // 主循环: 消费解码帧, 直到流结束 / 到达时长上限 / 连接失败
    loop {
        if failed.load(Ordering::Acquire) {
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("到达接收时长上限 ({} 秒)", cli.duration);
                break;
            }
        }

        match frames.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                if let Some(file) = dump_file.as_mut() {
                    for plane in &frame.data {
                        file.write_all(plane).context("写入帧数据失败")?;
                    }
                }
                if last_report.elapsed() >= Duration::from_secs(1) {
                    let stats = pipeline.stats();
                    info!(
                        "帧 {} ({}x{}), 已交付 {}, 已接收 {} 字节",
                        frame.pts,
                        frame.width,
                        frame.height,
                        stats.frames_delivered,
                        stats.bytes_received
                    );
                    last_report = Instant::now();
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    pipeline.stop();
    let _ = event_thread.join();

    let connection_failed = failed.load(Ordering::Acquire);
    let stats = pipeline.stats();
    let report = ReceiveReport {
        host: &cli.host,
        port: cli.port,
        engine: &cli.engine,
        elapsed_secs: started.elapsed().as_secs_f64(),
        connection_failed,
        bytes_received: stats.bytes_received,
        chunks_received: stats.chunks_received,
        nal_units_framed: stats.nal_units_framed,
        nal_units_dropped: stats.nal_units_dropped,
        sessions_configured: stats.sessions_configured,
        frames_decoded: stats.frames_decoded,
        frames_delivered: stats.frames_delivered,
        frames_dropped: stats.frames_dropped,
        decode_errors: stats.decode_errors,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            "接收结束: {} 字节 / {} 块 / {} NAL / {} 帧交付 ({} 丢弃, {} 解码失败), 用时 {:.1} 秒",
            report.bytes_received,
            report.chunks_received,
            report.nal_units_framed,
            report.frames_delivered,
            report.frames_dropped,
            report.decode_errors,
            report.elapsed_secs
        );
    }

    Ok(if connection_failed { 1 } else { 0 })
}
