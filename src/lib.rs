//! # Liu (流)
//!
//! 纯 Rust 实现的 H.264 实时流接收与解码管线.
//!
//! Liu 从 TCP 套接字上摄取 Annex B H.264 裸流, 增量重组 NAL 单元,
//! 用流内参数集引导解码会话, 并按序交付解码帧:
//! - **接收**: 套接字生命周期与有界读循环, 连接状态对外可观察
//! - **分帧**: 起始码定位与跨块单元重组, 块边界不影响输出
//! - **配置**: SPS/PPS 缓存与解码会话生命周期管理
//! - **解码**: 长度前缀交付给可插拔的软硬件解码引擎
//! - **交付**: 有界通道按提交顺序把帧交给显示协作方
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use liu::stream::{StreamConfig, StreamPipeline};
//!
//! let registry = liu::default_engine_registry();
//! let engine = registry.create("null").unwrap();
//! let mut pipeline = StreamPipeline::start(StreamConfig::new("192.168.1.10", 5000), engine).unwrap();
//! let frames = pipeline.take_frames().unwrap();
//! while let Ok(frame) = frames.recv() {
//!     println!("帧 {} ({}x{})", frame.pts, frame.width, frame.height);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 核心类型与工具 |
//! | `liu-codec` | H.264 码流域与解码引擎抽象 |
//! | `liu-stream` | TCP 接收、分帧与管线装配 |

/// 核心类型与工具
pub use liu_core as core;

/// H.264 码流域与解码引擎抽象
pub use liu_codec as codec;

/// TCP 接收、分帧与管线装配
pub use liu_stream as stream;

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码引擎的注册表
pub fn default_engine_registry() -> liu_codec::EngineRegistry {
    let mut registry = liu_codec::EngineRegistry::new();
    liu_codec::engines::register_all(&mut registry);
    registry
}
