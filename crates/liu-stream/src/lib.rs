//! # liu-stream
//!
//! Liu 流媒体管线传输层: 拥有 TCP 套接字生命周期、从字节流中
//! 增量重组 NAL 单元, 并把接收、分帧、配置、解码、交付装配成
//! 一条跨线程的完整管线.
//!
//! 数据流: 接收器 → 分帧器 → 参数集缓存 / 会话管理器 → 解码引擎 → 帧接收端.

pub mod framer;
pub mod pipeline;
pub mod receiver;

// 重导出常用类型
pub use framer::AnnexBFramer;
pub use pipeline::{PipelineStats, StreamConfig, StreamPipeline};
pub use receiver::{ConnectionEvent, TcpReceiver};
