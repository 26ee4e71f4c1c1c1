//! # liu-codec
//!
//! Liu 流媒体管线的 H.264 码流域: NAL 单元模型、参数集缓存、
//! 解码引擎抽象与解码会话管理.
//!
//! 本 crate 不实现完整的 H.264 解码 — 真正的解码由实现
//! [`engine::DecodeEngine`] 的软硬件引擎完成, 这里只做码流分类、
//! 参数集提取和会话生命周期管理.

pub mod engine;
pub mod engines;
pub mod frame;
pub mod nal;
pub mod parameter_sets;
pub mod session;
pub mod sps;

// 重导出常用类型
pub use engine::{DecodeEngine, DecodeSession, FrameCallback, SessionConfig};
pub use engines::EngineRegistry;
pub use frame::VideoFrame;
pub use nal::{NalUnit, NalUnitType};
pub use parameter_sets::ParameterSetCache;
pub use session::DecodeSessionManager;
