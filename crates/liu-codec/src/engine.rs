//! 解码引擎抽象.
//!
//! 平台解码器 (硬件或软件) 被视为能力边界之外的协作方,
//! 以两个操作接入管线: 配置建会话、异步提交解码.
//! 任何实现了这两个 trait 的引擎都可以挂入同一条管线.
//!
//! 解码流程:
//! 1. 会话管理器以参数集构造 [`SessionConfig`], 调用 `open_session()`
//! 2. 对每个 NAL 单元调用 [`DecodeSession::submit`] (长度前缀格式)
//! 3. 引擎在其自己的完成上下文中回调 [`FrameCallback`]
//! 4. 会话被替换或拆除时显式调用 `invalidate()` — 没有隐式清理

use liu_core::LiuResult;

use crate::frame::VideoFrame;
use crate::sps::Sps;

/// 解码会话配置
///
/// 由会话管理器从缓存的参数集构建; `nal_length_size` 固定为 4,
/// 与后续长度前缀交付格式一致.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SPS 数据 (含 NAL 头部字节)
    pub sps: Vec<u8>,
    /// PPS 数据 (含 NAL 头部字节)
    pub pps: Vec<u8>,
    /// NAL 长度前缀大小 (字节)
    pub nal_length_size: usize,
    /// 从 SPS 解析出的序列信息 (引擎据此分配输出缓冲区)
    pub sps_info: Sps,
}

/// 解码输出回调
///
/// 在引擎自己的完成上下文中调用; 成功时携带解码帧,
/// 失败时携带错误 — 调用方按策略丢弃失败帧, 不中断会话.
pub type FrameCallback = Box<dyn Fn(LiuResult<VideoFrame>) + Send + Sync>;

/// 解码引擎 trait
///
/// 引擎是会话的工厂: 每次配置产生一个绑定到输出回调的新会话.
pub trait DecodeEngine: Send {
    /// 获取引擎名称
    fn name(&self) -> &str;

    /// 从参数集配置创建解码会话
    ///
    /// # 返回
    /// - `Ok(session)`: 会话就绪, 可以提交 NAL 单元
    /// - `Err(_)`: 配置失败 (参数集非法/引擎资源不足), 调用方保持
    ///   未配置状态并丢弃后续数据
    fn open_session(
        &mut self,
        config: &SessionConfig,
        on_frame: FrameCallback,
    ) -> LiuResult<Box<dyn DecodeSession>>;
}

/// 解码会话 trait
///
/// 同一时刻最多一个活动实例, 由会话管理器独占持有.
pub trait DecodeSession: Send {
    /// 提交一个长度前缀格式的 NAL 单元 (4 字节大端长度 + 数据)
    ///
    /// 提交是即发即弃的: 解码结果稍后通过创建会话时注册的回调交付,
    /// 单帧解码失败在回调处丢弃, 不影响后续帧与会话有效性.
    fn submit(&mut self, data: &[u8]) -> LiuResult<()>;

    /// 使会话失效并释放底层资源
    ///
    /// 失效后的 `submit` 调用返回错误. 会话被替换或连接拆除时
    /// 必须显式调用.
    fn invalidate(&mut self);
}
