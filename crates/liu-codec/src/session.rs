//! 解码会话管理.
//!
//! 持有唯一的活动解码会话: 从缓存的参数集构建配置并创建会话,
//! 参数集变化时重建, 连接拆除时显式失效释放.
//! 会话缺失或重建期间提交的 NAL 单元被丢弃 (计数, 不排队).

use log::{debug, warn};

use liu_core::{LiuError, LiuResult};

use crate::engine::{DecodeEngine, DecodeSession, FrameCallback, SessionConfig};
use crate::nal::NalUnit;
use crate::sps::parse_sps;

/// 后续长度前缀交付使用的 NAL 头部长度 (字节)
const NAL_LENGTH_SIZE: usize = 4;

/// 解码会话管理器
///
/// 不变式: 同一时刻最多一个活动会话; 会话缺失时 [`decode`] 不向
/// 引擎提交任何数据.
///
/// [`decode`]: DecodeSessionManager::decode
pub struct DecodeSessionManager {
    /// 解码引擎 (会话工厂)
    engine: Box<dyn DecodeEngine>,
    /// 当前活动会话
    session: Option<Box<dyn DecodeSession>>,
    /// 会话缺失期间丢弃的 NAL 单元数
    dropped: u64,
    /// 提交失败的 NAL 单元数
    submit_errors: u64,
}

impl DecodeSessionManager {
    /// 以指定引擎创建管理器
    pub fn new(engine: Box<dyn DecodeEngine>) -> Self {
        Self {
            engine,
            session: None,
            dropped: 0,
            submit_errors: 0,
        }
    }

    /// 从参数集构建配置并创建解码会话
    ///
    /// 已有会话会先被失效释放 (重配置路径). 配置失败时管理器回到
    /// 无会话状态, 后续 NAL 单元被丢弃, 直到下一次成功配置.
    pub fn configure(
        &mut self,
        sps: &[u8],
        pps: &[u8],
        on_frame: FrameCallback,
    ) -> LiuResult<()> {
        if sps.is_empty() || pps.is_empty() {
            return Err(LiuError::InvalidArgument(
                "配置解码会话需要非空的 SPS 和 PPS".into(),
            ));
        }

        // 被取代的会话显式失效 — 没有隐式清理
        self.invalidate();

        // 从 SPS 提取序列信息 (引擎据此确定输出尺寸)
        let rbsp = crate::nal::remove_emulation_prevention(&sps[1..]);
        let sps_info = parse_sps(&rbsp)?;

        let config = SessionConfig {
            sps: sps.to_vec(),
            pps: pps.to_vec(),
            nal_length_size: NAL_LENGTH_SIZE,
            sps_info,
        };

        let session = self.engine.open_session(&config, on_frame)?;
        debug!(
            "解码会话已配置: engine={}, {}x{}, sps={} 字节, pps={} 字节",
            self.engine.name(),
            config.sps_info.width,
            config.sps_info.height,
            sps.len(),
            pps.len()
        );
        self.session = Some(session);
        Ok(())
    }

    /// 提交一个 NAL 单元解码
    ///
    /// 无活动会话时为可诊断的空操作: 计数并在首次丢弃时告警.
    /// 提交本身即发即弃, 解码结果经配置时注册的回调异步交付.
    pub fn decode(&mut self, nal: &NalUnit) {
        let Some(session) = self.session.as_mut() else {
            self.dropped += 1;
            if self.dropped == 1 {
                warn!("解码会话未就绪, 开始丢弃 NAL 单元");
            }
            return;
        };

        if let Err(e) = session.submit(&nal.to_length_prefixed()) {
            // 单次提交失败不拆除会话; 后续独立帧可自行恢复
            self.submit_errors += 1;
            debug!("NAL 提交失败 ({}): {}", nal.nal_type, e);
        }
    }

    /// 是否存在活动会话
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// 会话缺失期间丢弃的 NAL 单元数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 提交失败的 NAL 单元数
    pub fn submit_errors(&self) -> u64 {
        self.submit_errors
    }

    /// 失效并释放当前会话 (若存在)
    pub fn invalidate(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            debug!("解码会话已失效释放");
        }
    }
}

impl Drop for DecodeSessionManager {
    fn drop(&mut self) {
        self.invalidate();
    }
}
