//! 空解码引擎.
//!
//! 不执行真正的 H.264 解码: 校验长度前缀、按 NAL 类型分类,
//! 对每个 VCL 单元合成一帧中性灰的 YUV420P 图像 (尺寸取自 SPS).
//! 用于端到端测试和无真实解码器环境下的码流诊断 —
//! 管线的分帧、配置、提交、交付路径全部真实走通.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

use liu_core::{LiuError, LiuResult, PixelFormat};

use crate::engine::{DecodeEngine, DecodeSession, FrameCallback, SessionConfig};
use crate::frame::VideoFrame;
use crate::nal::NalUnitType;

/// 合成帧的填充值 (YUV 中性灰)
const GRAY_LUMA: u8 = 0x80;

/// 空解码引擎
pub struct NullEngine;

impl NullEngine {
    /// 创建空引擎实例 (工厂函数)
    pub fn create() -> LiuResult<Box<dyn DecodeEngine>> {
        Ok(Box::new(Self))
    }
}

impl DecodeEngine for NullEngine {
    fn name(&self) -> &str {
        "null"
    }

    fn open_session(
        &mut self,
        config: &SessionConfig,
        on_frame: FrameCallback,
    ) -> LiuResult<Box<dyn DecodeSession>> {
        if config.nal_length_size != 4 {
            return Err(LiuError::Unsupported(format!(
                "null 引擎只支持 4 字节长度前缀, 请求值={}",
                config.nal_length_size
            )));
        }

        debug!(
            "null 引擎会话创建: {}x{}, profile={}, level={}",
            config.sps_info.width,
            config.sps_info.height,
            config.sps_info.profile_idc,
            config.sps_info.level_idc
        );

        Ok(Box::new(NullSession {
            width: config.sps_info.width,
            height: config.sps_info.height,
            on_frame,
            next_pts: 0,
            alive: true,
        }))
    }
}

/// 空引擎解码会话
struct NullSession {
    width: u32,
    height: u32,
    on_frame: FrameCallback,
    /// 下一帧的提交序号
    next_pts: i64,
    /// 会话存活标志, invalidate 后提交被拒绝
    alive: bool,
}

impl DecodeSession for NullSession {
    fn submit(&mut self, data: &[u8]) -> LiuResult<()> {
        if !self.alive {
            return Err(LiuError::Codec("会话已失效".into()));
        }

        // 校验长度前缀与载荷一致
        if data.len() < 4 {
            return Err(LiuError::InvalidData(format!(
                "长度前缀不完整, 收到 {} 字节",
                data.len()
            )));
        }
        let declared = BigEndian::read_u32(&data[..4]) as usize;
        let payload = &data[4..];
        if declared != payload.len() {
            return Err(LiuError::InvalidData(format!(
                "长度前缀与载荷不一致, declared={}, actual={}",
                declared,
                payload.len()
            )));
        }
        if payload.is_empty() {
            return Err(LiuError::InvalidData("NAL 载荷为空".into()));
        }

        let nal_type = NalUnitType::from_type_id(payload[0] & 0x1F);
        trace!("null 引擎收到 {} ({} 字节)", nal_type, payload.len());

        // 非 VCL 单元 (参数集、SEI 等) 不产出帧
        if !nal_type.is_vcl() {
            return Ok(());
        }

        let mut frame =
            VideoFrame::allocate(self.width, self.height, PixelFormat::Yuv420p, GRAY_LUMA);
        frame.pts = self.next_pts;
        self.next_pts += 1;
        frame.is_keyframe = nal_type.is_idr();
        (self.on_frame)(Ok(frame));
        Ok(())
    }

    fn invalidate(&mut self) {
        if self.alive {
            self.alive = false;
            debug!("null 引擎会话已失效");
        }
    }
}
