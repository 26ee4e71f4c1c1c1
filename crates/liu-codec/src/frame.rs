//! 解码后的帧数据 (Frame).
//!
//! 表示解码会话产出的原始视频帧, 所有权在送入帧接收端时转移.

use liu_core::PixelFormat;

/// 视频帧
///
/// 包含解码后的原始像素数据, 支持多平面存储.
/// 例如 YUV420P 格式有 3 个平面: Y, U, V.
///
/// `pts` 为会话内单调递增的提交序号 — 管线端到端保序,
/// 接收方不应对交付线程做任何假设, 只依赖序号的单调性.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 提交序号 (会话内单调递增)
    pub pts: i64,
    /// 是否为关键帧
    pub is_keyframe: bool,
}

impl VideoFrame {
    /// 创建空的视频帧
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let plane_count = pixel_format.plane_count() as usize;
        Self {
            data: vec![Vec::new(); plane_count],
            linesize: vec![0; plane_count],
            width,
            height,
            pixel_format,
            pts: 0,
            is_keyframe: false,
        }
    }

    /// 按格式和尺寸分配所有平面, 以 `fill` 填充
    pub fn allocate(width: u32, height: u32, pixel_format: PixelFormat, fill: u8) -> Self {
        let mut frame = Self::new(width, height, pixel_format);
        for plane in 0..pixel_format.plane_count() {
            let (w, h) = pixel_format.plane_dimensions(plane, width, height);
            frame.linesize[plane as usize] = w as usize;
            frame.data[plane as usize] = vec![fill; (w * h) as usize];
        }
        frame
    }
}
