//! 像素格式定义.
//!
//! 定义解码输出帧中像素的存储格式. 管线只关心解码端实际产出的几种格式:
//! 软硬件 H.264 解码器输出 YUV420P 或 NV12, 显示协作方可能要求 RGB24.

use std::fmt;

/// 像素格式
///
/// 命名规则: 颜色空间 + 排列方式 (P=Planar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定
    None,
    /// YUV 4:2:0 平面格式, 8 位 (H.264 解码默认输出)
    Yuv420p,
    /// NV12: Y 平面 + UV 交错, 4:2:0, 8 位 (硬件解码常用)
    Nv12,
    /// RGB 各 8 位, 打包 (显示端交付格式)
    Rgb24,
}

impl PixelFormat {
    /// 获取平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Yuv420p => 3,
            Self::Nv12 => 2,
            Self::Rgb24 => 1,
        }
    }

    /// 获取色度子采样 (log2 水平, log2 垂直)
    ///
    /// 例如 YUV420 返回 (1, 1), 表示色度分辨率为亮度的 1/2 x 1/2.
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Nv12 => (1, 1),
            _ => (0, 0),
        }
    }

    /// 计算指定平面的 (宽, 高)
    pub const fn plane_dimensions(&self, plane: u32, width: u32, height: u32) -> (u32, u32) {
        let (sub_x, sub_y) = self.chroma_subsampling();
        match (self, plane) {
            (Self::Yuv420p, 1 | 2) => (width >> sub_x, height >> sub_y),
            // NV12 的 UV 平面交错存储, 每行字节数与亮度相同
            (Self::Nv12, 1) => (width, height >> sub_y),
            _ => (width, height),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Nv12 => "nv12",
            Self::Rgb24 => "rgb24",
        };
        write!(f, "{name}")
    }
}
