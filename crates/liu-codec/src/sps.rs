//! H.264 SPS (Sequence Parameter Set) 最小化解析.
//!
//! 管线只需要从 SPS 中得到编码规格与图像尺寸, 供解码会话配置与
//! 输出缓冲区分配使用; 尺寸字段之后的语法 (POC、VUI 等) 没有消费方,
//! 一律不解析.
//!
//! # Exp-Golomb 编码
//!
//! SPS 中大量使用 Exp-Golomb 可变长编码:
//! - `ue(v)`: 无符号 Exp-Golomb
//! - `se(v)`: 有符号 Exp-Golomb

use liu_core::bitreader::BitReader;
use liu_core::{LiuError, LiuResult};

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct Sps {
    /// profile_idc (编码规格, 如 66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set 标志位
    pub constraint_set_flags: u8,
    /// level_idc (编码级别, 如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// SPS ID (seq_parameter_set_id)
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
}

/// 从 RBSP 数据解析 SPS (仅到尺寸字段)
pub fn parse_sps(rbsp: &[u8]) -> LiuResult<Sps> {
    if rbsp.len() < 3 {
        return Err(LiuError::InvalidData("H.264: SPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(rbsp);

    // profile_idc (8 bits)
    let profile_idc = br.read_bits(8)? as u8;
    // constraint_set flags (8 bits)
    let constraint_set_flags = br.read_bits(8)? as u8;
    // level_idc (8 bits)
    let level_idc = br.read_bits(8)? as u8;
    // seq_parameter_set_id
    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(LiuError::InvalidData(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane_flag = false;

    // High profile 及以上有额外字段
    if is_high_profile(profile_idc) {
        chroma_format_idc = read_ue(&mut br)?;
        if chroma_format_idc > 3 {
            return Err(LiuError::InvalidData(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = br.read_bit()? == 1;
        }
        let bit_depth_luma = read_ue(&mut br)? + 8;
        let bit_depth_chroma = read_ue(&mut br)? + 8;
        if !(8..=14).contains(&bit_depth_luma) {
            return Err(LiuError::InvalidData(format!(
                "H.264: bit_depth_luma 非法, value={}",
                bit_depth_luma
            )));
        }
        if !(8..=14).contains(&bit_depth_chroma) {
            return Err(LiuError::InvalidData(format!(
                "H.264: bit_depth_chroma 非法, value={}",
                bit_depth_chroma
            )));
        }
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        // seq_scaling_matrix_present_flag: 矩阵内容无消费方, 仅跳过
        let scaling_present = br.read_bit()?;
        if scaling_present == 1 {
            let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..list_count {
                let present = br.read_bit()?;
                if present == 1 {
                    skip_scaling_list(&mut br, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    // log2_max_frame_num_minus4
    let log2_max_frame_num_minus4 = read_ue(&mut br)?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(LiuError::InvalidData(format!(
            "H.264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }

    // pic_order_cnt_type
    let poc_type = read_ue(&mut br)?;
    if poc_type > 2 {
        return Err(LiuError::InvalidData(format!(
            "H.264: pic_order_cnt_type 非法, value={}",
            poc_type
        )));
    }
    match poc_type {
        0 => {
            let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(LiuError::InvalidData(format!(
                    "H.264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
        }
        1 => {
            br.skip_bits(1)?; // delta_pic_order_always_zero_flag
            read_se(&mut br)?; // offset_for_non_ref_pic
            read_se(&mut br)?; // offset_for_top_to_bottom_field
            let num_ref_in_poc = read_ue(&mut br)?;
            if num_ref_in_poc > 255 {
                return Err(LiuError::InvalidData(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_in_poc
                )));
            }
            for _ in 0..num_ref_in_poc {
                read_se(&mut br)?; // offset_for_ref_frame
            }
        }
        _ => {} // poc_type == 2: 无额外字段
    }

    let max_num_ref_frames = read_ue(&mut br)?;
    if max_num_ref_frames > 16 {
        return Err(LiuError::InvalidData(format!(
            "H.264: max_num_ref_frames 超出范围, value={}",
            max_num_ref_frames
        )));
    }
    br.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    // 图像尺寸 (宏块单位)
    let pic_width_in_mbs = read_ue(&mut br)? + 1;
    let pic_height_in_map_units = read_ue(&mut br)? + 1;

    // frame_mbs_only_flag
    let frame_mbs_only = br.read_bit()? == 1;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }

    // direct_8x8_inference_flag
    br.skip_bits(1)?;

    // Cropping
    let mut crop_left = 0u32;
    let mut crop_right = 0u32;
    let mut crop_top = 0u32;
    let mut crop_bottom = 0u32;

    let cropping_flag = br.read_bit()?;
    if cropping_flag == 1 {
        crop_left = read_ue(&mut br)?;
        crop_right = read_ue(&mut br)?;
        crop_top = read_ue(&mut br)?;
        crop_bottom = read_ue(&mut br)?;
    }

    // 计算像素尺寸
    let chroma_array_type = if separate_colour_plane_flag {
        0
    } else {
        chroma_format_idc
    };
    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = pic_width_in_mbs
        .checked_mul(16)
        .ok_or_else(|| LiuError::InvalidData("H.264: 计算宽度时发生溢出".into()))?;
    let frame_height_in_mbs = pic_height_in_map_units
        .checked_mul(if frame_mbs_only { 1 } else { 2 })
        .ok_or_else(|| LiuError::InvalidData("H.264: 计算高度时发生溢出".into()))?;
    let raw_height = frame_height_in_mbs
        .checked_mul(16)
        .ok_or_else(|| LiuError::InvalidData("H.264: 计算高度时发生溢出".into()))?;
    let crop_x = crop_left
        .checked_add(crop_right)
        .and_then(|v| v.checked_mul(crop_unit_x))
        .ok_or_else(|| LiuError::InvalidData("H.264: 计算水平裁剪时发生溢出".into()))?;
    let crop_y = crop_top
        .checked_add(crop_bottom)
        .and_then(|v| v.checked_mul(crop_unit_y))
        .ok_or_else(|| LiuError::InvalidData("H.264: 计算垂直裁剪时发生溢出".into()))?;
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(LiuError::InvalidData(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    let width = raw_width - crop_x;
    let height = raw_height - crop_y;
    if width == 0 || height == 0 {
        return Err(LiuError::InvalidData(format!(
            "H.264: 图像尺寸非法, width={}, height={}",
            width, height
        )));
    }

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        width,
        height,
        frame_mbs_only,
    })
}

// ============================================================
// Exp-Golomb 编码读取
// ============================================================

/// 读取无符号 Exp-Golomb 编码值 ue(v)
fn read_ue(br: &mut BitReader) -> LiuResult<u32> {
    let mut leading_zeros = 0u32;
    loop {
        let bit = br.read_bit()?;
        if bit == 1 {
            break;
        }
        leading_zeros += 1;
        if leading_zeros > 31 {
            return Err(LiuError::InvalidData("H.264: Exp-Golomb 前导零过多".into()));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }

    let suffix = br.read_bits(leading_zeros)?;
    Ok((1 << leading_zeros) - 1 + suffix)
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
fn read_se(br: &mut BitReader) -> LiuResult<i32> {
    let code = read_ue(br)?;
    // 映射: 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
    let value = code.div_ceil(2) as i32;
    if code & 1 == 0 { Ok(-value) } else { Ok(value) }
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为 High Profile 或更高
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

/// 跳过一组量化矩阵系数 (delta_scale 链)
fn skip_scaling_list(br: &mut BitReader, size: u32) -> LiuResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = read_se(br)?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// 获取 cropping 单位
fn cropping_unit(chroma_format_idc: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_format_idc {
        0 | 3 => 1,
        _ => 2, // 4:2:0 和 4:2:2
    };
    let sub_height = match chroma_format_idc {
        0 | 2 | 3 => 1,
        _ => 2, // 4:2:0
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };

    (sub_width, sub_height * height_mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 手工构造的 Baseline 1280x720 SPS (含 NAL 头部 0x67)
    const SPS_720P: [u8; 9] = [0x67, 0x42, 0x00, 0x1F, 0xF4, 0x02, 0x80, 0x2D, 0xC8];

    #[test]
    fn test_parse_sps_baseline_720p() {
        // 去掉 NAL 头部字节后即为 RBSP (无 emulation prevention)
        let sps = parse_sps(&SPS_720P[1..]).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.level_idc, 31);
        assert_eq!(sps.sps_id, 0);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.width, 1280);
        assert_eq!(sps.height, 720);
        assert!(sps.frame_mbs_only);
    }

    #[test]
    fn test_parse_sps_too_short() {
        assert!(parse_sps(&[0x42]).is_err());
        assert!(parse_sps(&[]).is_err());
    }

    #[test]
    fn test_parse_sps_truncated_after_profile() {
        // 头三字节合法但后续语法被截断, 应返回 Eof 类错误而非 panic
        assert!(parse_sps(&[0x42, 0x00, 0x1F]).is_err());
    }

    #[test]
    fn test_read_ue_basic() {
        // '1' → 0, '010' → 1, '011' → 2, '00100' → 3
        let data = [0b10100110, 0b01000000];
        let mut br = BitReader::new(&data);
        assert_eq!(read_ue(&mut br).unwrap(), 0);
        assert_eq!(read_ue(&mut br).unwrap(), 1);
        assert_eq!(read_ue(&mut br).unwrap(), 2);
        assert_eq!(read_ue(&mut br).unwrap(), 3);
    }

    #[test]
    fn test_read_se_mapping() {
        // ue 码字 0,1,2,3,4 → se 值 0,1,-1,2,-2
        // 比特串: '1' '010' '011' '00100' '00101'
        let data = [0b10100110, 0b01000010, 0b10000000];
        let mut br = BitReader::new(&data);
        assert_eq!(read_se(&mut br).unwrap(), 0);
        assert_eq!(read_se(&mut br).unwrap(), 1);
        assert_eq!(read_se(&mut br).unwrap(), -1);
        assert_eq!(read_se(&mut br).unwrap(), 2);
        assert_eq!(read_se(&mut br).unwrap(), -2);
    }
}
