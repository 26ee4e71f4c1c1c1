//! H.264 参数集缓存.
//!
//! 跟踪码流中最近一次出现的 SPS/PPS, 并判定解码会话何时可以配置、
//! 何时需要重建. 单配置模型: 同一时刻只保留一组激活的参数集,
//! 新到的 SPS/PPS 直接覆盖同类旧值, 不做多参数集管理.

use bytes::Bytes;
use log::debug;

use crate::nal::{NalUnit, NalUnitType};

/// 观察一个 NAL 单元后缓存给出的动作指示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// 无需动作
    None,
    /// SPS 与 PPS 首次凑齐, 应执行首次配置
    Configure,
    /// 已配置后参数集内容发生变化, 应重建会话 (仅在重配置策略开启时)
    Reconfigure,
}

/// 参数集缓存
///
/// 不变式: `configured()` 为 true 当且仅当 SPS 与 PPS 均非空,
/// 且解码会话正是由这一对参数集构建的. 配置成败由会话管理器回报
/// (`mark_configured` / 配置失败则不调用), 缓存本身不触碰引擎.
pub struct ParameterSetCache {
    /// 最近一次出现的 SPS (含 NAL 头部字节)
    sps: Option<Bytes>,
    /// 最近一次出现的 PPS (含 NAL 头部字节)
    pps: Option<Bytes>,
    /// 当前会话是否已由现有参数集成功配置
    configured: bool,
    /// 已配置后再次收到不同参数集时是否要求重建会话
    reconfigure_on_change: bool,
}

impl ParameterSetCache {
    /// 创建缓存
    ///
    /// `reconfigure_on_change`: false 为单次配置 (默认行为, 与参考
    /// 实现一致 — 流中途的参数集变化被忽略); true 时内容不同的
    /// SPS/PPS 会触发 [`CacheAction::Reconfigure`].
    pub fn new(reconfigure_on_change: bool) -> Self {
        Self {
            sps: None,
            pps: None,
            configured: false,
            reconfigure_on_change,
        }
    }

    /// 观察一个 NAL 单元, 更新缓存并返回动作指示
    ///
    /// 非参数集类型原样穿过 (返回 [`CacheAction::None`]).
    /// 字节级相同的重复参数集永远不会触发重建.
    pub fn observe(&mut self, nal: &NalUnit) -> CacheAction {
        let slot = match nal.nal_type {
            NalUnitType::Sps => &mut self.sps,
            NalUnitType::Pps => &mut self.pps,
            _ => return CacheAction::None,
        };

        let changed = slot.as_ref() != Some(&nal.data);
        if changed {
            debug!(
                "参数集更新: {} {} 字节",
                nal.nal_type,
                nal.data.len()
            );
            *slot = Some(nal.data.clone());
        }

        if self.configured {
            if changed && self.reconfigure_on_change {
                self.configured = false;
                return CacheAction::Reconfigure;
            }
            return CacheAction::None;
        }

        if self.sps.is_some() && self.pps.is_some() {
            CacheAction::Configure
        } else {
            CacheAction::None
        }
    }

    /// 当前缓存的 SPS
    pub fn sps(&self) -> Option<&Bytes> {
        self.sps.as_ref()
    }

    /// 当前缓存的 PPS
    pub fn pps(&self) -> Option<&Bytes> {
        self.pps.as_ref()
    }

    /// 会话是否已由当前参数集成功配置
    pub fn configured(&self) -> bool {
        self.configured
    }

    /// 标记配置成功 (由会话管理器在会话创建后回报)
    pub fn mark_configured(&mut self) {
        self.configured = true;
    }

    /// 清空缓存 (连接拆除时调用)
    pub fn reset(&mut self) {
        self.sps = None;
        self.pps = None;
        self.configured = false;
    }
}
