//! 解码引擎注册表与内置引擎.
//!
//! 支持按名称动态查找和实例化解码引擎, 上层 (CLI/应用) 据此在
//! 软硬件引擎之间切换, 而无需在编译期绑定具体实现.

use std::collections::HashMap;

use liu_core::{LiuError, LiuResult};

use crate::engine::DecodeEngine;

pub mod null;

/// 引擎工厂函数类型
pub type EngineFactory = fn() -> LiuResult<Box<dyn DecodeEngine>>;

/// 解码引擎注册表
///
/// 管理所有已注册的引擎, 支持按名称查找并创建实例.
pub struct EngineRegistry {
    /// 引擎工厂映射
    engines: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// 注册一个引擎
    ///
    /// 同名注册直接覆盖, 后注册者生效.
    pub fn register(&mut self, name: impl Into<String>, factory: EngineFactory) {
        self.engines.insert(name.into(), factory);
    }

    /// 按名称创建引擎实例
    pub fn create(&self, name: &str) -> LiuResult<Box<dyn DecodeEngine>> {
        let factory = self
            .engines
            .get(name)
            .ok_or_else(|| LiuError::EngineNotFound(name.to_string()))?;
        factory()
    }

    /// 列出所有已注册的引擎名称
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 注册所有内置引擎
pub fn register_all(registry: &mut EngineRegistry) {
    registry.register("null", null::NullEngine::create);
}
