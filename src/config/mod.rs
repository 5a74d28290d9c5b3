// ==========================================
// 云成本变动归因 - 配置层
// ==========================================
// 职责: 引擎配置结构 + config_kv 全局覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod variance_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use variance_config::{
    ConfidenceConfig, MaterialityConfig, RiskConfig, TagKeyConfig, VarianceConfig,
};
