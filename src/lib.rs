// ==========================================
// 云成本变动归因 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: FinOps 决策支持（解释环比花费变动，不做预测与修正）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 账单行、过滤条件、输出契约
pub mod domain;

// 数据仓储层 - 账单行数据源
pub mod repository;

// 引擎层 - 变动分解与归因
pub mod engine;

// 配置层 - 阈值与策略参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CompareMode, ConfidenceTier, CostBasis, Dimension, DriverCategory, RangeSpec, RiskLevel,
    RuleStatus,
};

// 领域实体
pub use domain::{
    BillingRow, CategoryBucket, DriverDetail, ScopeFilters, TagValue, VarianceReport,
};

// 引擎
pub use engine::{EmptyReason, VarianceEngine, VarianceQuery};

// 配置
pub use config::{ConfigManager, VarianceConfig};

// API
pub use api::{ApiError, ApiResult, CostVarianceApi, CostVarianceRequest, DriverDetailRequest};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "云成本变动归因";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(VERSION, engine::ENGINE_VERSION);
    }
}
