// ==========================================
// 云成本变动归因 - 领域模型层
// ==========================================
// 职责: 定义账单行、过滤条件、控制项枚举与输出契约
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod billing;
pub mod filters;
pub mod types;
pub mod variance;

// 重导出核心类型
pub use billing::{BillingRow, DimensionValue, TagValue};
pub use filters::{FilterValue, ScopeFilters, TagPredicate};
pub use types::{
    CompareMode, ConfidenceTier, CostBasis, Dimension, Direction, DriverCategory, RangeSpec,
    RiskLevel, RuleStatus, StepKind,
};
pub use variance::{
    BreakdownRow, CategoryBucket, ConfidenceRule, ConfidenceScore, DecompositionBlock, DeepLink,
    DetailSummary, DetailTrendPoint, DimensionRow, DimensionTable, DriverDetail,
    GovernanceWarning, KpiCard, LegacyDriver, LegacyDrivers, RateUsageSplit, ReportStatus,
    ResolvedControls, RowCounts, RunProvenance, ServiceShift, TopDriver, TrendPoint,
    UnexplainedDetail, VarianceReport, VarianceSummary, Waterfall, WaterfallStep,
    WaterfallValidation, WindowBounds, REPORT_SCHEMA_VERSION,
};
