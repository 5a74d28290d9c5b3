// ==========================================
// 云成本变动归因 - 输出数据契约
// ==========================================
// 职责: 引擎输出的全部结构（维度行、瀑布、置信度、趋势、下钻、溯源）
// 序列化: camelCase，与前端渲染层约定一致
// ==========================================

use crate::domain::filters::ScopeFilters;
use crate::domain::types::{
    CompareMode, ConfidenceTier, CostBasis, Dimension, Direction, DriverCategory, RiskLevel,
    RuleStatus, StepKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 报告结构版本
pub const REPORT_SCHEMA_VERSION: &str = "cost-variance.v2";

// ==========================================
// CategoryBucket - 六类驱动贡献
// ==========================================
// 不变量: sum(bucket) + unexplained == delta（取整前）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBucket {
    pub new_services_resources: f64,
    pub usage_growth: f64,
    pub rate_price_change: f64,
    pub mix_shift: f64,
    pub credits_discount_change: f64,
    pub savings_removals: f64,
}

impl CategoryBucket {
    pub fn get(&self, category: DriverCategory) -> f64 {
        match category {
            DriverCategory::NewServicesResources => self.new_services_resources,
            DriverCategory::UsageGrowth => self.usage_growth,
            DriverCategory::RatePriceChange => self.rate_price_change,
            DriverCategory::MixShift => self.mix_shift,
            DriverCategory::CreditsDiscountChange => self.credits_discount_change,
            DriverCategory::SavingsRemovals => self.savings_removals,
        }
    }

    fn slot(&mut self, category: DriverCategory) -> &mut f64 {
        match category {
            DriverCategory::NewServicesResources => &mut self.new_services_resources,
            DriverCategory::UsageGrowth => &mut self.usage_growth,
            DriverCategory::RatePriceChange => &mut self.rate_price_change,
            DriverCategory::MixShift => &mut self.mix_shift,
            DriverCategory::CreditsDiscountChange => &mut self.credits_discount_change,
            DriverCategory::SavingsRemovals => &mut self.savings_removals,
        }
    }

    pub fn add(&mut self, category: DriverCategory, value: f64) {
        if value.is_finite() {
            *self.slot(category) += value;
        }
    }

    pub fn merge(&mut self, other: &CategoryBucket) {
        for category in DriverCategory::ALL {
            self.add(category, other.get(category));
        }
    }

    pub fn sum(&self) -> f64 {
        DriverCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// 各分量独立取整后的副本
    pub fn map(&self, f: impl Fn(f64) -> f64) -> CategoryBucket {
        let mut out = CategoryBucket::default();
        for category in DriverCategory::ALL {
            *out.slot(category) = f(self.get(category));
        }
        out
    }

    /// 绝对贡献最大的类别；并列时按固定优先级（ALL 顺序）取前者；全为 0 返回 None
    pub fn dominant(&self) -> Option<DriverCategory> {
        let mut best: Option<(DriverCategory, f64)> = None;
        for category in DriverCategory::ALL {
            let magnitude = self.get(category).abs();
            if magnitude == 0.0 {
                continue;
            }
            match best {
                Some((_, current)) if magnitude <= current => {}
                _ => best = Some((category, magnitude)),
            }
        }
        best.map(|(category, _)| category)
    }
}

// ==========================================
// DeepLink - 下钻链接
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLink {
    /// 目标视图（cost_explorer / resource_inventory / allocation / variance_detail）
    pub view: String,
    pub label: String,
    pub href: String,
    /// 结构化参数（渲染层可自行拼装）
    pub params: BTreeMap<String, String>,
}

// ==========================================
// DimensionRow - 维度汇总行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRow {
    pub dimension: Dimension,
    pub key: String,
    pub name: String,
    pub previous_spend: f64,
    pub current_spend: f64,
    pub delta_value: f64,
    /// 上期为 0 时无百分比
    pub delta_percent: Option<f64>,
    /// "NEW" / "REMOVED" / "+12.5%"
    pub delta_percent_display: String,
    pub contribution_percent: f64,
    pub contribution_score: f64,
    pub categories: CategoryBucket,
    pub unexplained_contribution: f64,
    pub driver_type: Option<DriverCategory>,
    pub risk_level: RiskLevel,
    pub deep_link: DeepLink,
}

/// 单维度汇总表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionTable {
    pub dimension: Dimension,
    pub rows: Vec<DimensionRow>,
    pub candidate_count: usize,
    pub omitted_by_threshold: usize,
    pub omitted_by_row_limit: usize,
}

/// 维度拆解块
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionBlock {
    pub primary_dimension: Option<Dimension>,
    pub materiality_threshold: f64,
    pub row_limit: usize,
    pub tables: Vec<DimensionTable>,
}

impl DecompositionBlock {
    pub fn table(&self, dimension: Dimension) -> Option<&DimensionTable> {
        self.tables.iter().find(|t| t.dimension == dimension)
    }
}

// ==========================================
// Waterfall - 瀑布桥
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallStep {
    pub kind: StepKind,
    pub category: Option<DriverCategory>,
    pub label: String,
    pub value: f64,
    pub direction: Direction,
    pub contribution_percent: f64,
    pub confidence: ConfidenceTier,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallValidation {
    pub computed_end: f64,
    pub actual_end: f64,
    pub difference: f64,
    pub tolerance: f64,
    pub is_balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waterfall {
    pub start_value: f64,
    pub end_value: f64,
    pub steps: Vec<WaterfallStep>,
    /// 六类步骤（取整后）之和
    pub explained: f64,
    pub model_residual: f64,
    pub rounding_residual: f64,
    pub validation: WaterfallValidation,
}

// ==========================================
// Confidence - 归因置信度
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceRule {
    pub id: String,
    pub label: String,
    pub status: RuleStatus,
    pub deduction: u32,
    /// 规则观测值（百分比或计数）
    pub observed: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScore {
    pub score: u32,
    pub tier: ConfidenceTier,
    pub rules: Vec<ConfidenceRule>,
}

impl Default for ConfidenceScore {
    fn default() -> Self {
        Self {
            score: 0,
            tier: ConfidenceTier::Low,
            rules: Vec::new(),
        }
    }
}

// ==========================================
// Trend - 日趋势（按序号对齐）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceShift {
    pub service: String,
    pub shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub index: usize,
    pub current_date: Option<NaiveDate>,
    pub previous_date: Option<NaiveDate>,
    pub current_spend: f64,
    pub previous_spend: f64,
    pub delta: f64,
    pub explained_value: f64,
    pub residual_value: f64,
    pub top_services: Vec<ServiceShift>,
}

// ==========================================
// Summary / KPI / Drivers
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowBounds {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub days: usize,
}

impl WindowBounds {
    pub fn of(days: &[NaiveDate]) -> Self {
        Self {
            start: days.first().copied(),
            end: days.last().copied(),
            days: days.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceSummary {
    pub previous_spend: f64,
    pub current_spend: f64,
    pub net_change: f64,
    pub net_change_percent: Option<f64>,
    pub explained_percent: f64,
    pub top3_concentration_percent: f64,
    pub current_window: WindowBounds,
    pub previous_window: WindowBounds,
    pub currencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiCard {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub display: String,
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDriver {
    pub rank: usize,
    pub dimension: Dimension,
    pub key: String,
    pub name: String,
    pub delta_value: f64,
    pub contribution_percent: f64,
    pub driver_type: Option<DriverCategory>,
    pub risk_level: RiskLevel,
    pub deep_link: DeepLink,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateUsageSplit {
    pub supported: bool,
    pub reason: Option<String>,
    pub usage_growth: f64,
    pub rate_price_change: f64,
    pub mix_shift: f64,
    pub quantity_coverage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceWarning {
    pub code: String,
    pub severity: RuleStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnexplainedDetail {
    pub model_residual: f64,
    pub rounding_residual: f64,
    pub total_residual: f64,
    pub residual_percent_of_net: f64,
    pub warnings: Vec<GovernanceWarning>,
}

// ==========================================
// Provenance - 运行溯源
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCounts {
    pub fetched: usize,
    pub scoped: usize,
    pub windowed: usize,
    pub credit_like: usize,
    pub future_dated_skipped: usize,
    pub missing_date_skipped: usize,
    pub outside_window: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProvenance {
    /// 内容派生的运行标识（相同输入恒定）
    pub run_id: String,
    /// 单次调用标识
    pub request_id: String,
    pub engine_version: String,
    pub generated_at: DateTime<Utc>,
    pub data_as_of: Option<NaiveDate>,
    pub source_ids: Vec<String>,
    pub row_counts: RowCounts,
}

// ==========================================
// Legacy - 旧版增减列表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDriver {
    pub name: String,
    pub previous: f64,
    pub current: f64,
    pub change: f64,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDrivers {
    pub increases: Vec<LegacyDriver>,
    pub decreases: Vec<LegacyDriver>,
}

// ==========================================
// ResolvedControls - 规范化后的请求控制项回显
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedControls {
    pub filters: ScopeFilters,
    pub range: String,
    pub compare_to: CompareMode,
    pub cost_basis: CostBasis,
    pub primary_dimension: Dimension,
    pub min_change: f64,
    pub row_limit: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub previous_start_date: Option<NaiveDate>,
    pub previous_end_date: Option<NaiveDate>,
    pub source_ids: Vec<String>,
    pub as_of: NaiveDate,
    /// same_period_last_month 回退到相邻区间时为 true
    pub compare_fallback_applied: bool,
}

// ==========================================
// VarianceReport - 响应信封
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceReport {
    pub schema_version: String,
    pub status: ReportStatus,
    pub message: Option<String>,
    pub controls: ResolvedControls,
    pub summary: VarianceSummary,
    pub kpis: Vec<KpiCard>,
    pub waterfall: Waterfall,
    pub trend: Vec<TrendPoint>,
    pub decomposition: DecompositionBlock,
    pub top_drivers: Vec<TopDriver>,
    pub rate_vs_usage: RateUsageSplit,
    pub unexplained: UnexplainedDetail,
    pub confidence: ConfidenceScore,
    pub provenance: RunProvenance,
    pub legacy: LegacyDrivers,
}

// ==========================================
// DriverDetail - 下钻明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailSummary {
    pub key: String,
    pub name: String,
    /// 汇总覆盖的全部维度 key（按名称命中多个 key 时不止一个）
    pub matched_keys: Vec<String>,
    pub previous_spend: f64,
    pub current_spend: f64,
    pub delta_value: f64,
    pub delta_percent: Option<f64>,
    pub delta_percent_display: String,
    pub categories: CategoryBucket,
    pub driver_type: Option<DriverCategory>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailTrendPoint {
    pub index: usize,
    pub current_date: Option<NaiveDate>,
    pub previous_date: Option<NaiveDate>,
    pub current_spend: f64,
    pub previous_spend: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub key: String,
    pub name: String,
    pub previous_spend: f64,
    pub current_spend: f64,
    pub delta_value: f64,
    pub delta_percent_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDetail {
    pub dimension: Dimension,
    pub key: String,
    pub summary: Option<DetailSummary>,
    pub daily_trend: Vec<DetailTrendPoint>,
    pub resources: Vec<BreakdownRow>,
    pub skus: Vec<BreakdownRow>,
    pub deep_links: Vec<DeepLink>,
    pub message: Option<String>,
}

impl DriverDetail {
    /// 无匹配数据时的固定空结构
    pub fn empty(dimension: Dimension, key: &str, message: impl Into<String>) -> Self {
        Self {
            dimension,
            key: key.to_string(),
            summary: None,
            daily_trend: Vec::new(),
            resources: Vec::new(),
            skus: Vec::new(),
            deep_links: Vec::new(),
            message: Some(message.into()),
        }
    }
}
