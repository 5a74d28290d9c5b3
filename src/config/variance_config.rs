// ==========================================
// 云成本变动归因 - 引擎配置
// ==========================================
// 职责: 所有阈值与策略参数的完整配置结构
// 约束: 每个请求构造一次，字段全部有值（不在调用点做部分合并）
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// MaterialityConfig - 重要性阈值与行数限制
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialityConfig {
    /// 绝对下限（货币单位）
    pub floor: f64,
    /// 占净变动比例
    pub net_change_share: f64,
    pub default_row_limit: usize,
    pub min_row_limit: usize,
    pub max_row_limit: usize,
}

impl Default for MaterialityConfig {
    fn default() -> Self {
        Self {
            floor: 0.01,
            net_change_share: 0.005,
            default_row_limit: 100,
            min_row_limit: 10,
            max_row_limit: 500,
        }
    }
}

impl MaterialityConfig {
    /// 将调用方行数限制收敛到 [min, max]
    pub fn clamp_row_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_row_limit)
            .clamp(self.min_row_limit, self.max_row_limit)
    }
}

// ==========================================
// RiskConfig - 维度行风险分级阈值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub high_contribution: f64,
    pub medium_contribution: f64,
    pub high_unexplained: f64,
    pub medium_unexplained: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_contribution: 25.0,
            medium_contribution: 10.0,
            high_unexplained: 10.0,
            medium_unexplained: 5.0,
        }
    }
}

// ==========================================
// ConfidenceConfig - 置信度扣分规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub multi_currency_deduction: u32,

    pub residual_fail_pct: f64,
    pub residual_fail_deduction: u32,
    pub residual_warn_pct: f64,
    pub residual_warn_deduction: u32,

    pub quantity_fail_pct: f64,
    pub quantity_fail_deduction: u32,
    pub quantity_warn_pct: f64,
    pub quantity_warn_deduction: u32,

    pub untagged_fail_pct: f64,
    pub untagged_fail_deduction: u32,
    pub untagged_warn_pct: f64,
    pub untagged_warn_deduction: u32,

    pub sku_coverage_min_pct: f64,
    pub sku_coverage_deduction: u32,

    pub day_coverage_min_pct: f64,
    pub day_coverage_deduction: u32,

    pub provider_dominance_min_pct: f64,
    pub provider_dilution_deduction: u32,

    pub high_tier_min: u32,
    pub medium_tier_min: u32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            multi_currency_deduction: 25,
            residual_fail_pct: 5.0,
            residual_fail_deduction: 20,
            residual_warn_pct: 2.0,
            residual_warn_deduction: 10,
            quantity_fail_pct: 40.0,
            quantity_fail_deduction: 20,
            quantity_warn_pct: 70.0,
            quantity_warn_deduction: 10,
            untagged_fail_pct: 20.0,
            untagged_fail_deduction: 15,
            untagged_warn_pct: 10.0,
            untagged_warn_deduction: 8,
            sku_coverage_min_pct: 85.0,
            sku_coverage_deduction: 10,
            day_coverage_min_pct: 90.0,
            day_coverage_deduction: 10,
            provider_dominance_min_pct: 70.0,
            provider_dilution_deduction: 5,
            high_tier_min: 80,
            medium_tier_min: 60,
        }
    }
}

// ==========================================
// TagKeyConfig - 归属类维度的标签别名
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagKeyConfig {
    pub team: Vec<String>,
    pub app: Vec<String>,
    pub env: Vec<String>,
    pub cost_category: Vec<String>,
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

impl Default for TagKeyConfig {
    fn default() -> Self {
        Self {
            team: owned(&["team", "owner_team", "owner", "squad"]),
            app: owned(&["app", "application", "app_name"]),
            env: owned(&["env", "environment", "stage"]),
            cost_category: owned(&["cost_category", "costcategory", "cost-category"]),
        }
    }
}

// ==========================================
// VarianceConfig - 引擎总配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceConfig {
    pub materiality: MaterialityConfig,
    pub risk: RiskConfig,
    pub confidence: ConfidenceConfig,
    pub tag_keys: TagKeyConfig,

    /// 计费类别命中任一关键字（大小写不敏感）即视为抵扣类行
    pub credit_keywords: Vec<String>,

    /// 默认时间范围
    pub default_range: String,

    /// same_period_last_month 回推后至少需覆盖的本期天数比例，不足则回退到相邻区间
    pub same_period_min_coverage: f64,

    pub top_driver_limit: usize,
    pub detail_resource_limit: usize,
    pub detail_sku_limit: usize,

    /// 瀑布校验容差
    pub balance_tolerance: f64,

    /// 下钻链接根路径
    pub link_base_path: String,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            materiality: MaterialityConfig::default(),
            risk: RiskConfig::default(),
            confidence: ConfidenceConfig::default(),
            tag_keys: TagKeyConfig::default(),
            credit_keywords: owned(&["credit", "discount", "refund", "reserved", "commitment"]),
            default_range: "30d".to_string(),
            same_period_min_coverage: 1.0,
            top_driver_limit: 10,
            detail_resource_limit: 100,
            detail_sku_limit: 20,
            balance_tolerance: 0.01,
            link_base_path: "/dashboard".to_string(),
        }
    }
}

impl VarianceConfig {
    /// 计费类别是否为抵扣/折扣/退款/承诺类
    pub fn is_credit_like(&self, charge_category: Option<&str>) -> bool {
        let Some(category) = charge_category else {
            return false;
        };
        let lowered = category.to_lowercase();
        self.credit_keywords
            .iter()
            .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()))
    }
}
