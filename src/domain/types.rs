// ==========================================
// 云成本变动归因 - 领域类型定义
// ==========================================
// 职责: 请求控制项、维度、驱动类别、风险/置信等级等枚举
// 序列化格式: 与前端数据契约一致的字面量
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 成本口径 (Cost Basis)
// ==========================================
// actual -> billed_cost, amortized -> effective_cost, net -> contracted_cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CostBasis {
    #[default]
    Actual,
    Amortized,
    Net,
}

impl fmt::Display for CostBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostBasis::Actual => write!(f, "actual"),
            CostBasis::Amortized => write!(f, "amortized"),
            CostBasis::Net => write!(f, "net"),
        }
    }
}

impl FromStr for CostBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actual" | "billed" => Ok(CostBasis::Actual),
            "amortized" | "effective" => Ok(CostBasis::Amortized),
            "net" | "contracted" => Ok(CostBasis::Net),
            other => Err(format!("未知成本口径: {}", other)),
        }
    }
}

// ==========================================
// 对比模式 (Compare Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    #[default]
    PreviousPeriod,
    SamePeriodLastMonth,
    CustomPrevious,
    None,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMode::PreviousPeriod => write!(f, "previous_period"),
            CompareMode::SamePeriodLastMonth => write!(f, "same_period_last_month"),
            CompareMode::CustomPrevious => write!(f, "custom_previous"),
            CompareMode::None => write!(f, "none"),
        }
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous_period" | "" => Ok(CompareMode::PreviousPeriod),
            "same_period_last_month" => Ok(CompareMode::SamePeriodLastMonth),
            "custom_previous" => Ok(CompareMode::CustomPrevious),
            "none" => Ok(CompareMode::None),
            other => Err(format!("未知对比模式: {}", other)),
        }
    }
}

// ==========================================
// 时间范围 (Range Spec)
// ==========================================
// "Nd" 取最近 N 个有数据的日期; mtd/qtd 按最新日期所在月/季度; custom 为显式起止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    LastDays(u32),
    MonthToDate,
    QuarterToDate,
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl RangeSpec {
    /// 解析范围描述
    ///
    /// # 参数
    /// - `raw`: "30d" / "mtd" / "qtd" / "custom"
    /// - `start`, `end`: custom 模式下的显式日期
    pub fn parse(
        raw: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "mtd" => Ok(RangeSpec::MonthToDate),
            "qtd" => Ok(RangeSpec::QuarterToDate),
            "custom" => Ok(RangeSpec::Custom { start, end }),
            other => {
                let days = other
                    .strip_suffix('d')
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("无法识别的时间范围: {}", raw))?;
                Ok(RangeSpec::LastDays(days))
            }
        }
    }

    /// 规范化后的范围标签（回显给调用方）
    pub fn label(&self) -> String {
        match self {
            RangeSpec::LastDays(n) => format!("{}d", n),
            RangeSpec::MonthToDate => "mtd".to_string(),
            RangeSpec::QuarterToDate => "qtd".to_string(),
            RangeSpec::Custom { .. } => "custom".to_string(),
        }
    }
}

// ==========================================
// 维度 (Dimension)
// ==========================================
// 前五个参与维度汇总表; Resource 仅用于下钻明细
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Service,
    Account,
    Region,
    Team,
    Sku,
    Resource,
}

impl Dimension {
    /// 全部跟踪维度（聚合器按此顺序建索引）
    pub const ALL: [Dimension; 6] = [
        Dimension::Service,
        Dimension::Account,
        Dimension::Region,
        Dimension::Team,
        Dimension::Sku,
        Dimension::Resource,
    ];

    /// 参与维度汇总表的五个维度
    pub const ROLLUP: [Dimension; 5] = [
        Dimension::Service,
        Dimension::Account,
        Dimension::Region,
        Dimension::Team,
        Dimension::Sku,
    ];

    pub fn index(self) -> usize {
        match self {
            Dimension::Service => 0,
            Dimension::Account => 1,
            Dimension::Region => 2,
            Dimension::Team => 3,
            Dimension::Sku => 4,
            Dimension::Resource => 5,
        }
    }

    /// 缺失标签时的占位字面量
    pub fn unknown_label(self) -> &'static str {
        match self {
            Dimension::Service => "Unknown Service",
            Dimension::Account => "Unknown Account",
            Dimension::Region => "Unknown Region",
            Dimension::Team => "Unknown Team",
            Dimension::Sku => "Unknown SKU",
            Dimension::Resource => "Unknown Resource",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Service => "service",
            Dimension::Account => "account",
            Dimension::Region => "region",
            Dimension::Team => "team",
            Dimension::Sku => "sku",
            Dimension::Resource => "resource",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" => Ok(Dimension::Service),
            "account" => Ok(Dimension::Account),
            "region" => Ok(Dimension::Region),
            "team" => Ok(Dimension::Team),
            "sku" => Ok(Dimension::Sku),
            "resource" => Ok(Dimension::Resource),
            other => Err(format!("未知维度: {}", other)),
        }
    }
}

// ==========================================
// 驱动类别 (Driver Category)
// ==========================================
// 顺序即平局时的优先级顺序，也是瀑布图步骤顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverCategory {
    NewServicesResources,
    UsageGrowth,
    RatePriceChange,
    MixShift,
    CreditsDiscountChange,
    SavingsRemovals,
}

impl DriverCategory {
    pub const ALL: [DriverCategory; 6] = [
        DriverCategory::NewServicesResources,
        DriverCategory::UsageGrowth,
        DriverCategory::RatePriceChange,
        DriverCategory::MixShift,
        DriverCategory::CreditsDiscountChange,
        DriverCategory::SavingsRemovals,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DriverCategory::NewServicesResources => "newServicesResources",
            DriverCategory::UsageGrowth => "usageGrowth",
            DriverCategory::RatePriceChange => "ratePriceChange",
            DriverCategory::MixShift => "mixShift",
            DriverCategory::CreditsDiscountChange => "creditsDiscountChange",
            DriverCategory::SavingsRemovals => "savingsRemovals",
        }
    }

    /// 瀑布图/KPI 展示标签
    pub fn label(self) -> &'static str {
        match self {
            DriverCategory::NewServicesResources => "新增服务/资源",
            DriverCategory::UsageGrowth => "用量增长",
            DriverCategory::RatePriceChange => "费率/价格变动",
            DriverCategory::MixShift => "结构迁移",
            DriverCategory::CreditsDiscountChange => "抵扣/折扣变动",
            DriverCategory::SavingsRemovals => "下线/节省",
        }
    }
}

impl fmt::Display for DriverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ==========================================
// 风险等级 (Risk Level)
// ==========================================
// 顺序: Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

// ==========================================
// 置信等级 (Confidence Tier)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

// ==========================================
// 规则评估结果 (Rule Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Pass => write!(f, "pass"),
            RuleStatus::Warn => write!(f, "warn"),
            RuleStatus::Fail => write!(f, "fail"),
        }
    }
}

// ==========================================
// 瀑布步骤类型 (Step Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Category,
    ModelResidual,
    RoundingResidual,
}

// ==========================================
// 变动方向 (Direction)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    Neutral,
}

impl Direction {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Direction::Increase
        } else if value < 0.0 {
            Direction::Decrease
        } else {
            Direction::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_spec_parse() {
        assert_eq!(RangeSpec::parse("30d", None, None), Ok(RangeSpec::LastDays(30)));
        assert_eq!(RangeSpec::parse(" MTD ", None, None), Ok(RangeSpec::MonthToDate));
        assert_eq!(RangeSpec::parse("qtd", None, None), Ok(RangeSpec::QuarterToDate));
        assert!(RangeSpec::parse("0d", None, None).is_err());
        assert!(RangeSpec::parse("weekly", None, None).is_err());

        let start = NaiveDate::from_ymd_opt(2026, 1, 1);
        match RangeSpec::parse("custom", start, None) {
            Ok(RangeSpec::Custom { start: s, end }) => {
                assert_eq!(s, start);
                assert!(end.is_none());
            }
            other => panic!("Expected Custom, got {:?}", other),
        }
    }

    #[test]
    fn test_driver_category_serialization() {
        let json = serde_json::to_string(&DriverCategory::CreditsDiscountChange).unwrap();
        assert_eq!(json, "\"creditsDiscountChange\"");
        assert_eq!(DriverCategory::ALL[0], DriverCategory::NewServicesResources);
    }

    #[test]
    fn test_compare_mode_round_trip_labels() {
        for mode in [
            CompareMode::PreviousPeriod,
            CompareMode::SamePeriodLastMonth,
            CompareMode::CustomPrevious,
            CompareMode::None,
        ] {
            assert_eq!(mode.to_string().parse::<CompareMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_dimension_index_matches_all_order() {
        for (i, dim) in Dimension::ALL.iter().enumerate() {
            assert_eq!(dim.index(), i);
        }
        assert_eq!("SKU".parse::<Dimension>(), Ok(Dimension::Sku));
    }
}
