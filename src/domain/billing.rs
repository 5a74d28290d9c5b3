// ==========================================
// 云成本变动归因 - 账单明细实体
// ==========================================
// 职责: 上游数据协作方提供的账单行（只读）
// 约束: 所有字段均可能为空，读取时按约定替换默认值
//       成本空值 -> 0, 维度空值 -> "Unknown <Dimension>"
// ==========================================

use crate::domain::filters::eq_ignore_case;
use crate::domain::types::{CostBasis, Dimension};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// TagValue - 标签值（字符串或数值）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => write!(f, "{}", s),
            TagValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

// ==========================================
// BillingRow - 账单行
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingRow {
    /// 计费周期起点（决定日期键）
    pub charge_period_start: Option<DateTime<Utc>>,
    pub charge_period_end: Option<DateTime<Utc>>,

    /// 三种成本口径
    pub billed_cost: Option<f64>,
    pub effective_cost: Option<f64>,
    pub contracted_cost: Option<f64>,

    /// 用量
    pub consumed_quantity: Option<f64>,
    pub pricing_quantity: Option<f64>,

    pub currency: Option<String>,

    /// 计费类别（Usage / Credit / Refund ...），用于识别抵扣类行
    pub charge_category: Option<String>,
    pub commitment_discount_id: Option<String>,

    // 维度标签
    pub provider: Option<String>,
    pub service_name: Option<String>,
    pub region_name: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub sub_account: Option<String>,
    pub sku: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, TagValue>,
}

/// 维度取值: key 用于分组与下钻匹配, name 用于展示
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionValue {
    pub key: String,
    pub name: String,
}

impl DimensionValue {
    fn same(value: String) -> Self {
        Self {
            key: value.clone(),
            name: value,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

impl BillingRow {
    /// 日期键（UTC 日历日）
    pub fn day_key(&self) -> Option<NaiveDate> {
        self.charge_period_start.map(|ts| ts.date_naive())
    }

    /// 按成本口径取成本，空值或非有限值视为 0
    pub fn cost(&self, basis: CostBasis) -> f64 {
        match basis {
            CostBasis::Actual => finite_or_zero(self.billed_cost),
            CostBasis::Amortized => finite_or_zero(self.effective_cost),
            CostBasis::Net => finite_or_zero(self.contracted_cost),
        }
    }

    /// 消耗量，空值视为 0
    pub fn quantity(&self) -> f64 {
        finite_or_zero(self.consumed_quantity)
    }

    pub fn provider_label(&self) -> String {
        non_blank(&self.provider)
            .unwrap_or("Unknown Provider")
            .to_string()
    }

    pub fn sub_account_label(&self) -> String {
        non_blank(&self.sub_account)
            .unwrap_or("Unknown Sub Account")
            .to_string()
    }

    pub fn currency_code(&self) -> Option<String> {
        non_blank(&self.currency).map(|c| c.to_ascii_uppercase())
    }

    pub fn charge_category_label(&self) -> Option<&str> {
        non_blank(&self.charge_category)
    }

    /// 按别名列表查找标签（大小写不敏感，取第一个非空命中）
    pub fn tag_lookup(&self, aliases: &[String]) -> Option<String> {
        for alias in aliases {
            for (key, value) in &self.tags {
                if eq_ignore_case(key.trim(), alias.trim()) {
                    let text = value.to_string();
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    /// 解析指定维度的取值
    ///
    /// # 参数
    /// - `dimension`: 目标维度
    /// - `team_aliases`: Team 维度来自标签，需要别名表
    pub fn dimension_value(&self, dimension: Dimension, team_aliases: &[String]) -> DimensionValue {
        let unknown = dimension.unknown_label();
        match dimension {
            Dimension::Service => {
                DimensionValue::same(non_blank(&self.service_name).unwrap_or(unknown).to_string())
            }
            Dimension::Region => {
                DimensionValue::same(non_blank(&self.region_name).unwrap_or(unknown).to_string())
            }
            Dimension::Sku => {
                DimensionValue::same(non_blank(&self.sku).unwrap_or(unknown).to_string())
            }
            Dimension::Team => DimensionValue::same(
                self.tag_lookup(team_aliases)
                    .unwrap_or_else(|| unknown.to_string()),
            ),
            Dimension::Account => {
                let id = non_blank(&self.account_id);
                let name = non_blank(&self.account_name);
                DimensionValue {
                    key: id.or(name).unwrap_or(unknown).to_string(),
                    name: name.or(id).unwrap_or(unknown).to_string(),
                }
            }
            Dimension::Resource => {
                let id = non_blank(&self.resource_id);
                let name = non_blank(&self.resource_name);
                DimensionValue {
                    key: id.or(name).unwrap_or(unknown).to_string(),
                    name: name.or(id).unwrap_or(unknown).to_string(),
                }
            }
        }
    }

    /// 是否带有 SKU 映射
    pub fn has_sku(&self) -> bool {
        non_blank(&self.sku).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aliases() -> Vec<String> {
        vec!["team".to_string(), "owner".to_string()]
    }

    #[test]
    fn test_missing_labels_fall_back_to_unknown() {
        let row = BillingRow::default();
        let team = aliases();
        assert_eq!(row.dimension_value(Dimension::Service, &team).name, "Unknown Service");
        assert_eq!(row.dimension_value(Dimension::Account, &team).key, "Unknown Account");
        assert_eq!(row.dimension_value(Dimension::Team, &team).name, "Unknown Team");
        assert_eq!(row.cost(CostBasis::Actual), 0.0);
        assert_eq!(row.quantity(), 0.0);
        assert!(row.day_key().is_none());
    }

    #[test]
    fn test_account_key_prefers_id_name_prefers_label() {
        let row = BillingRow {
            account_id: Some("123456".to_string()),
            account_name: Some("prod-core".to_string()),
            ..Default::default()
        };
        let value = row.dimension_value(Dimension::Account, &aliases());
        assert_eq!(value.key, "123456");
        assert_eq!(value.name, "prod-core");
    }

    #[test]
    fn test_cost_basis_selects_column() {
        let row = BillingRow {
            billed_cost: Some(10.0),
            effective_cost: Some(8.0),
            contracted_cost: None,
            ..Default::default()
        };
        assert_eq!(row.cost(CostBasis::Actual), 10.0);
        assert_eq!(row.cost(CostBasis::Amortized), 8.0);
        assert_eq!(row.cost(CostBasis::Net), 0.0);
    }

    #[test]
    fn test_tag_lookup_is_case_insensitive_and_accepts_numbers() {
        let mut tags = BTreeMap::new();
        tags.insert("Owner".to_string(), TagValue::Text("platform".to_string()));
        tags.insert("CostCenter".to_string(), TagValue::Number(42.0));
        let row = BillingRow {
            tags,
            charge_period_start: Some(Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap()),
            ..Default::default()
        };

        assert_eq!(row.tag_lookup(&aliases()), Some("platform".to_string()));
        assert_eq!(row.tag_lookup(&["costcenter".to_string()]), Some("42".to_string()));
        assert_eq!(row.day_key(), NaiveDate::from_ymd_opt(2026, 3, 2));
    }

    #[test]
    fn test_tag_lookup_folds_non_ascii_keys() {
        let mut tags = BTreeMap::new();
        tags.insert("Équipe".to_string(), TagValue::Text("données".to_string()));
        let row = BillingRow {
            tags,
            ..Default::default()
        };

        let team = vec!["équipe".to_string()];
        assert_eq!(row.tag_lookup(&team), Some("données".to_string()));
        assert_eq!(row.dimension_value(Dimension::Team, &team).key, "données");
    }
}
