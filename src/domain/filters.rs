// ==========================================
// 云成本变动归因 - 作用域过滤条件
// ==========================================
// 职责: 单次请求的维度等值过滤 + 可选标签过滤
// 约束: 每个字段必填（All 表示不过滤），请求内只构造一次
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 大小写不敏感比较（Unicode 小写折叠，非仅 ASCII）
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

// ==========================================
// FilterValue - 单个维度的过滤值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterValue {
    #[default]
    All,
    Exact(String),
}

impl FilterValue {
    /// 解析前端传入的过滤值: 空值 / "All" (大小写不敏感) 均视为不过滤
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => FilterValue::All,
            Some(v) if eq_ignore_case(v, "all") => FilterValue::All,
            Some(v) => FilterValue::Exact(v.to_string()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FilterValue::All)
    }

    /// 判定候选值是否满足过滤条件（精确匹配）
    pub fn accepts(&self, candidate: &str) -> bool {
        match self {
            FilterValue::All => true,
            FilterValue::Exact(expected) => expected == candidate.trim(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterValue::All => "All",
            FilterValue::Exact(v) => v.as_str(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for FilterValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(FilterValue::parse(raw.as_deref()))
    }
}

// ==========================================
// TagPredicate - 标签过滤（键、值均大小写不敏感）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPredicate {
    pub key: String,
    pub value: String,
}

// ==========================================
// ScopeFilters - 作用域过滤集合
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeFilters {
    pub provider: FilterValue,
    pub service: FilterValue,
    pub region: FilterValue,
    pub account: FilterValue,
    pub sub_account: FilterValue,
    pub team: FilterValue,
    pub app: FilterValue,
    pub env: FilterValue,
    pub cost_category: FilterValue,
    pub tag: Option<TagPredicate>,
}

impl ScopeFilters {
    /// 不做任何过滤
    pub fn all() -> Self {
        Self::default()
    }

    /// 已生效的过滤项（用于下钻链接透传与审计回显）
    pub fn active_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let fields: [(&'static str, &FilterValue); 9] = [
            ("provider", &self.provider),
            ("service", &self.service),
            ("region", &self.region),
            ("account", &self.account),
            ("subAccount", &self.sub_account),
            ("team", &self.team),
            ("app", &self.app),
            ("env", &self.env),
            ("costCategory", &self.cost_category),
        ];
        for (name, value) in fields {
            if let FilterValue::Exact(v) = value {
                pairs.push((name, v.clone()));
            }
        }
        if let Some(tag) = &self.tag {
            pairs.push(("tagKey", tag.key.clone()));
            pairs.push(("tagValue", tag.value.clone()));
        }
        pairs
    }
}
