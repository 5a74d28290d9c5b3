// ==========================================
// 云成本变动归因 - 作用域过滤
// ==========================================
// 职责: 单行谓词，判定账单行是否落在请求作用域内
// 规则: 所有非 All 维度均需精确匹配；若有标签谓词，
//       需存在某个标签键（大小写不敏感）及其值（大小写不敏感）同时匹配
// 红线: 纯函数，无副作用
// ==========================================

use crate::config::variance_config::TagKeyConfig;
use crate::domain::billing::BillingRow;
use crate::domain::filters::{eq_ignore_case, FilterValue, ScopeFilters};
use crate::domain::types::Dimension;

pub struct ScopeFilter<'a> {
    filters: &'a ScopeFilters,
    tag_keys: &'a TagKeyConfig,
}

impl<'a> ScopeFilter<'a> {
    pub fn new(filters: &'a ScopeFilters, tag_keys: &'a TagKeyConfig) -> Self {
        Self { filters, tag_keys }
    }

    /// 是否不做任何过滤（可跳过逐行判定）
    pub fn is_noop(&self) -> bool {
        let f = self.filters;
        f.provider.is_all()
            && f.service.is_all()
            && f.region.is_all()
            && f.account.is_all()
            && f.sub_account.is_all()
            && f.team.is_all()
            && f.app.is_all()
            && f.env.is_all()
            && f.cost_category.is_all()
            && f.tag.is_none()
    }

    /// 判定单行
    pub fn matches(&self, row: &BillingRow) -> bool {
        let f = self.filters;

        if !f.provider.accepts(&row.provider_label()) {
            return false;
        }
        if !f.service.is_all()
            && !f
                .service
                .accepts(&row.dimension_value(Dimension::Service, &self.tag_keys.team).key)
        {
            return false;
        }
        if !f.region.is_all()
            && !f
                .region
                .accepts(&row.dimension_value(Dimension::Region, &self.tag_keys.team).key)
        {
            return false;
        }
        if !f.account.is_all() {
            // 账户可按 ID 或名称过滤
            let account = row.dimension_value(Dimension::Account, &self.tag_keys.team);
            if !f.account.accepts(&account.key) && !f.account.accepts(&account.name) {
                return false;
            }
        }
        if !f.sub_account.accepts(&row.sub_account_label()) {
            return false;
        }
        if !tag_dimension_matches(&f.team, row, &self.tag_keys.team, "Unknown Team") {
            return false;
        }
        if !tag_dimension_matches(&f.app, row, &self.tag_keys.app, "Unknown App") {
            return false;
        }
        if !tag_dimension_matches(&f.env, row, &self.tag_keys.env, "Unknown Env") {
            return false;
        }
        if !tag_dimension_matches(
            &f.cost_category,
            row,
            &self.tag_keys.cost_category,
            "Unknown Cost Category",
        ) {
            return false;
        }

        if let Some(tag) = &f.tag {
            let key = tag.key.trim();
            let value = tag.value.trim();
            let hit = row.tags.iter().any(|(k, v)| {
                eq_ignore_case(k.trim(), key) && eq_ignore_case(v.to_string().trim(), value)
            });
            if !hit {
                return false;
            }
        }

        true
    }

    /// 过滤整个行集，返回引用
    pub fn apply<'r>(&self, rows: &'r [BillingRow]) -> Vec<&'r BillingRow> {
        if self.is_noop() {
            return rows.iter().collect();
        }
        rows.iter().filter(|row| self.matches(row)).collect()
    }
}

fn tag_dimension_matches(
    filter: &FilterValue,
    row: &BillingRow,
    aliases: &[String],
    unknown: &str,
) -> bool {
    if filter.is_all() {
        return true;
    }
    let value = row
        .tag_lookup(aliases)
        .unwrap_or_else(|| unknown.to_string());
    filter.accepts(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::TagValue;
    use crate::domain::filters::TagPredicate;
    use std::collections::BTreeMap;

    fn row(service: &str, provider: &str, tags: &[(&str, &str)]) -> BillingRow {
        let tags: BTreeMap<String, TagValue> = tags
            .iter()
            .map(|(k, v)| (k.to_string(), TagValue::from(*v)))
            .collect();
        BillingRow {
            service_name: Some(service.to_string()),
            provider: Some(provider.to_string()),
            account_id: Some("111".to_string()),
            account_name: Some("prod".to_string()),
            tags,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_filters_pass_everything() {
        let filters = ScopeFilters::all();
        let keys = TagKeyConfig::default();
        let filter = ScopeFilter::new(&filters, &keys);
        assert!(filter.is_noop());
        assert!(filter.matches(&BillingRow::default()));
    }

    #[test]
    fn test_dimension_filters_are_exact() {
        let filters = ScopeFilters {
            service: FilterValue::Exact("EC2".to_string()),
            provider: FilterValue::Exact("aws".to_string()),
            ..ScopeFilters::all()
        };
        let keys = TagKeyConfig::default();
        let filter = ScopeFilter::new(&filters, &keys);

        assert!(filter.matches(&row("EC2", "aws", &[])));
        assert!(!filter.matches(&row("ec2", "aws", &[])));
        assert!(!filter.matches(&row("EC2", "gcp", &[])));
    }

    #[test]
    fn test_account_matches_id_or_name() {
        let keys = TagKeyConfig::default();
        for wanted in ["111", "prod"] {
            let filters = ScopeFilters {
                account: FilterValue::Exact(wanted.to_string()),
                ..ScopeFilters::all()
            };
            assert!(ScopeFilter::new(&filters, &keys).matches(&row("EC2", "aws", &[])));
        }
    }

    #[test]
    fn test_team_filter_reads_tag_aliases() {
        let filters = ScopeFilters {
            team: FilterValue::Exact("payments".to_string()),
            ..ScopeFilters::all()
        };
        let keys = TagKeyConfig::default();
        let filter = ScopeFilter::new(&filters, &keys);

        assert!(filter.matches(&row("EC2", "aws", &[("Owner", "payments")])));
        assert!(!filter.matches(&row("EC2", "aws", &[("owner", "search")])));
        assert!(!filter.matches(&row("EC2", "aws", &[])));
    }

    #[test]
    fn test_tag_predicate_is_case_insensitive() {
        let filters = ScopeFilters {
            tag: Some(TagPredicate {
                key: "Env".to_string(),
                value: "PROD".to_string(),
            }),
            ..ScopeFilters::all()
        };
        let keys = TagKeyConfig::default();
        let filter = ScopeFilter::new(&filters, &keys);

        assert!(filter.matches(&row("EC2", "aws", &[("env", "prod")])));
        assert!(!filter.matches(&row("EC2", "aws", &[("env", "staging")])));
        assert!(!filter.matches(&row("EC2", "aws", &[("stage", "prod")])));

        let rows = vec![
            row("EC2", "aws", &[("ENV", "Prod")]),
            row("S3", "aws", &[]),
        ];
        assert_eq!(filter.apply(&rows).len(), 1);
    }

    #[test]
    fn test_tag_predicate_folds_non_ascii_case() {
        let filters = ScopeFilters {
            tag: Some(TagPredicate {
                key: "Équipe".to_string(),
                value: "CŒUR".to_string(),
            }),
            ..ScopeFilters::all()
        };
        let keys = TagKeyConfig::default();
        let filter = ScopeFilter::new(&filters, &keys);

        assert!(filter.matches(&row("EC2", "aws", &[("équipe", "cœur")])));
        assert!(!filter.matches(&row("EC2", "aws", &[("équipe", "coeur")])));
    }
}
