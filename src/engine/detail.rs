// ==========================================
// 云成本变动归因 - 驱动因素下钻
// ==========================================
// 职责: 针对单个维度取值重跑聚合与分解，输出下钻证据
// 输入: 作用域内全部行 + 由全部行解析出的窗口 + 维度/取值
// 输出: DriverDetail（汇总、日序列、资源/SKU 明细、跳转链接）
// 规则: 取值先按 key、再按展示名大小写不敏感匹配；无匹配时返回固定空结构
// ==========================================

use crate::config::variance_config::VarianceConfig;
use crate::domain::billing::{BillingRow, DimensionValue};
use crate::domain::filters::eq_ignore_case;
use crate::domain::types::{CostBasis, Dimension};
use crate::domain::variance::{BreakdownRow, DetailSummary, DriverDetail};
use crate::engine::aggregator::{LineAggregator, PeriodTotals};
use crate::engine::arena::GroupArena;
use crate::engine::decomposition::DecompositionEngine;
use crate::engine::links::DeepLinkBuilder;
use crate::engine::numeric::{delta_percent, round2};
use crate::engine::rollup::compare_by_magnitude;
use crate::engine::trend::build_detail_trend;
use crate::engine::window::ResolvedWindows;
use chrono::NaiveDate;
use tracing::debug;

pub struct DriverDetailResolver<'a> {
    config: &'a VarianceConfig,
    basis: CostBasis,
    links: &'a DeepLinkBuilder,
}

impl<'a> DriverDetailResolver<'a> {
    pub fn new(config: &'a VarianceConfig, basis: CostBasis, links: &'a DeepLinkBuilder) -> Self {
        Self {
            config,
            basis,
            links,
        }
    }

    pub fn resolve(
        &self,
        scoped: &[&BillingRow],
        windows: &ResolvedWindows,
        as_of: NaiveDate,
        dimension: Dimension,
        key: &str,
    ) -> DriverDetail {
        let wanted = key.trim();
        if wanted.is_empty() {
            return DriverDetail::empty(dimension, key, "未指定下钻取值");
        }

        let team_aliases = &self.config.tag_keys.team;
        let values: Vec<(&BillingRow, DimensionValue)> = scoped
            .iter()
            .map(|row| (*row, row.dimension_value(dimension, team_aliases)))
            .collect();

        // key 命中优先；无 key 命中时才按展示名匹配
        let by_key = values.iter().any(|(_, v)| eq_ignore_case(&v.key, wanted));
        let matched: Vec<&BillingRow> = values
            .iter()
            .filter(|(_, v)| {
                if by_key {
                    eq_ignore_case(&v.key, wanted)
                } else {
                    eq_ignore_case(&v.name, wanted)
                }
            })
            .map(|(row, _)| *row)
            .collect();

        if matched.is_empty() {
            debug!(dimension = %dimension, key = wanted, "下钻取值无匹配行");
            return DriverDetail::empty(
                dimension,
                wanted,
                format!("未找到 {} = {} 的账单数据", dimension, wanted),
            );
        }

        let aggregated = LineAggregator::new(self.config, self.basis).aggregate(&matched, windows, as_of);
        if aggregated.counts.windowed == 0 {
            return DriverDetail::empty(
                dimension,
                wanted,
                format!("{} = {} 在所选时间窗口内无数据", dimension, wanted),
            );
        }
        let decomposition = DecompositionEngine::decompose(&aggregated);

        let matched_totals = aggregated.totals(dimension);
        let matched_keys: Vec<String> = matched_totals.keys().cloned().collect();
        let (canonical_key, canonical_name) = matched_totals
            .first()
            .map(|(k, t)| (k.clone(), t.name.clone()))
            .unwrap_or_else(|| (wanted.to_string(), wanted.to_string()));
        if matched_keys.len() > 1 {
            debug!(
                dimension = %dimension,
                name = wanted,
                keys = ?matched_keys,
                "展示名命中多个 key，合并汇总"
            );
        }

        let previous = aggregated.previous_total;
        let current = aggregated.current_total;
        let (pct, display) = delta_percent(previous, current);
        let categories = decomposition.global.map(round2);

        let summary = DetailSummary {
            key: canonical_key.clone(),
            name: canonical_name.clone(),
            matched_keys,
            previous_spend: round2(previous),
            current_spend: round2(current),
            delta_value: round2(current - previous),
            delta_percent: pct,
            delta_percent_display: display,
            categories,
            driver_type: categories.dominant(),
            row_count: aggregated.counts.windowed,
        };

        let resources = breakdown(
            aggregated.totals(Dimension::Resource),
            self.config.detail_resource_limit,
        );
        let skus = breakdown(aggregated.totals(Dimension::Sku), self.config.detail_sku_limit);

        debug!(
            dimension = %dimension,
            key = %canonical_key,
            rows = summary.row_count,
            resources = resources.len(),
            skus = skus.len(),
            "下钻明细完成"
        );

        DriverDetail {
            dimension,
            key: canonical_key.clone(),
            summary: Some(summary),
            daily_trend: build_detail_trend(windows, &aggregated),
            resources,
            skus,
            deep_links: self
                .links
                .detail_links(dimension, &canonical_key, &canonical_name),
            message: None,
        }
    }
}

/// 按 |delta| 降序、名称升序，截断到上限
fn breakdown(totals: &GroupArena<String, PeriodTotals>, limit: usize) -> Vec<BreakdownRow> {
    let mut rows: Vec<BreakdownRow> = totals
        .iter()
        .map(|(key, t)| BreakdownRow {
            key: key.clone(),
            name: t.name.clone(),
            previous_spend: round2(t.previous),
            current_spend: round2(t.current),
            delta_value: round2(t.delta()),
            delta_percent_display: delta_percent(t.previous, t.current).1,
        })
        .collect();
    rows.sort_by(|a, b| compare_by_magnitude(a.delta_value, &a.name, b.delta_value, &b.name));
    rows.truncate(limit);
    rows
}
