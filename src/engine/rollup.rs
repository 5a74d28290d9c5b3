// ==========================================
// 云成本变动归因 - 维度汇总与重要性过滤
// ==========================================
// 职责: 按五个维度分别生成汇总表
// 规则:
//   - 重要性阈值 = max(最小变动, 净变动 * 比例, 下限)，|delta| 低于阈值的行省略并计数
//   - 排序: |delta| 降序，同值按名称升序
//   - 超出行数限制的行省略并计数
//   - unexplained = delta - sum(类别贡献)，以整数分计算，逐行按分精确相加
// ==========================================

use crate::config::variance_config::{MaterialityConfig, RiskConfig};
use crate::domain::types::{Dimension, DriverCategory, RiskLevel};
use crate::domain::variance::{CategoryBucket, DecompositionBlock, DimensionRow, DimensionTable};
use crate::engine::aggregator::AggregatedWindows;
use crate::engine::decomposition::Decomposition;
use crate::engine::links::DeepLinkBuilder;
use crate::engine::numeric::{delta_percent, from_cents, percent_of, round2, to_cents};
use std::cmp::Ordering;
use tracing::debug;

/// 重要性阈值
pub fn materiality_threshold(config: &MaterialityConfig, min_change: f64, net_change: f64) -> f64 {
    let min_change = if min_change.is_finite() { min_change } else { 0.0 };
    let net_share = if net_change.is_finite() {
        config.net_change_share * net_change.abs()
    } else {
        0.0
    };
    min_change.max(net_share).max(config.floor)
}

/// 行级对账（整数分）
///
/// 返回 (delta, 取整后的类别贡献, 未解释项)，满足
/// `cents(delta) == sum(cents(类别)) + cents(未解释)`
pub fn reconcile_row(raw_delta: f64, bucket: &CategoryBucket) -> (f64, CategoryBucket, f64) {
    let delta_cents = to_cents(raw_delta);
    let categories = bucket.map(round2);
    let category_cents: i64 = DriverCategory::ALL
        .iter()
        .map(|c| to_cents(categories.get(*c)))
        .sum();
    (
        from_cents(delta_cents),
        categories,
        from_cents(delta_cents - category_cents),
    )
}

/// 风险分级
///
/// # 参数
/// - `contribution_score`: |贡献占比|（%）
/// - `unexplained_percent`: |未解释| 占净变动（%）
pub fn risk_level(config: &RiskConfig, contribution_score: f64, unexplained_percent: f64) -> RiskLevel {
    if contribution_score >= config.high_contribution || unexplained_percent >= config.high_unexplained {
        RiskLevel::High
    } else if contribution_score >= config.medium_contribution
        || unexplained_percent >= config.medium_unexplained
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// 按 |delta| 降序、名称升序
pub fn compare_by_magnitude(a_delta: f64, a_name: &str, b_delta: f64, b_name: &str) -> Ordering {
    b_delta
        .abs()
        .partial_cmp(&a_delta.abs())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_name.cmp(b_name))
}

// ==========================================
// DimensionRollup - 维度汇总器
// ==========================================
pub struct DimensionRollup<'a> {
    pub materiality: &'a MaterialityConfig,
    pub risk: &'a RiskConfig,
    pub links: &'a DeepLinkBuilder,
}

impl<'a> DimensionRollup<'a> {
    /// 生成全部维度汇总表
    ///
    /// # 参数
    /// - `net_change`: 取整后的净变动
    /// - `min_change`: 调用方最小变动阈值
    /// - `row_limit`: 已收敛的行数限制
    pub fn build(
        &self,
        aggregated: &AggregatedWindows,
        decomposition: &Decomposition,
        net_change: f64,
        min_change: f64,
        row_limit: usize,
        primary: Dimension,
    ) -> DecompositionBlock {
        let threshold = materiality_threshold(self.materiality, min_change, net_change);
        let tables = Dimension::ROLLUP
            .iter()
            .map(|dimension| {
                self.build_table(*dimension, aggregated, decomposition, net_change, threshold, row_limit)
            })
            .collect();

        DecompositionBlock {
            primary_dimension: Some(primary),
            materiality_threshold: round2(threshold),
            row_limit,
            tables,
        }
    }

    fn build_table(
        &self,
        dimension: Dimension,
        aggregated: &AggregatedWindows,
        decomposition: &Decomposition,
        net_change: f64,
        threshold: f64,
        row_limit: usize,
    ) -> DimensionTable {
        let mut candidate_count = 0;
        let mut omitted_by_threshold = 0;
        let mut rows: Vec<DimensionRow> = Vec::new();

        for (key, totals) in aggregated.totals(dimension).iter() {
            candidate_count += 1;
            let delta = round2(totals.current - totals.previous);
            if delta.abs() < threshold {
                omitted_by_threshold += 1;
                continue;
            }
            rows.push(self.build_row(
                dimension,
                key,
                &totals.name,
                totals.previous,
                totals.current,
                decomposition,
                net_change,
            ));
        }

        rows.sort_by(|a, b| compare_by_magnitude(a.delta_value, &a.name, b.delta_value, &b.name));
        let omitted_by_row_limit = rows.len().saturating_sub(row_limit);
        rows.truncate(row_limit);

        debug!(
            dimension = %dimension,
            candidates = candidate_count,
            kept = rows.len(),
            omitted_by_threshold,
            omitted_by_row_limit,
            "维度汇总完成"
        );

        DimensionTable {
            dimension,
            rows,
            candidate_count,
            omitted_by_threshold,
            omitted_by_row_limit,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_row(
        &self,
        dimension: Dimension,
        key: &str,
        name: &str,
        previous: f64,
        current: f64,
        decomposition: &Decomposition,
        net_change: f64,
    ) -> DimensionRow {
        let (delta, categories, unexplained) =
            reconcile_row(current - previous, &decomposition.bucket(dimension, key));

        let (delta_pct, delta_display) = delta_percent(previous, current);
        let contribution_percent = round2(percent_of(delta, net_change.abs()));
        let contribution_score = contribution_percent.abs();
        let unexplained_percent = percent_of(unexplained.abs(), net_change.abs());

        DimensionRow {
            dimension,
            key: key.to_string(),
            name: name.to_string(),
            previous_spend: round2(previous),
            current_spend: round2(current),
            delta_value: delta,
            delta_percent: delta_pct,
            delta_percent_display: delta_display,
            contribution_percent,
            contribution_score,
            categories,
            unexplained_contribution: unexplained,
            driver_type: categories.dominant(),
            risk_level: risk_level(self.risk, contribution_score, unexplained_percent),
            deep_link: self.links.for_dimension_value(dimension, key, name),
        }
    }
}
