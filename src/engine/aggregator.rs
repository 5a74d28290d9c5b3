// ==========================================
// 云成本变动归因 - 明细行聚合器
// ==========================================
// 职责: 单次遍历作用域内账单行，构建全部中间累加结构
// 输入: 作用域过滤后的行 + 已解析窗口 + 成本口径
// 输出: AggregatedWindows（组合键明细行、维度合计、抵扣合计、日序列、质量信号）
// 规则:
//   - 无日期 / 未来日期 / 不在任一窗口内的行跳过并计数
//   - 维度合计包含全部行（含抵扣类），用于顶层花费口径
//   - 抵扣类行不进入组合键明细行，单独记入抵扣合计
// ==========================================

use crate::config::variance_config::VarianceConfig;
use crate::domain::billing::{BillingRow, DimensionValue};
use crate::domain::types::{CostBasis, Dimension};
use crate::domain::variance::RowCounts;
use crate::engine::arena::GroupArena;
use crate::engine::numeric::percent_of;
use crate::engine::window::{ResolvedWindows, WindowSide};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 组合键: 按 Dimension::index() 排列的六个维度 key
pub type LineKey = [String; 6];

/// 组合键明细行累加记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineAccumulator {
    pub previous_cost: f64,
    pub current_cost: f64,
    pub previous_quantity: f64,
    pub current_quantity: f64,
    pub row_count: usize,
}

/// 单个维度取值在两个窗口的合计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodTotals {
    pub name: String,
    pub previous: f64,
    pub current: f64,
    pub row_count: usize,
}

impl PeriodTotals {
    fn add(&mut self, side: WindowSide, value: f64) {
        match side {
            WindowSide::Current => self.current += value,
            WindowSide::Previous => self.previous += value,
        }
        self.row_count += 1;
    }

    pub fn delta(&self) -> f64 {
        self.current - self.previous
    }
}

/// 六个维度各一个分组表
pub type DimensionArenas = [GroupArena<String, PeriodTotals>; 6];

fn new_dimension_arenas() -> DimensionArenas {
    std::array::from_fn(|_| GroupArena::new())
}

// ==========================================
// AggregatedWindows - 聚合结果
// ==========================================
#[derive(Debug, Clone)]
pub struct AggregatedWindows {
    /// 非抵扣类组合键明细行
    pub lines: GroupArena<LineKey, LineAccumulator>,
    /// 维度合计（全部行）
    pub dimension_totals: DimensionArenas,
    /// 维度合计（仅抵扣类行）
    pub credit_totals: DimensionArenas,
    pub credit_previous: f64,
    pub credit_current: f64,

    pub previous_total: f64,
    pub current_total: f64,

    /// 日合计（每个日期只属于一个窗口）
    pub daily_spend: BTreeMap<NaiveDate, f64>,
    /// 日 -> 服务 -> 花费
    pub service_daily: BTreeMap<NaiveDate, BTreeMap<String, f64>>,

    pub currencies: BTreeSet<String>,
    pub provider_spend: GroupArena<String, f64>,

    /// 以下均为绝对值口径，用于覆盖率信号
    pub absolute_spend: f64,
    pub untagged_team_spend: f64,
    pub sku_mapped_spend: f64,

    pub counts: RowCounts,
}

impl Default for AggregatedWindows {
    fn default() -> Self {
        Self {
            lines: GroupArena::new(),
            dimension_totals: new_dimension_arenas(),
            credit_totals: new_dimension_arenas(),
            credit_previous: 0.0,
            credit_current: 0.0,
            previous_total: 0.0,
            current_total: 0.0,
            daily_spend: BTreeMap::new(),
            service_daily: BTreeMap::new(),
            currencies: BTreeSet::new(),
            provider_spend: GroupArena::new(),
            absolute_spend: 0.0,
            untagged_team_spend: 0.0,
            sku_mapped_spend: 0.0,
            counts: RowCounts::default(),
        }
    }
}

impl AggregatedWindows {
    pub fn net_change(&self) -> f64 {
        self.current_total - self.previous_total
    }

    pub fn totals(&self, dimension: Dimension) -> &GroupArena<String, PeriodTotals> {
        &self.dimension_totals[dimension.index()]
    }

    pub fn credits(&self, dimension: Dimension) -> &GroupArena<String, PeriodTotals> {
        &self.credit_totals[dimension.index()]
    }

    /// 展示名称（未记录时回退为 key）
    pub fn display_name(&self, dimension: Dimension, key: &str) -> String {
        self.totals(dimension)
            .get(key)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    /// 缺失归属标签花费占比（%）
    pub fn untagged_share_percent(&self) -> f64 {
        percent_of(self.untagged_team_spend, self.absolute_spend)
    }

    /// SKU 映射覆盖率（%），无花费时视为完全覆盖
    pub fn sku_coverage_percent(&self) -> f64 {
        if self.absolute_spend <= 0.0 {
            return 100.0;
        }
        percent_of(self.sku_mapped_spend, self.absolute_spend)
    }

    /// (云厂商数量, 最大厂商花费占比%)
    pub fn provider_concentration(&self) -> (usize, f64) {
        let total: f64 = self.provider_spend.iter().map(|(_, v)| *v).sum();
        let top = self
            .provider_spend
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0_f64, f64::max);
        let share = if total <= 0.0 { 100.0 } else { percent_of(top, total) };
        (self.provider_spend.len(), share)
    }
}

// ==========================================
// LineAggregator - 明细行聚合器
// ==========================================
pub struct LineAggregator<'a> {
    config: &'a VarianceConfig,
    basis: CostBasis,
}

impl<'a> LineAggregator<'a> {
    pub fn new(config: &'a VarianceConfig, basis: CostBasis) -> Self {
        Self { config, basis }
    }

    /// 单次遍历聚合
    ///
    /// # 参数
    /// - `rows`: 作用域过滤后的行
    /// - `windows`: 已解析的本期/上期窗口
    /// - `as_of`: 晚于该日期的行视为未来数据
    pub fn aggregate(
        &self,
        rows: &[&BillingRow],
        windows: &ResolvedWindows,
        as_of: NaiveDate,
    ) -> AggregatedWindows {
        let mut out = AggregatedWindows::default();
        let team_aliases = &self.config.tag_keys.team;

        for row in rows {
            let Some(day) = row.day_key() else {
                out.counts.missing_date_skipped += 1;
                continue;
            };
            if day > as_of {
                out.counts.future_dated_skipped += 1;
                continue;
            }
            let Some(side) = windows.side(day) else {
                out.counts.outside_window += 1;
                continue;
            };
            out.counts.windowed += 1;

            let cost = self.cost_of(row);
            let values: [DimensionValue; 6] =
                std::array::from_fn(|i| row.dimension_value(Dimension::ALL[i], team_aliases));

            match side {
                WindowSide::Current => out.current_total += cost,
                WindowSide::Previous => out.previous_total += cost,
            }
            *out.daily_spend.entry(day).or_insert(0.0) += cost;
            *out
                .service_daily
                .entry(day)
                .or_default()
                .entry(values[Dimension::Service.index()].name.clone())
                .or_insert(0.0) += cost;

            for (i, value) in values.iter().enumerate() {
                record_totals(&mut out.dimension_totals[i], value, side, cost);
            }

            // 质量信号
            if let Some(currency) = row.currency_code() {
                out.currencies.insert(currency);
            }
            *out.provider_spend.entry(row.provider_label()).or_default() += cost.abs();
            out.absolute_spend += cost.abs();
            if row.tag_lookup(team_aliases).is_none() {
                out.untagged_team_spend += cost.abs();
            }
            if row.has_sku() {
                out.sku_mapped_spend += cost.abs();
            }

            if self.config.is_credit_like(row.charge_category_label()) {
                out.counts.credit_like += 1;
                match side {
                    WindowSide::Current => out.credit_current += cost,
                    WindowSide::Previous => out.credit_previous += cost,
                }
                for (i, value) in values.iter().enumerate() {
                    record_totals(&mut out.credit_totals[i], value, side, cost);
                }
                continue;
            }

            let key: LineKey = std::array::from_fn(|i| values[i].key.clone());
            let line = out.lines.entry(key).or_default();
            let quantity = row.quantity();
            match side {
                WindowSide::Current => {
                    line.current_cost += cost;
                    line.current_quantity += quantity;
                }
                WindowSide::Previous => {
                    line.previous_cost += cost;
                    line.previous_quantity += quantity;
                }
            }
            line.row_count += 1;
        }

        out.counts.lines = out.lines.len();

        debug!(
            windowed = out.counts.windowed,
            lines = out.counts.lines,
            credit_like = out.counts.credit_like,
            future_dated = out.counts.future_dated_skipped,
            missing_date = out.counts.missing_date_skipped,
            outside_window = out.counts.outside_window,
            "明细行聚合完成"
        );

        out
    }

    fn cost_of(&self, row: &BillingRow) -> f64 {
        row.cost(self.basis)
    }
}

fn record_totals(
    arena: &mut GroupArena<String, PeriodTotals>,
    value: &DimensionValue,
    side: WindowSide,
    cost: f64,
) {
    let totals = arena.entry(value.key.clone()).or_default();
    if totals.name.is_empty() {
        totals.name = value.name.clone();
    }
    totals.add(side, cost);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::TagValue;
    use crate::domain::types::{CompareMode, RangeSpec};
    use crate::engine::window::{WindowRequest, WindowResolver};
    use chrono::{TimeZone, Utc};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn row(day: Option<u32>, service: &str, cost: f64, qty: f64) -> BillingRow {
        BillingRow {
            charge_period_start: day
                .map(|dd| Utc.with_ymd_and_hms(2026, 3, dd, 0, 0, 0).unwrap()),
            billed_cost: Some(cost),
            consumed_quantity: Some(qty),
            service_name: Some(service.to_string()),
            provider: Some("aws".to_string()),
            currency: Some("usd".to_string()),
            sku: Some(format!("{}-sku", service)),
            ..Default::default()
        }
    }

    fn windows(rows: &[&BillingRow], as_of: NaiveDate) -> ResolvedWindows {
        let available = WindowResolver::collect_day_keys(rows.iter().copied(), as_of);
        WindowResolver::resolve(
            available,
            &WindowRequest {
                range: RangeSpec::LastDays(2),
                compare: CompareMode::PreviousPeriod,
                previous_start: None,
                previous_end: None,
                same_period_min_coverage: 1.0,
            },
        )
    }

    #[test]
    fn test_single_pass_totals_and_lines() {
        let data = vec![
            row(Some(1), "EC2", 10.0, 1.0),
            row(Some(2), "EC2", 20.0, 2.0),
            row(Some(3), "EC2", 30.0, 3.0),
            row(Some(4), "S3", 40.0, 4.0),
            row(Some(9), "EC2", 99.0, 1.0),
            row(None, "EC2", 99.0, 1.0),
        ];
        let refs: Vec<&BillingRow> = data.iter().collect();
        let as_of = d(5);
        let resolved = windows(&refs, as_of);
        let config = VarianceConfig::default();
        let agg = LineAggregator::new(&config, CostBasis::Actual).aggregate(&refs, &resolved, as_of);

        assert_eq!(agg.previous_total, 30.0);
        assert_eq!(agg.current_total, 70.0);
        assert_eq!(agg.net_change(), 40.0);
        assert_eq!(agg.counts.windowed, 4);
        assert_eq!(agg.counts.future_dated_skipped, 1);
        assert_eq!(agg.counts.missing_date_skipped, 1);
        assert_eq!(agg.counts.outside_window, 0);
        assert_eq!(agg.counts.lines, 2);

        let ec2 = agg.totals(Dimension::Service).get(&"EC2".to_string()).unwrap();
        assert_eq!((ec2.previous, ec2.current), (30.0, 30.0));
        assert_eq!(agg.currencies.iter().collect::<Vec<_>>(), vec!["USD"]);
        assert_eq!(agg.daily_spend.get(&d(4)), Some(&40.0));
    }

    #[test]
    fn test_credit_rows_are_kept_out_of_lines() {
        let mut credit = row(Some(4), "EC2", -5.0, 0.0);
        credit.charge_category = Some("Credit".to_string());
        let data = vec![row(Some(1), "EC2", 10.0, 1.0), row(Some(3), "EC2", 12.0, 1.0), credit];
        let refs: Vec<&BillingRow> = data.iter().collect();
        let resolved = windows(&refs, d(5));
        let config = VarianceConfig::default();
        let agg = LineAggregator::new(&config, CostBasis::Actual).aggregate(&refs, &resolved, d(5));

        assert_eq!(agg.counts.credit_like, 1);
        assert_eq!(agg.credit_current, -5.0);
        assert_eq!(agg.previous_total, 10.0);
        let line_total: f64 = agg.lines.iter().map(|(_, l)| l.current_cost).sum();
        assert_eq!(line_total, 12.0);
        // 维度合计包含抵扣行
        let ec2 = agg.totals(Dimension::Service).get(&"EC2".to_string()).unwrap();
        assert_eq!(ec2.current, 7.0);
        assert_eq!(
            agg.credits(Dimension::Service).get(&"EC2".to_string()).unwrap().current,
            -5.0
        );
    }

    #[test]
    fn test_quality_signals() {
        let mut tagged = row(Some(1), "EC2", 30.0, 1.0);
        tagged.tags.insert("Team".to_string(), TagValue::from("core"));
        let mut no_sku = row(Some(2), "S3", 10.0, 1.0);
        no_sku.sku = None;
        no_sku.provider = Some("gcp".to_string());
        let data = vec![tagged, no_sku];
        let refs: Vec<&BillingRow> = data.iter().collect();
        let resolved = windows(&refs, d(5));
        let config = VarianceConfig::default();
        let agg = LineAggregator::new(&config, CostBasis::Actual).aggregate(&refs, &resolved, d(5));

        assert_eq!(agg.untagged_share_percent(), 25.0);
        assert_eq!(agg.sku_coverage_percent(), 75.0);
        assert_eq!(agg.provider_concentration(), (2, 75.0));
    }
}
