// ==========================================
// 云成本变动归因 - 变动分解引擎
// ==========================================
// 职责: 将每条非抵扣明细行的变动拆分到六个驱动类别
// 规则（p=上期花费, c=本期花费, pq/cq=上期/本期用量）:
//   - p == 0 且 c > 0      -> 全部记为 newServicesResources
//   - c == 0 且 p > 0      -> 全部记为 savingsRemovals
//   - pq > 0 且 cq > 0     -> usage = (cq-pq)*prevRate, rate = (currRate-prevRate)*cq,
//                             mix = delta - usage - rate
//   - 其余                 -> 全部记为 mixShift（无法做用量/费率拆分）
// 抵扣类变动整体记入 creditsDiscountChange
// ==========================================

use crate::domain::types::{Dimension, DriverCategory};
use crate::domain::variance::CategoryBucket;
use crate::engine::aggregator::{AggregatedWindows, LineAccumulator};
use crate::engine::arena::GroupArena;
use crate::engine::numeric::{is_effectively_zero, percent_of, safe_divide, EPSILON};
use tracing::debug;

/// 单条明细行的分解类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// 两期均为 0
    Unchanged,
    New,
    Removed,
    /// 可做用量/费率拆分
    RateUsageSplit,
    /// 用量缺失，仅能记入结构迁移
    QuantityIneligible,
}

/// 分解单条明细行
pub fn decompose_line(line: &LineAccumulator) -> (CategoryBucket, LineClass) {
    let p = line.previous_cost;
    let c = line.current_cost;
    let pq = line.previous_quantity;
    let cq = line.current_quantity;
    let delta = c - p;
    let mut bucket = CategoryBucket::default();

    if is_effectively_zero(p) && is_effectively_zero(c) {
        return (bucket, LineClass::Unchanged);
    }
    if is_effectively_zero(p) && c > EPSILON {
        bucket.add(DriverCategory::NewServicesResources, delta);
        return (bucket, LineClass::New);
    }
    if is_effectively_zero(c) && p > EPSILON {
        bucket.add(DriverCategory::SavingsRemovals, delta);
        return (bucket, LineClass::Removed);
    }

    if pq > EPSILON && cq > EPSILON {
        let prev_rate = safe_divide(p, pq);
        let curr_rate = safe_divide(c, cq);
        let usage = (cq - pq) * prev_rate;
        let rate = (curr_rate - prev_rate) * cq;
        bucket.add(DriverCategory::UsageGrowth, usage);
        bucket.add(DriverCategory::RatePriceChange, rate);
        bucket.add(DriverCategory::MixShift, delta - usage - rate);
        return (bucket, LineClass::RateUsageSplit);
    }

    bucket.add(DriverCategory::MixShift, delta);
    (bucket, LineClass::QuantityIneligible)
}

// ==========================================
// QuantityCoverage - 用量拆分覆盖率
// ==========================================
// 分母: 非抵扣明细行 |delta| 之和扣除新增/下线行
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuantityCoverage {
    pub split_abs_delta: f64,
    pub ineligible_abs_delta: f64,
    pub new_removed_abs_delta: f64,
    pub split_lines: usize,
    pub ineligible_lines: usize,
}

impl QuantityCoverage {
    pub fn non_credit_abs_delta(&self) -> f64 {
        self.split_abs_delta + self.ineligible_abs_delta + self.new_removed_abs_delta
    }

    /// 覆盖率（%），没有可拆分变动时视为 100
    pub fn percent(&self) -> f64 {
        let denominator = self.split_abs_delta + self.ineligible_abs_delta;
        if is_effectively_zero(denominator) {
            return 100.0;
        }
        percent_of(self.split_abs_delta, denominator)
    }
}

// ==========================================
// Decomposition - 分解结果
// ==========================================
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub global: CategoryBucket,
    /// 按维度取值汇总的类别贡献（维度顺序同 Dimension::ALL）
    pub by_dimension: [GroupArena<String, CategoryBucket>; 6],
    pub quantity: QuantityCoverage,
}

impl Default for Decomposition {
    fn default() -> Self {
        Self {
            global: CategoryBucket::default(),
            by_dimension: std::array::from_fn(|_| GroupArena::new()),
            quantity: QuantityCoverage::default(),
        }
    }
}

impl Decomposition {
    pub fn bucket(&self, dimension: Dimension, key: &str) -> CategoryBucket {
        self.by_dimension[dimension.index()]
            .get(key)
            .copied()
            .unwrap_or_default()
    }
}

// ==========================================
// DecompositionEngine - 变动分解引擎
// ==========================================
// 无状态引擎
pub struct DecompositionEngine;

impl DecompositionEngine {
    pub fn decompose(aggregated: &AggregatedWindows) -> Decomposition {
        let mut out = Decomposition::default();

        for (key, line) in aggregated.lines.iter() {
            let (bucket, class) = decompose_line(line);
            let abs_delta = (line.current_cost - line.previous_cost).abs();

            match class {
                LineClass::Unchanged => continue,
                LineClass::New | LineClass::Removed => {
                    out.quantity.new_removed_abs_delta += abs_delta;
                }
                LineClass::RateUsageSplit => {
                    out.quantity.split_abs_delta += abs_delta;
                    out.quantity.split_lines += 1;
                }
                LineClass::QuantityIneligible => {
                    out.quantity.ineligible_abs_delta += abs_delta;
                    out.quantity.ineligible_lines += 1;
                }
            }

            out.global.merge(&bucket);
            for dimension in Dimension::ALL {
                out.by_dimension[dimension.index()]
                    .entry(key[dimension.index()].clone())
                    .or_default()
                    .merge(&bucket);
            }
        }

        // 抵扣类变动
        out.global.add(
            DriverCategory::CreditsDiscountChange,
            aggregated.credit_current - aggregated.credit_previous,
        );
        for dimension in Dimension::ALL {
            for (key, totals) in aggregated.credits(dimension).iter() {
                out.by_dimension[dimension.index()]
                    .entry(key.clone())
                    .or_default()
                    .add(DriverCategory::CreditsDiscountChange, totals.delta());
            }
        }

        debug!(
            split_lines = out.quantity.split_lines,
            ineligible_lines = out.quantity.ineligible_lines,
            coverage = out.quantity.percent(),
            "变动分解完成"
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(p: f64, c: f64, pq: f64, cq: f64) -> LineAccumulator {
        LineAccumulator {
            previous_cost: p,
            current_cost: c,
            previous_quantity: pq,
            current_quantity: cq,
            row_count: 1,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_usage_rate_split() {
        let (bucket, class) = decompose_line(&line(100.0, 180.0, 100.0, 150.0));
        assert_eq!(class, LineClass::RateUsageSplit);
        assert!(close(bucket.usage_growth, 50.0));
        assert!(close(bucket.rate_price_change, 30.0));
        assert!(close(bucket.mix_shift, 0.0));
        assert!(close(bucket.sum(), 80.0));
    }

    #[test]
    fn test_new_and_removed_lines() {
        let (bucket, class) = decompose_line(&line(0.0, 150.0, 0.0, 10.0));
        assert_eq!(class, LineClass::New);
        assert_eq!(bucket.new_services_resources, 150.0);
        assert_eq!(bucket.sum(), 150.0);

        let (bucket, class) = decompose_line(&line(500.0, 0.0, 5.0, 0.0));
        assert_eq!(class, LineClass::Removed);
        assert_eq!(bucket.savings_removals, -500.0);
        assert_eq!(bucket.sum(), -500.0);
    }

    #[test]
    fn test_zero_line_contributes_nothing() {
        let (bucket, class) = decompose_line(&line(0.0, 0.0, 10.0, 10.0));
        assert_eq!(class, LineClass::Unchanged);
        assert_eq!(bucket, CategoryBucket::default());
    }

    #[test]
    fn test_missing_quantity_goes_to_mix() {
        let (bucket, class) = decompose_line(&line(100.0, 130.0, 0.0, 12.0));
        assert_eq!(class, LineClass::QuantityIneligible);
        assert_eq!(bucket.mix_shift, 30.0);
        assert_eq!(bucket.usage_growth, 0.0);
    }

    #[test]
    fn test_coverage_percent() {
        let coverage = QuantityCoverage {
            split_abs_delta: 30.0,
            ineligible_abs_delta: 70.0,
            new_removed_abs_delta: 500.0,
            ..Default::default()
        };
        assert_eq!(coverage.percent(), 30.0);
        assert_eq!(QuantityCoverage::default().percent(), 100.0);
    }
}
