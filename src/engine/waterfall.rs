// ==========================================
// 云成本变动归因 - 瀑布桥构造与对账
// ==========================================
// 职责: 上期合计 -> 六个类别步骤 -> 残差步骤 -> 本期合计
// 规则:
//   - 类别步骤各自取整
//   - 模型残差 = 净变动 - 类别贡献之和（取整）
//   - 取整残差 = round(净变动) - (取整步骤之和 + 模型残差)
//   - 两个残差仅在非零时作为独立步骤追加
//   - 校验: |本期 - (上期 + 全部步骤)| <= 容差
// ==========================================

use crate::domain::types::{ConfidenceTier, Direction, DriverCategory, StepKind};
use crate::domain::variance::{CategoryBucket, Waterfall, WaterfallStep, WaterfallValidation};
use crate::engine::numeric::{percent_of, round1, round2, EPSILON};
use tracing::{debug, warn};

/// 用量/费率步骤的置信等级随用量覆盖率变化
fn step_confidence(category: DriverCategory, quantity_coverage_percent: f64) -> ConfidenceTier {
    match category {
        DriverCategory::UsageGrowth | DriverCategory::RatePriceChange => {
            if quantity_coverage_percent >= 70.0 {
                ConfidenceTier::High
            } else if quantity_coverage_percent >= 40.0 {
                ConfidenceTier::Medium
            } else {
                ConfidenceTier::Low
            }
        }
        DriverCategory::MixShift => ConfidenceTier::Medium,
        DriverCategory::NewServicesResources
        | DriverCategory::CreditsDiscountChange
        | DriverCategory::SavingsRemovals => ConfidenceTier::High,
    }
}

pub struct WaterfallBuilder {
    tolerance: f64,
}

impl WaterfallBuilder {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// 构造瀑布桥
    ///
    /// # 参数
    /// - `previous_spend`, `current_spend`: 两期原始合计
    /// - `global`: 全局类别贡献（未取整）
    /// - `quantity_coverage_percent`: 用量拆分覆盖率
    pub fn build(
        &self,
        previous_spend: f64,
        current_spend: f64,
        global: &CategoryBucket,
        quantity_coverage_percent: f64,
    ) -> Waterfall {
        let start_value = round2(previous_spend);
        let end_value = round2(current_spend);
        let net_raw = current_spend - previous_spend;
        let net_rounded = round2(end_value - start_value);

        let mut steps: Vec<WaterfallStep> = DriverCategory::ALL
            .iter()
            .map(|category| {
                let value = round2(global.get(*category));
                WaterfallStep {
                    kind: StepKind::Category,
                    category: Some(*category),
                    label: category.label().to_string(),
                    value,
                    direction: Direction::of(value),
                    contribution_percent: round1(percent_of(value, net_rounded.abs())),
                    confidence: step_confidence(*category, quantity_coverage_percent),
                }
            })
            .collect();

        let explained = round2(steps.iter().map(|s| s.value).sum::<f64>());
        let model_residual = round2(net_raw - global.sum());
        let rounding_residual = round2(net_rounded - (explained + model_residual));

        for (kind, label, value) in [
            (StepKind::ModelResidual, "未解释残差", model_residual),
            (StepKind::RoundingResidual, "取整差额", rounding_residual),
        ] {
            if value.abs() < EPSILON {
                continue;
            }
            steps.push(WaterfallStep {
                kind,
                category: None,
                label: label.to_string(),
                value,
                direction: Direction::of(value),
                contribution_percent: round1(percent_of(value, net_rounded.abs())),
                confidence: ConfidenceTier::Low,
            });
        }

        let computed_end = round2(start_value + steps.iter().map(|s| s.value).sum::<f64>());
        let difference = round2(end_value - computed_end);
        let is_balanced = difference.abs() <= self.tolerance + EPSILON;

        if is_balanced {
            debug!(
                explained,
                model_residual, rounding_residual, "瀑布桥对账平衡"
            );
        } else {
            warn!(
                computed_end,
                actual_end = end_value,
                difference,
                "瀑布桥对账不平衡"
            );
        }

        Waterfall {
            start_value,
            end_value,
            steps,
            explained,
            model_residual,
            rounding_residual,
            validation: WaterfallValidation {
                computed_end,
                actual_end: end_value,
                difference,
                tolerance: self.tolerance,
                is_balanced,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(values: [f64; 6]) -> CategoryBucket {
        let mut b = CategoryBucket::default();
        for (category, value) in DriverCategory::ALL.iter().zip(values) {
            b.add(*category, value);
        }
        b
    }

    #[test]
    fn test_fully_explained_bridge_has_no_residual_steps() {
        let global = bucket([150.0, 50.0, 30.0, 0.0, -10.0, -20.0]);
        let wf = WaterfallBuilder::new(0.01).build(1000.0, 1200.0, &global, 100.0);

        assert_eq!(wf.steps.len(), 6);
        assert_eq!(wf.explained, 200.0);
        assert_eq!(wf.model_residual, 0.0);
        assert_eq!(wf.rounding_residual, 0.0);
        assert!(wf.validation.is_balanced);
        assert_eq!(wf.validation.computed_end, 1200.0);
        assert_eq!(wf.steps[0].contribution_percent, 75.0);
    }

    #[test]
    fn test_rounding_residual_forces_exact_reconciliation() {
        // 三个类别各 0.333..，取整后合计 0.99，而净变动为 1.00
        let third = 1.0 / 3.0;
        let global = bucket([third, third, third, 0.0, 0.0, 0.0]);
        let wf = WaterfallBuilder::new(0.01).build(10.0, 11.0, &global, 100.0);

        assert_eq!(wf.model_residual, 0.0);
        assert_eq!(wf.rounding_residual, 0.01);
        assert_eq!(wf.steps.last().map(|s| s.kind), Some(StepKind::RoundingResidual));
        assert!(wf.validation.is_balanced);
        assert_eq!(wf.validation.difference, 0.0);
    }

    #[test]
    fn test_model_residual_step_appended() {
        let global = bucket([0.0, 40.0, 0.0, 0.0, 0.0, 0.0]);
        let wf = WaterfallBuilder::new(0.01).build(100.0, 150.0, &global, 20.0);

        assert_eq!(wf.model_residual, 10.0);
        let residual = wf
            .steps
            .iter()
            .find(|s| s.kind == StepKind::ModelResidual)
            .unwrap();
        assert_eq!(residual.value, 10.0);
        assert_eq!(residual.confidence, ConfidenceTier::Low);
        assert_eq!(wf.steps[1].confidence, ConfidenceTier::Low);
        assert!(wf.validation.is_balanced);
    }
}
