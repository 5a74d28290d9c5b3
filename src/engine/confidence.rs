// ==========================================
// 云成本变动归因 - 归因置信度评分
// ==========================================
// 职责: 由数据质量信号推导 0-100 分置信度与逐条规则评估
// 规则: 起始 100 分，逐项扣分，收敛到 [0, 100]
// 分级: >= high_tier_min 为 high，>= medium_tier_min 为 medium，否则 low
// 红线: 每项规则都输出 pass/warn/fail 记录及说明
// ==========================================

use crate::config::variance_config::ConfidenceConfig;
use crate::domain::types::{ConfidenceTier, RuleStatus};
use crate::domain::variance::{ConfidenceRule, ConfidenceScore};
use crate::engine::numeric::{percent_of, round1};
use tracing::debug;

/// 置信度输入信号
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceSignals {
    pub currency_count: usize,
    pub model_residual: f64,
    pub net_change: f64,
    pub quantity_coverage_percent: f64,
    pub untagged_share_percent: f64,
    pub sku_coverage_percent: f64,
    pub day_coverage_percent: f64,
    pub provider_count: usize,
    pub top_provider_share_percent: f64,
}

impl ConfidenceSignals {
    /// 模型残差占净变动比例（%）
    pub fn residual_share_percent(&self) -> f64 {
        percent_of(self.model_residual.abs(), self.net_change.abs())
    }
}

pub struct ConfidenceScorer<'a> {
    config: &'a ConfidenceConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(config: &'a ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, signals: &ConfidenceSignals) -> ConfidenceScore {
        let cfg = self.config;
        let rules = vec![
            self.currency_rule(signals),
            two_level_above(
                "model_residual",
                "模型残差占比",
                signals.residual_share_percent(),
                (cfg.residual_fail_pct, cfg.residual_fail_deduction),
                (cfg.residual_warn_pct, cfg.residual_warn_deduction),
                "未解释残差占净变动",
            ),
            two_level_below(
                "quantity_coverage",
                "用量拆分覆盖率",
                signals.quantity_coverage_percent,
                (cfg.quantity_fail_pct, cfg.quantity_fail_deduction),
                (cfg.quantity_warn_pct, cfg.quantity_warn_deduction),
                "可做用量/费率拆分的变动占非抵扣变动",
            ),
            two_level_above(
                "ownership_tags",
                "归属标签缺失",
                signals.untagged_share_percent,
                (cfg.untagged_fail_pct, cfg.untagged_fail_deduction),
                (cfg.untagged_warn_pct, cfg.untagged_warn_deduction),
                "缺少团队标签的花费占比",
            ),
            single_level_below(
                "sku_mapping",
                "SKU 映射覆盖率",
                signals.sku_coverage_percent,
                cfg.sku_coverage_min_pct,
                cfg.sku_coverage_deduction,
                RuleStatus::Warn,
                "带 SKU 的花费占比",
            ),
            single_level_below(
                "day_coverage",
                "本期日覆盖率",
                signals.day_coverage_percent,
                cfg.day_coverage_min_pct,
                cfg.day_coverage_deduction,
                RuleStatus::Warn,
                "本期有数据的天数占应有天数",
            ),
            self.provider_rule(signals),
        ];

        let total_deduction: u32 = rules.iter().map(|r| r.deduction).sum();
        let score = 100u32.saturating_sub(total_deduction).min(100);
        let tier = if score >= cfg.high_tier_min {
            ConfidenceTier::High
        } else if score >= cfg.medium_tier_min {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        };

        debug!(score, tier = %tier, total_deduction, "置信度评分完成");

        ConfidenceScore { score, tier, rules }
    }

    fn currency_rule(&self, signals: &ConfidenceSignals) -> ConfidenceRule {
        let count = signals.currency_count;
        if count > 1 {
            ConfidenceRule {
                id: "currency_consistency".to_string(),
                label: "币种一致性".to_string(),
                status: RuleStatus::Fail,
                deduction: self.config.multi_currency_deduction,
                observed: count as f64,
                detail: format!("检测到 {} 种币种，金额未做换算，合计可能失真", count),
            }
        } else {
            ConfidenceRule {
                id: "currency_consistency".to_string(),
                label: "币种一致性".to_string(),
                status: RuleStatus::Pass,
                deduction: 0,
                observed: count as f64,
                detail: "单一币种".to_string(),
            }
        }
    }

    fn provider_rule(&self, signals: &ConfidenceSignals) -> ConfidenceRule {
        let share = round1(signals.top_provider_share_percent);
        let diluted = signals.provider_count > 1
            && signals.top_provider_share_percent < self.config.provider_dominance_min_pct;
        ConfidenceRule {
            id: "provider_concentration".to_string(),
            label: "云厂商集中度".to_string(),
            status: if diluted { RuleStatus::Warn } else { RuleStatus::Pass },
            deduction: if diluted {
                self.config.provider_dilution_deduction
            } else {
                0
            },
            observed: share,
            detail: format!(
                "{} 个云厂商，最大厂商占比 {:.1}%（阈值 {:.0}%）",
                signals.provider_count, share, self.config.provider_dominance_min_pct
            ),
        }
    }
}

/// 观测值越大越差的两级规则
fn two_level_above(
    id: &str,
    label: &str,
    observed: f64,
    fail: (f64, u32),
    warn: (f64, u32),
    subject: &str,
) -> ConfidenceRule {
    let (status, deduction) = if observed > fail.0 {
        (RuleStatus::Fail, fail.1)
    } else if observed > warn.0 {
        (RuleStatus::Warn, warn.1)
    } else {
        (RuleStatus::Pass, 0)
    };
    let observed = round1(observed);
    ConfidenceRule {
        id: id.to_string(),
        label: label.to_string(),
        status,
        deduction,
        observed,
        detail: format!(
            "{} {:.1}%（警告 >{:.0}%，失败 >{:.0}%）",
            subject, observed, warn.0, fail.0
        ),
    }
}

/// 观测值越小越差的两级规则
fn two_level_below(
    id: &str,
    label: &str,
    observed: f64,
    fail: (f64, u32),
    warn: (f64, u32),
    subject: &str,
) -> ConfidenceRule {
    let (status, deduction) = if observed < fail.0 {
        (RuleStatus::Fail, fail.1)
    } else if observed < warn.0 {
        (RuleStatus::Warn, warn.1)
    } else {
        (RuleStatus::Pass, 0)
    };
    let observed = round1(observed);
    ConfidenceRule {
        id: id.to_string(),
        label: label.to_string(),
        status,
        deduction,
        observed,
        detail: format!(
            "{} {:.1}%（警告 <{:.0}%，失败 <{:.0}%）",
            subject, observed, warn.0, fail.0
        ),
    }
}

fn single_level_below(
    id: &str,
    label: &str,
    observed: f64,
    minimum: f64,
    deduction: u32,
    breached: RuleStatus,
    subject: &str,
) -> ConfidenceRule {
    let hit = observed < minimum;
    let observed = round1(observed);
    ConfidenceRule {
        id: id.to_string(),
        label: label.to_string(),
        status: if hit { breached } else { RuleStatus::Pass },
        deduction: if hit { deduction } else { 0 },
        observed,
        detail: format!("{} {:.1}%（下限 {:.0}%）", subject, observed, minimum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> ConfidenceSignals {
        ConfidenceSignals {
            currency_count: 1,
            model_residual: 0.0,
            net_change: 200.0,
            quantity_coverage_percent: 100.0,
            untagged_share_percent: 0.0,
            sku_coverage_percent: 100.0,
            day_coverage_percent: 100.0,
            provider_count: 1,
            top_provider_share_percent: 100.0,
        }
    }

    fn score(signals: &ConfidenceSignals) -> ConfidenceScore {
        let cfg = ConfidenceConfig::default();
        ConfidenceScorer::new(&cfg).score(signals)
    }

    #[test]
    fn test_clean_data_scores_full() {
        let result = score(&clean());
        assert_eq!(result.score, 100);
        assert_eq!(result.tier, ConfidenceTier::High);
        assert_eq!(result.rules.len(), 7);
        assert!(result.rules.iter().all(|r| r.status == RuleStatus::Pass));
    }

    #[test]
    fn test_each_deduction() {
        let mut s = clean();
        s.currency_count = 2;
        assert_eq!(score(&s).score, 75);

        let mut s = clean();
        s.model_residual = 12.0; // 6%
        assert_eq!(score(&s).score, 80);
        s.model_residual = 6.0; // 3%
        assert_eq!(score(&s).score, 90);

        let mut s = clean();
        s.quantity_coverage_percent = 39.0;
        assert_eq!(score(&s).score, 80);
        s.quantity_coverage_percent = 69.0;
        assert_eq!(score(&s).score, 90);

        let mut s = clean();
        s.untagged_share_percent = 21.0;
        assert_eq!(score(&s).score, 85);
        s.untagged_share_percent = 11.0;
        assert_eq!(score(&s).score, 92);

        let mut s = clean();
        s.sku_coverage_percent = 80.0;
        s.day_coverage_percent = 80.0;
        assert_eq!(score(&s).score, 80);

        let mut s = clean();
        s.provider_count = 2;
        s.top_provider_share_percent = 60.0;
        assert_eq!(score(&s).score, 95);
    }

    #[test]
    fn test_worst_case_is_clamped_and_low() {
        let s = ConfidenceSignals {
            currency_count: 3,
            model_residual: 100.0,
            net_change: 100.0,
            quantity_coverage_percent: 0.0,
            untagged_share_percent: 100.0,
            sku_coverage_percent: 0.0,
            day_coverage_percent: 0.0,
            provider_count: 3,
            top_provider_share_percent: 34.0,
        };
        let result = score(&s);
        assert_eq!(result.score, 0);
        assert_eq!(result.tier, ConfidenceTier::Low);
    }

    #[test]
    fn test_score_is_monotonic_as_coverage_worsens() {
        let mut previous = u32::MAX;
        for coverage in (0..=100).rev() {
            let mut s = clean();
            s.quantity_coverage_percent = coverage as f64;
            s.untagged_share_percent = (100 - coverage) as f64;
            let current = score(&s).score;
            assert!(current <= previous);
            previous = current;
        }
    }
}
