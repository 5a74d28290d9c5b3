// ==========================================
// 云成本变动归因 - 报告组装
// ==========================================
// 职责: 由引擎中间结果派生摘要、KPI、主要驱动、用量/费率拆分、
//       未解释明细与治理告警、旧版增减列表
// 红线: 纯函数，不做 I/O
// ==========================================

use crate::config::variance_config::VarianceConfig;
use crate::domain::types::{Dimension, DriverCategory, RuleStatus};
use crate::domain::variance::{
    ConfidenceScore, DimensionTable, GovernanceWarning, KpiCard, LegacyDriver, LegacyDrivers,
    RateUsageSplit, RowCounts, TopDriver, UnexplainedDetail, VarianceSummary, Waterfall,
    WindowBounds,
};
use crate::engine::aggregator::AggregatedWindows;
use crate::engine::decomposition::Decomposition;
use crate::engine::numeric::{
    format_money, is_effectively_zero, percent_of, round1, round2, sole_currency,
};
use crate::engine::window::ResolvedWindows;

// ==========================================
// 变动摘要
// ==========================================

pub fn build_summary(
    aggregated: &AggregatedWindows,
    windows: &ResolvedWindows,
    waterfall: &Waterfall,
    primary: Dimension,
) -> VarianceSummary {
    let previous = waterfall.start_value;
    let current = waterfall.end_value;
    let net = round2(current - previous);
    let net_change_percent = if is_effectively_zero(previous) {
        None
    } else {
        Some(round1(percent_of(net, previous.abs())))
    };

    VarianceSummary {
        previous_spend: previous,
        current_spend: current,
        net_change: net,
        net_change_percent,
        explained_percent: round1(percent_of(waterfall.explained, net.abs())),
        top3_concentration_percent: round1(top3_concentration(aggregated, primary)),
        current_window: WindowBounds::of(&windows.current),
        previous_window: WindowBounds::of(&windows.previous),
        currencies: aggregated.currencies.iter().cloned().collect(),
    }
}

/// 主维度中变动绝对值前三的取值占全部变动绝对值之比（%）
pub fn top3_concentration(aggregated: &AggregatedWindows, dimension: Dimension) -> f64 {
    let mut magnitudes: Vec<f64> = aggregated
        .totals(dimension)
        .iter()
        .map(|(_, t)| t.delta().abs())
        .collect();
    let total: f64 = magnitudes.iter().sum();
    magnitudes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let top: f64 = magnitudes.iter().take(3).sum();
    percent_of(top, total)
}

// ==========================================
// KPI 卡片
// ==========================================

pub fn build_kpis(
    summary: &VarianceSummary,
    waterfall: &Waterfall,
    top_drivers: &[TopDriver],
    confidence: &ConfidenceScore,
) -> Vec<KpiCard> {
    let net = summary.net_change;
    let currency = sole_currency(&summary.currencies);
    let direction = if net > 0.0 {
        "上升"
    } else if net < 0.0 {
        "下降"
    } else {
        "持平"
    };
    let pct_text = summary
        .net_change_percent
        .map(|p| format!("{:+.1}%", p))
        .unwrap_or_else(|| "无上期基线".to_string());

    let largest_step = waterfall
        .steps
        .iter()
        .filter(|s| s.category.is_some())
        .max_by(|a, b| {
            a.value
                .abs()
                .partial_cmp(&b.value.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .filter(|s| s.value != 0.0);

    let mut cards = vec![
        KpiCard {
            id: "previous_spend".to_string(),
            label: "上期花费".to_string(),
            value: summary.previous_spend,
            display: format_money(summary.previous_spend, currency),
            insight: format!("上期窗口共 {} 天有账单数据", summary.previous_window.days),
        },
        KpiCard {
            id: "current_spend".to_string(),
            label: "本期花费".to_string(),
            value: summary.current_spend,
            display: format_money(summary.current_spend, currency),
            insight: format!("本期窗口共 {} 天有账单数据", summary.current_window.days),
        },
        KpiCard {
            id: "net_change".to_string(),
            label: "净变动".to_string(),
            value: net,
            display: format_money(net, currency),
            insight: format!("花费较上期{}（{}）", direction, pct_text),
        },
        KpiCard {
            id: "explained_share".to_string(),
            label: "已解释占比".to_string(),
            value: summary.explained_percent,
            display: format!("{:.1}%", summary.explained_percent),
            insight: match largest_step {
                Some(step) => format!(
                    "最大驱动类别为「{}」，贡献 {}",
                    step.label,
                    format_money(step.value, currency)
                ),
                None => "本期无可归因的变动".to_string(),
            },
        },
    ];

    cards.push(match top_drivers.first() {
        Some(driver) => KpiCard {
            id: "top_driver".to_string(),
            label: "首要驱动".to_string(),
            value: driver.delta_value,
            display: driver.name.clone(),
            insight: format!(
                "{} 变动 {}，占净变动 {:.1}%",
                driver.name,
                format_money(driver.delta_value, currency),
                driver.contribution_percent
            ),
        },
        None => KpiCard {
            id: "top_driver".to_string(),
            label: "首要驱动".to_string(),
            value: 0.0,
            display: "-".to_string(),
            insight: "没有超过重要性阈值的驱动项".to_string(),
        },
    });

    let failed = confidence
        .rules
        .iter()
        .filter(|r| r.status != RuleStatus::Pass)
        .count();
    cards.push(KpiCard {
        id: "attribution_confidence".to_string(),
        label: "归因置信度".to_string(),
        value: confidence.score as f64,
        display: format!("{} ({})", confidence.score, confidence.tier),
        insight: if failed == 0 {
            "全部数据质量检查通过".to_string()
        } else {
            format!("{} 项数据质量检查未通过，详见治理告警", failed)
        },
    });

    cards
}

// ==========================================
// 主要驱动
// ==========================================

pub fn build_top_drivers(table: Option<&DimensionTable>, limit: usize) -> Vec<TopDriver> {
    let Some(table) = table else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, row)| TopDriver {
            rank: i + 1,
            dimension: row.dimension,
            key: row.key.clone(),
            name: row.name.clone(),
            delta_value: row.delta_value,
            contribution_percent: row.contribution_percent,
            driver_type: row.driver_type,
            risk_level: row.risk_level,
            deep_link: row.deep_link.clone(),
        })
        .collect()
}

// ==========================================
// 用量 / 费率拆分
// ==========================================

pub fn build_rate_vs_usage(decomposition: &Decomposition, config: &VarianceConfig) -> RateUsageSplit {
    let coverage = round1(decomposition.quantity.percent());
    let minimum = config.confidence.quantity_fail_pct;
    let supported = coverage >= minimum;
    let global = &decomposition.global;

    RateUsageSplit {
        supported,
        reason: (!supported).then(|| {
            format!(
                "用量覆盖率 {:.1}% 低于 {:.0}%，无法可靠拆分用量与费率",
                coverage, minimum
            )
        }),
        usage_growth: round2(global.get(DriverCategory::UsageGrowth)),
        rate_price_change: round2(global.get(DriverCategory::RatePriceChange)),
        mix_shift: round2(global.get(DriverCategory::MixShift)),
        quantity_coverage_percent: coverage,
    }
}

// ==========================================
// 未解释明细与治理告警
// ==========================================

pub fn build_governance_warnings(
    confidence: &ConfidenceScore,
    counts: &RowCounts,
    waterfall: &Waterfall,
    compare_fallback_applied: bool,
    currency: Option<&str>,
) -> Vec<GovernanceWarning> {
    let mut warnings: Vec<GovernanceWarning> = confidence
        .rules
        .iter()
        .filter(|r| r.status != RuleStatus::Pass)
        .map(|r| GovernanceWarning {
            code: r.id.clone(),
            severity: r.status,
            message: format!("{}: {}", r.label, r.detail),
        })
        .collect();

    if counts.future_dated_skipped > 0 {
        warnings.push(GovernanceWarning {
            code: "future_dated_rows".to_string(),
            severity: RuleStatus::Warn,
            message: format!("跳过 {} 行未来日期账单", counts.future_dated_skipped),
        });
    }
    if counts.missing_date_skipped > 0 {
        warnings.push(GovernanceWarning {
            code: "missing_charge_date".to_string(),
            severity: RuleStatus::Warn,
            message: format!("跳过 {} 行缺少计费日期的账单", counts.missing_date_skipped),
        });
    }
    if waterfall.model_residual != 0.0 {
        warnings.push(GovernanceWarning {
            code: "unexplained_residual".to_string(),
            severity: RuleStatus::Warn,
            message: format!(
                "存在未归因残差 {}",
                format_money(waterfall.model_residual, currency)
            ),
        });
    }
    if compare_fallback_applied {
        warnings.push(GovernanceWarning {
            code: "compare_fallback".to_string(),
            severity: RuleStatus::Warn,
            message: "对比区间数据不足，已回退为紧邻本期的等长区间".to_string(),
        });
    }
    if !waterfall.validation.is_balanced {
        warnings.push(GovernanceWarning {
            code: "waterfall_unbalanced".to_string(),
            severity: RuleStatus::Fail,
            message: format!(
                "瀑布桥对账差额 {}",
                format_money(waterfall.validation.difference, currency)
            ),
        });
    }

    warnings
}

pub fn build_unexplained(waterfall: &Waterfall, warnings: Vec<GovernanceWarning>) -> UnexplainedDetail {
    let total = round2(waterfall.model_residual + waterfall.rounding_residual);
    let net = round2(waterfall.end_value - waterfall.start_value);
    UnexplainedDetail {
        model_residual: waterfall.model_residual,
        rounding_residual: waterfall.rounding_residual,
        total_residual: total,
        residual_percent_of_net: round1(percent_of(total.abs(), net.abs())),
        warnings,
    }
}

// ==========================================
// 旧版增减列表
// ==========================================

pub fn build_legacy(table: Option<&DimensionTable>) -> LegacyDrivers {
    let mut legacy = LegacyDrivers::default();
    let Some(table) = table else {
        return legacy;
    };
    for row in &table.rows {
        let item = LegacyDriver {
            name: row.name.clone(),
            previous: row.previous_spend,
            current: row.current_spend,
            change: row.delta_value,
            change_percent: row.delta_percent,
        };
        if row.delta_value > 0.0 {
            legacy.increases.push(item);
        } else if row.delta_value < 0.0 {
            legacy.decreases.push(item);
        }
    }
    legacy
}
