// ==========================================
// 云成本变动归因 - 趋势对比序列
// ==========================================
// 职责: 按序号（非日历日期）对齐本期与上期日序列
// 规则:
//   - 第 i 个点配对两期各自的第 i 天，长度取两期较长者，缺失侧按 0
//   - residual = delta * (总残差 / 净变动)，净变动为 0 时 residual = 0
//   - explained = delta - residual
//   - 每点标注日环比变动绝对值最大的至多 3 个服务
// ==========================================

use crate::domain::variance::{DetailTrendPoint, ServiceShift, TrendPoint};
use crate::engine::aggregator::AggregatedWindows;
use crate::engine::numeric::{is_effectively_zero, round2, safe_divide};
use crate::engine::rollup::compare_by_magnitude;
use crate::engine::window::ResolvedWindows;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

const TOP_SERVICES_PER_POINT: usize = 3;

/// 按序号对齐的日期对
fn aligned_days(windows: &ResolvedWindows) -> Vec<(Option<NaiveDate>, Option<NaiveDate>)> {
    let len = windows.current.len().max(windows.previous.len());
    (0..len)
        .map(|i| (windows.current.get(i).copied(), windows.previous.get(i).copied()))
        .collect()
}

fn spend_on(daily: &BTreeMap<NaiveDate, f64>, day: Option<NaiveDate>) -> f64 {
    day.and_then(|d| daily.get(&d).copied()).unwrap_or(0.0)
}

/// 构造带残差叠加的趋势序列
///
/// # 参数
/// - `total_residual`: 模型残差 + 取整残差
/// - `net_change`: 取整后的净变动
pub fn build_trend(
    windows: &ResolvedWindows,
    aggregated: &AggregatedWindows,
    total_residual: f64,
    net_change: f64,
) -> Vec<TrendPoint> {
    let residual_ratio = if is_effectively_zero(net_change) {
        0.0
    } else {
        safe_divide(total_residual, net_change)
    };

    aligned_days(windows)
        .into_iter()
        .enumerate()
        .map(|(index, (current_date, previous_date))| {
            let current_spend = spend_on(&aggregated.daily_spend, current_date);
            let previous_spend = spend_on(&aggregated.daily_spend, previous_date);
            let delta = current_spend - previous_spend;
            let residual = delta * residual_ratio;

            TrendPoint {
                index,
                current_date,
                previous_date,
                current_spend: round2(current_spend),
                previous_spend: round2(previous_spend),
                delta: round2(delta),
                explained_value: round2(delta - residual),
                residual_value: round2(residual),
                top_services: top_service_shifts(aggregated, current_date, previous_date),
            }
        })
        .collect()
}

fn top_service_shifts(
    aggregated: &AggregatedWindows,
    current_date: Option<NaiveDate>,
    previous_date: Option<NaiveDate>,
) -> Vec<ServiceShift> {
    let empty = BTreeMap::new();
    let current = current_date
        .and_then(|d| aggregated.service_daily.get(&d))
        .unwrap_or(&empty);
    let previous = previous_date
        .and_then(|d| aggregated.service_daily.get(&d))
        .unwrap_or(&empty);

    let services: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();
    let mut shifts: Vec<ServiceShift> = services
        .into_iter()
        .filter_map(|service| {
            let shift = current.get(service).copied().unwrap_or(0.0)
                - previous.get(service).copied().unwrap_or(0.0);
            let shift = round2(shift);
            (shift != 0.0).then(|| ServiceShift {
                service: service.clone(),
                shift,
            })
        })
        .collect();

    shifts.sort_by(|a, b| compare_by_magnitude(a.shift, &a.service, b.shift, &b.service));
    shifts.truncate(TOP_SERVICES_PER_POINT);
    shifts
}

/// 下钻明细用的简化日序列（无残差叠加）
pub fn build_detail_trend(
    windows: &ResolvedWindows,
    aggregated: &AggregatedWindows,
) -> Vec<DetailTrendPoint> {
    aligned_days(windows)
        .into_iter()
        .enumerate()
        .map(|(index, (current_date, previous_date))| {
            let current_spend = spend_on(&aggregated.daily_spend, current_date);
            let previous_spend = spend_on(&aggregated.daily_spend, previous_date);
            DetailTrendPoint {
                index,
                current_date,
                previous_date,
                current_spend: round2(current_spend),
                previous_spend: round2(previous_spend),
                delta: round2(current_spend - previous_spend),
            }
        })
        .collect()
}
