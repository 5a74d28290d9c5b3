// ==========================================
// 云成本变动归因 - 时间窗口解析
// ==========================================
// 职责: 由作用域内可用日期键推导本期/上期日期集合
// 输入: 可用日期键（升序去重，不含未来日期）+ 范围 + 对比模式
// 输出: ResolvedWindows（本期、上期互不相交，均为可用日期的连续子序列）
// 约束: 无数据时返回空本期，由调用方按空结果处理，不报错
// ==========================================

use crate::domain::billing::BillingRow;
use crate::domain::types::{CompareMode, RangeSpec};
use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeSet;
use tracing::debug;

/// 窗口归属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSide {
    Current,
    Previous,
}

/// 窗口请求参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRequest {
    pub range: RangeSpec,
    pub compare: CompareMode,
    pub previous_start: Option<NaiveDate>,
    pub previous_end: Option<NaiveDate>,
    /// same_period_last_month 最低覆盖比例
    pub same_period_min_coverage: f64,
}

/// 窗口解析结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedWindows {
    pub available: Vec<NaiveDate>,
    pub current: Vec<NaiveDate>,
    pub previous: Vec<NaiveDate>,
    /// 本期应有的日历天数（用于日覆盖率）
    pub expected_current_days: usize,
    /// 对比模式回退到相邻区间
    pub compare_fallback_applied: bool,
}

impl ResolvedWindows {
    pub fn side(&self, day: NaiveDate) -> Option<WindowSide> {
        if self.current.binary_search(&day).is_ok() {
            Some(WindowSide::Current)
        } else if self.previous.binary_search(&day).is_ok() {
            Some(WindowSide::Previous)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn latest_available(&self) -> Option<NaiveDate> {
        self.available.last().copied()
    }
}

// ==========================================
// WindowResolver - 时间窗口解析器
// ==========================================
// 无状态,所有参数通过调用传入
pub struct WindowResolver;

impl WindowResolver {
    /// 收集可用日期键: 有账单行、且不晚于 as_of
    pub fn collect_day_keys<'r, I>(rows: I, as_of: NaiveDate) -> Vec<NaiveDate>
    where
        I: IntoIterator<Item = &'r BillingRow>,
    {
        let set: BTreeSet<NaiveDate> = rows
            .into_iter()
            .filter_map(|row| row.day_key())
            .filter(|day| *day <= as_of)
            .collect();
        set.into_iter().collect()
    }

    /// 解析本期与上期
    pub fn resolve(available: Vec<NaiveDate>, request: &WindowRequest) -> ResolvedWindows {
        let Some(&latest) = available.last() else {
            debug!("无可用日期,返回空窗口");
            return ResolvedWindows::default();
        };

        let (current, nominal_days) = Self::current_window(&available, request.range, latest);
        if current.is_empty() {
            debug!(range = %request.range.label(), "本期窗口为空");
            return ResolvedWindows {
                available,
                ..Default::default()
            };
        }

        let span_days = calendar_span(&current);
        let expected_current_days = span_days.max(nominal_days);

        let (previous, compare_fallback_applied) =
            Self::previous_window(&available, &current, request);

        debug!(
            available = available.len(),
            current = current.len(),
            previous = previous.len(),
            fallback = compare_fallback_applied,
            "时间窗口解析完成"
        );

        ResolvedWindows {
            available,
            current,
            previous,
            expected_current_days,
            compare_fallback_applied,
        }
    }

    // ==========================================
    // 本期窗口
    // ==========================================

    /// # 返回
    /// (本期日期, 名义天数)
    fn current_window(
        available: &[NaiveDate],
        range: RangeSpec,
        latest: NaiveDate,
    ) -> (Vec<NaiveDate>, usize) {
        match range {
            RangeSpec::LastDays(n) => {
                let n = n as usize;
                let start = available.len().saturating_sub(n);
                (available[start..].to_vec(), n)
            }
            RangeSpec::MonthToDate => {
                let days = available
                    .iter()
                    .copied()
                    .filter(|d| d.year() == latest.year() && d.month() == latest.month())
                    .collect();
                (days, latest.day() as usize)
            }
            RangeSpec::QuarterToDate => {
                let quarter = quarter_of(latest);
                let days = available
                    .iter()
                    .copied()
                    .filter(|d| d.year() == latest.year() && quarter_of(*d) == quarter)
                    .collect();
                let quarter_start =
                    NaiveDate::from_ymd_opt(latest.year(), (quarter - 1) * 3 + 1, 1).unwrap_or(latest);
                let nominal = (latest - quarter_start).num_days() + 1;
                (days, nominal.max(0) as usize)
            }
            RangeSpec::Custom { start, end } => {
                let first = available.first().copied().unwrap_or(latest);
                let mut lo = start.unwrap_or(first);
                let mut hi = end.unwrap_or(latest);
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                let days = select_between(available, lo, hi);
                // 名义天数只计到最新可用日期为止
                let nominal_end = hi.min(latest);
                let nominal = if nominal_end >= lo {
                    (nominal_end - lo).num_days() + 1
                } else {
                    0
                };
                (days, nominal as usize)
            }
        }
    }

    // ==========================================
    // 上期窗口
    // ==========================================

    /// # 返回
    /// (上期日期, 是否回退到相邻区间)
    fn previous_window(
        available: &[NaiveDate],
        current: &[NaiveDate],
        request: &WindowRequest,
    ) -> (Vec<NaiveDate>, bool) {
        let current_start = current[0];
        let current_end = current[current.len() - 1];

        match request.compare {
            CompareMode::None => (Vec::new(), false),
            CompareMode::PreviousPeriod => (block_before(available, current), false),
            CompareMode::CustomPrevious => {
                if request.previous_start.is_none() && request.previous_end.is_none() {
                    return (block_before(available, current), true);
                }
                let first = available.first().copied().unwrap_or(current_start);
                let mut lo = request.previous_start.unwrap_or(first);
                let mut hi = request
                    .previous_end
                    .unwrap_or_else(|| current_start.pred_opt().unwrap_or(current_start));
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                // 与本期不相交: 截止到本期起点之前
                let days = select_between(available, lo, hi)
                    .into_iter()
                    .filter(|d| *d < current_start)
                    .collect();
                (days, false)
            }
            CompareMode::SamePeriodLastMonth => {
                let shifted = current_start
                    .checked_sub_months(Months::new(1))
                    .zip(current_end.checked_sub_months(Months::new(1)));
                let Some((lo, hi)) = shifted else {
                    return (block_before(available, current), true);
                };

                let days: Vec<NaiveDate> = select_between(available, lo, hi)
                    .into_iter()
                    .filter(|d| *d < current_start)
                    .collect();

                let required =
                    (current.len() as f64 * request.same_period_min_coverage).ceil() as usize;
                if days.len() < required {
                    (block_before(available, current), true)
                } else {
                    (days, false)
                }
            }
        }
    }
}

/// 紧邻本期之前、长度与本期相同的连续可用日期块
fn block_before(available: &[NaiveDate], current: &[NaiveDate]) -> Vec<NaiveDate> {
    let current_start = current[0];
    let end = available.partition_point(|d| *d < current_start);
    let start = end.saturating_sub(current.len());
    available[start..end].to_vec()
}

fn select_between(available: &[NaiveDate], lo: NaiveDate, hi: NaiveDate) -> Vec<NaiveDate> {
    let start = available.partition_point(|d| *d < lo);
    let end = available.partition_point(|d| *d <= hi);
    if start >= end {
        return Vec::new();
    }
    available[start..end].to_vec()
}

fn quarter_of(day: NaiveDate) -> u32 {
    (day.month() - 1) / 3 + 1
}

fn calendar_span(days: &[NaiveDate]) -> usize {
    match (days.first(), days.last()) {
        (Some(first), Some(last)) => ((*last - *first).num_days() + 1).max(0) as usize,
        _ => 0,
    }
}
