// ==========================================
// 云成本变动归因 - 引擎编排器
// ==========================================
// 用途: 协调作用域过滤 -> 窗口解析 -> 聚合 -> 分解 -> 汇总/瀑布/置信度/趋势
// 约束: 同步、单请求单线程；全部中间状态每次调用新建，不跨请求共享
// 约束: 本期与上期均来自同一份已拉取的行集
// ==========================================

use crate::config::variance_config::VarianceConfig;
use crate::domain::billing::BillingRow;
use crate::domain::filters::ScopeFilters;
use crate::domain::types::{CompareMode, CostBasis, Dimension, RangeSpec};
use crate::domain::variance::{
    ConfidenceScore, DecompositionBlock, DriverDetail, LegacyDrivers, RateUsageSplit,
    ReportStatus, ResolvedControls, RowCounts, UnexplainedDetail, VarianceReport,
    VarianceSummary, Waterfall, REPORT_SCHEMA_VERSION,
};
use crate::engine::aggregator::LineAggregator;
use crate::engine::confidence::{ConfidenceScorer, ConfidenceSignals};
use crate::engine::decomposition::DecompositionEngine;
use crate::engine::detail::DriverDetailResolver;
use crate::engine::links::DeepLinkBuilder;
use crate::engine::numeric::{percent_of, round2, sole_currency};
use crate::engine::provenance::build_provenance;
use crate::engine::report;
use crate::engine::rollup::DimensionRollup;
use crate::engine::scope_filter::ScopeFilter;
use crate::engine::trend::build_trend;
use crate::engine::waterfall::WaterfallBuilder;
use crate::engine::window::{ResolvedWindows, WindowRequest, WindowResolver};
use chrono::NaiveDate;
use tracing::{debug, info};

// ==========================================
// VarianceQuery - 规范化后的引擎输入
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceQuery {
    pub filters: ScopeFilters,
    pub range: RangeSpec,
    pub compare: CompareMode,
    pub previous_start: Option<NaiveDate>,
    pub previous_end: Option<NaiveDate>,
    pub cost_basis: CostBasis,
    pub primary_dimension: Dimension,
    pub min_change: f64,
    /// 已收敛到 [min, max] 的行数限制
    pub row_limit: usize,
    pub source_ids: Vec<String>,
    /// "今天"，晚于该日期的行视为未来数据
    pub as_of: NaiveDate,
}

// ==========================================
// EmptyReason - 空结果原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoSources,
    NoScopedRows,
    EmptyCurrentWindow,
}

impl EmptyReason {
    pub fn message(self) -> &'static str {
        match self {
            EmptyReason::NoSources => "未找到可用的账单数据源，请先选择或上传账单",
            EmptyReason::NoScopedRows => "当前过滤条件下没有账单数据",
            EmptyReason::EmptyCurrentWindow => "所选时间范围内没有账单数据",
        }
    }
}

// ==========================================
// VarianceEngine - 成本变动归因引擎
// ==========================================
pub struct VarianceEngine {
    config: VarianceConfig,
}

impl VarianceEngine {
    pub fn new(config: VarianceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VarianceConfig {
        &self.config
    }

    /// 执行完整的变动归因
    ///
    /// # 参数
    /// - `query`: 规范化后的请求
    /// - `rows`: 数据源拉取的全部行（只读）
    ///
    /// # 返回
    /// 完整报告；无数据源 / 过滤后无数据 / 本期为空时返回空信封
    pub fn analyze(&self, query: &VarianceQuery, rows: &[BillingRow]) -> VarianceReport {
        let mut counts = RowCounts {
            fetched: rows.len(),
            ..Default::default()
        };

        if query.source_ids.is_empty() {
            return self.empty_report(query, EmptyReason::NoSources, counts, None);
        }

        let (scoped, windows) = self.prepare(query, rows);
        counts.scoped = scoped.len();
        info!(
            fetched = counts.fetched,
            scoped = counts.scoped,
            range = %query.range.label(),
            compare = %query.compare,
            "作用域过滤完成"
        );

        if scoped.is_empty() {
            return self.empty_report(query, EmptyReason::NoScopedRows, counts, None);
        }
        if windows.is_empty() {
            return self.empty_report(query, EmptyReason::EmptyCurrentWindow, counts, Some(&windows));
        }

        // 1. 聚合
        let aggregated = LineAggregator::new(&self.config, query.cost_basis).aggregate(
            &scoped,
            &windows,
            query.as_of,
        );
        counts = RowCounts {
            fetched: counts.fetched,
            scoped: counts.scoped,
            ..aggregated.counts.clone()
        };

        // 2. 分解
        let decomposition = DecompositionEngine::decompose(&aggregated);
        let coverage = decomposition.quantity.percent();

        // 3. 瀑布桥
        let waterfall = WaterfallBuilder::new(self.config.balance_tolerance).build(
            aggregated.previous_total,
            aggregated.current_total,
            &decomposition.global,
            coverage,
        );
        let net_change = round2(waterfall.end_value - waterfall.start_value);

        // 4. 维度汇总
        let links = self.links(query);
        let block = DimensionRollup {
            materiality: &self.config.materiality,
            risk: &self.config.risk,
            links: &links,
        }
        .build(
            &aggregated,
            &decomposition,
            net_change,
            query.min_change,
            query.row_limit,
            query.primary_dimension,
        );

        // 5. 置信度
        let (provider_count, top_provider_share) = aggregated.provider_concentration();
        let day_coverage = if windows.expected_current_days == 0 {
            100.0
        } else {
            percent_of(windows.current.len() as f64, windows.expected_current_days as f64)
        };
        let confidence = ConfidenceScorer::new(&self.config.confidence).score(&ConfidenceSignals {
            currency_count: aggregated.currencies.len(),
            model_residual: waterfall.model_residual,
            net_change,
            quantity_coverage_percent: coverage,
            untagged_share_percent: aggregated.untagged_share_percent(),
            sku_coverage_percent: aggregated.sku_coverage_percent(),
            day_coverage_percent: day_coverage,
            provider_count,
            top_provider_share_percent: top_provider_share,
        });

        // 6. 趋势
        let trend = build_trend(
            &windows,
            &aggregated,
            waterfall.model_residual + waterfall.rounding_residual,
            net_change,
        );

        // 7. 报告组装
        let primary_table = block.table(query.primary_dimension);
        let top_drivers = report::build_top_drivers(primary_table, self.config.top_driver_limit);
        let summary = report::build_summary(&aggregated, &windows, &waterfall, query.primary_dimension);
        let kpis = report::build_kpis(&summary, &waterfall, &top_drivers, &confidence);
        let rate_vs_usage = report::build_rate_vs_usage(&decomposition, &self.config);
        let legacy = report::build_legacy(primary_table);
        let warnings = report::build_governance_warnings(
            &confidence,
            &counts,
            &waterfall,
            windows.compare_fallback_applied,
            sole_currency(&summary.currencies),
        );
        let unexplained = report::build_unexplained(&waterfall, warnings);

        let controls = self.controls(query, Some(&windows));
        let provenance = build_provenance(
            &controls,
            counts,
            aggregated.previous_total,
            aggregated.current_total,
            windows.latest_available(),
        );

        info!(
            run_id = %provenance.run_id,
            net_change,
            balanced = waterfall.validation.is_balanced,
            confidence = confidence.score,
            "成本变动归因完成"
        );

        VarianceReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            status: ReportStatus::Ok,
            message: None,
            controls,
            summary,
            kpis,
            waterfall,
            trend,
            decomposition: block,
            top_drivers,
            rate_vs_usage,
            unexplained,
            confidence,
            provenance,
            legacy,
        }
    }

    /// 空结果信封
    pub fn empty_report(
        &self,
        query: &VarianceQuery,
        reason: EmptyReason,
        counts: RowCounts,
        windows: Option<&ResolvedWindows>,
    ) -> VarianceReport {
        info!(reason = ?reason, "返回空结果信封");

        let controls = self.controls(query, windows);
        let provenance = build_provenance(
            &controls,
            counts,
            0.0,
            0.0,
            windows.and_then(|w| w.latest_available()),
        );

        VarianceReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            status: ReportStatus::Empty,
            message: Some(reason.message().to_string()),
            controls,
            summary: VarianceSummary::default(),
            kpis: Vec::new(),
            waterfall: Waterfall::default(),
            trend: Vec::new(),
            decomposition: DecompositionBlock {
                primary_dimension: Some(query.primary_dimension),
                materiality_threshold: self.config.materiality.floor,
                row_limit: query.row_limit,
                tables: Vec::new(),
            },
            top_drivers: Vec::new(),
            rate_vs_usage: RateUsageSplit::default(),
            unexplained: UnexplainedDetail::default(),
            confidence: ConfidenceScore::default(),
            provenance,
            legacy: LegacyDrivers::default(),
        }
    }

    /// 驱动因素下钻
    ///
    /// 窗口由作用域内全部行解析，再限定到匹配的维度取值
    pub fn detail(
        &self,
        query: &VarianceQuery,
        rows: &[BillingRow],
        dimension: Dimension,
        key: &str,
    ) -> DriverDetail {
        if query.source_ids.is_empty() {
            return DriverDetail::empty(dimension, key, EmptyReason::NoSources.message());
        }

        let (scoped, windows) = self.prepare(query, rows);
        if scoped.is_empty() {
            return DriverDetail::empty(dimension, key, EmptyReason::NoScopedRows.message());
        }
        if windows.is_empty() {
            return DriverDetail::empty(dimension, key, EmptyReason::EmptyCurrentWindow.message());
        }

        let links = self.links(query);
        DriverDetailResolver::new(&self.config, query.cost_basis, &links).resolve(
            &scoped,
            &windows,
            query.as_of,
            dimension,
            key,
        )
    }

    // ==========================================
    // 内部方法
    // ==========================================

    /// 作用域过滤 + 窗口解析
    fn prepare<'r>(
        &self,
        query: &VarianceQuery,
        rows: &'r [BillingRow],
    ) -> (Vec<&'r BillingRow>, ResolvedWindows) {
        let scoped = ScopeFilter::new(&query.filters, &self.config.tag_keys).apply(rows);
        let available = WindowResolver::collect_day_keys(scoped.iter().copied(), query.as_of);
        let windows = WindowResolver::resolve(
            available,
            &WindowRequest {
                range: query.range,
                compare: query.compare,
                previous_start: query.previous_start,
                previous_end: query.previous_end,
                same_period_min_coverage: self.config.same_period_min_coverage,
            },
        );
        debug!(
            current = windows.current.len(),
            previous = windows.previous.len(),
            fallback = windows.compare_fallback_applied,
            "窗口解析完成"
        );
        (scoped, windows)
    }

    fn links(&self, query: &VarianceQuery) -> DeepLinkBuilder {
        DeepLinkBuilder::new(
            &self.config.link_base_path,
            &query.filters,
            &query.range.label(),
            query.compare,
        )
    }

    /// 回显控制项；窗口已解析时回显实际起止日期
    fn controls(&self, query: &VarianceQuery, windows: Option<&ResolvedWindows>) -> ResolvedControls {
        let (requested_start, requested_end) = match query.range {
            RangeSpec::Custom { start, end } => (start, end),
            _ => (None, None),
        };
        let current = windows.map(|w| w.current.as_slice()).unwrap_or(&[]);
        let previous = windows.map(|w| w.previous.as_slice()).unwrap_or(&[]);

        ResolvedControls {
            filters: query.filters.clone(),
            range: query.range.label(),
            compare_to: query.compare,
            cost_basis: query.cost_basis,
            primary_dimension: query.primary_dimension,
            min_change: query.min_change,
            row_limit: query.row_limit,
            start_date: current.first().copied().or(requested_start),
            end_date: current.last().copied().or(requested_end),
            previous_start_date: previous.first().copied().or(query.previous_start),
            previous_end_date: previous.last().copied().or(query.previous_end),
            source_ids: query.source_ids.clone(),
            as_of: query.as_of,
            compare_fallback_applied: windows.map(|w| w.compare_fallback_applied).unwrap_or(false),
        }
    }
}
