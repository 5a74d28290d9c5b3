// ==========================================
// 云成本变动归因 - 引擎层
// ==========================================
// 职责: 变动分解与归因的全部计算，不做 I/O，不拼 SQL
// 数据流: scope_filter -> window -> aggregator -> decomposition
//         -> rollup / waterfall / confidence / trend -> report
// 红线: 引擎全函数（不返回错误），空状态以值表达
// ==========================================

pub mod aggregator;
pub mod arena;
pub mod confidence;
pub mod decomposition;
pub mod detail;
pub mod links;
pub mod numeric;
pub mod orchestrator;
pub mod provenance;
pub mod report;
pub mod rollup;
pub mod scope_filter;
pub mod trend;
pub mod waterfall;
pub mod window;

// 重导出核心引擎
pub use aggregator::{AggregatedWindows, LineAccumulator, LineAggregator, LineKey, PeriodTotals};
pub use arena::GroupArena;
pub use confidence::{ConfidenceScorer, ConfidenceSignals};
pub use decomposition::{decompose_line, Decomposition, DecompositionEngine, LineClass, QuantityCoverage};
pub use detail::DriverDetailResolver;
pub use links::DeepLinkBuilder;
pub use orchestrator::{EmptyReason, VarianceEngine, VarianceQuery};
pub use provenance::{run_id, ENGINE_VERSION};
pub use rollup::{materiality_threshold, reconcile_row, risk_level, DimensionRollup};
pub use scope_filter::ScopeFilter;
pub use waterfall::WaterfallBuilder;
pub use window::{ResolvedWindows, WindowRequest, WindowResolver, WindowSide};
