// ==========================================
// 云成本变动归因 - 成本变动 API
// ==========================================
// 职责: 请求规范化 -> 解析数据源 -> 单次拉取账单行 -> 调用引擎
// 架构: API 层 → Engine 层 (VarianceEngine) / Repository 层 (BillingRowSource)
// 约束: 每个请求只拉取一次行集；取数失败记录 error 后原样上抛，不重试
// ==========================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::api::dto::{CostVarianceRequest, DriverDetailRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::RequestValidator;
use crate::config::variance_config::VarianceConfig;
use crate::domain::billing::BillingRow;
use crate::domain::types::Dimension;
use crate::domain::variance::{DriverDetail, RowCounts, VarianceReport};
use crate::engine::orchestrator::{EmptyReason, VarianceEngine, VarianceQuery};
use crate::repository::billing_row_repo::BillingRowSource;

// ==========================================
// CostVarianceApi - 成本变动归因 API
// ==========================================
pub struct CostVarianceApi {
    source: Arc<dyn BillingRowSource>,
    config: VarianceConfig,
}

impl CostVarianceApi {
    /// 创建新的CostVarianceApi实例
    ///
    /// # 参数
    /// - source: 账单行数据源
    /// - config: 引擎配置（通常由 ConfigManager::load_variance_config 生成）
    pub fn new(source: Arc<dyn BillingRowSource>, config: VarianceConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &VarianceConfig {
        &self.config
    }

    /// 成本变动归因
    ///
    /// # 返回
    /// - Ok(VarianceReport): 完整报告或空信封
    /// - Err(ApiError::InvalidInput): 请求参数无法识别
    /// - Err(ApiError::UpstreamFetchError 等): 取数失败
    pub async fn get_cost_variance(&self, req: &CostVarianceRequest) -> ApiResult<VarianceReport> {
        let engine = VarianceEngine::new(self.config.clone());
        let mut query = RequestValidator::new(&self.config).normalize(req, Utc::now().date_naive())?;

        let Some(rows) = self.load_rows(&mut query).await? else {
            return Ok(engine.empty_report(&query, EmptyReason::NoSources, RowCounts::default(), None));
        };

        Ok(engine.analyze(&query, &rows))
    }

    /// 驱动因素下钻
    ///
    /// # 返回
    /// - Ok(DriverDetail): 无匹配数据时 summary 为 None
    /// - Err(ApiError::InvalidInput): 未指定维度/取值
    pub async fn get_driver_detail(&self, req: &DriverDetailRequest) -> ApiResult<DriverDetail> {
        let (dimension, key) = resolve_target(req)?;
        let engine = VarianceEngine::new(self.config.clone());
        let mut query =
            RequestValidator::new(&self.config).normalize(&req.scope, Utc::now().date_naive())?;

        let Some(rows) = self.load_rows(&mut query).await? else {
            return Ok(DriverDetail::empty(dimension, &key, EmptyReason::NoSources.message()));
        };

        Ok(engine.detail(&query, &rows, dimension, &key))
    }

    // ==========================================
    // 内部方法
    // ==========================================

    /// 解析数据源并拉取行集；无可用数据源时返回 None
    async fn load_rows(&self, query: &mut VarianceQuery) -> ApiResult<Option<Vec<BillingRow>>> {
        if query.source_ids.is_empty() {
            info!("请求未携带数据源ID");
            return Ok(None);
        }

        let resolved = self
            .source
            .resolve_source_ids(&query.source_ids)
            .await
            .map_err(|e| {
                error!(error = %e, "数据源解析失败");
                ApiError::from(e)
            })?;
        if resolved.is_empty() {
            info!(requested = ?query.source_ids, "数据源ID均无法解析");
            query.source_ids.clear();
            return Ok(None);
        }
        query.source_ids = resolved;

        let rows = self
            .source
            .fetch_rows(&query.source_ids)
            .await
            .map_err(|e| {
                error!(error = %e, sources = ?query.source_ids, "账单行拉取失败");
                ApiError::from(e)
            })?;

        info!(sources = query.source_ids.len(), rows = rows.len(), "账单行拉取完成");
        Ok(Some(rows))
    }
}

/// 下钻目标: driver 对象优先，其次 dimension + key
fn resolve_target(req: &DriverDetailRequest) -> ApiResult<(Dimension, String)> {
    if let Some(driver) = &req.driver {
        return Ok((driver.dimension, driver.key.clone()));
    }

    let dimension = req
        .dimension
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("下钻请求缺少 dimension".to_string()))?
        .parse::<Dimension>()
        .map_err(ApiError::InvalidInput)?;

    let key = req
        .key
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("下钻请求缺少 key".to_string()))?;

    Ok((dimension, key.to_string()))
}
