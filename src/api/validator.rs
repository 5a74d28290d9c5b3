// ==========================================
// 云成本变动归因 - 请求校验与规范化
// ==========================================
// 职责: 将原始请求收敛为引擎输入 VarianceQuery
// 规则:
//   - 缺省值取自 VarianceConfig（范围、行数限制）
//   - 无法识别的范围 / 对比模式 / 口径 / 维度 / 日期 -> InvalidInput
//   - custom 范围未给任何日期时回退到默认范围
//   - 来源 ID 去空白、排序、去重
// ==========================================

use crate::api::dto::CostVarianceRequest;
use crate::api::error::{ApiError, ApiResult};
use crate::config::variance_config::VarianceConfig;
use crate::domain::filters::{FilterValue, ScopeFilters, TagPredicate};
use crate::domain::types::{CompareMode, CostBasis, Dimension, RangeSpec};
use crate::engine::orchestrator::VarianceQuery;
use chrono::NaiveDate;
use tracing::debug;

pub struct RequestValidator<'a> {
    config: &'a VarianceConfig,
}

impl<'a> RequestValidator<'a> {
    pub fn new(config: &'a VarianceConfig) -> Self {
        Self { config }
    }

    /// 规范化请求
    ///
    /// # 参数
    /// - `req`: 原始请求
    /// - `today`: 请求未覆盖 as_of 时使用的当前日期
    pub fn normalize(&self, req: &CostVarianceRequest, today: NaiveDate) -> ApiResult<VarianceQuery> {
        let start = parse_date("startDate", req.start_date.as_deref())?;
        let end = parse_date("endDate", req.end_date.as_deref())?;
        let previous_start = parse_date("previousStartDate", req.previous_start_date.as_deref())?;
        let previous_end = parse_date("previousEndDate", req.previous_end_date.as_deref())?;
        let as_of = parse_date("asOf", req.as_of.as_deref())?.unwrap_or(today);

        let range = self.parse_range(req.range.as_deref(), start, end)?;

        let compare = match non_blank(req.compare_to.as_deref()) {
            Some(raw) => raw.parse::<CompareMode>().map_err(ApiError::InvalidInput)?,
            None => CompareMode::default(),
        };

        let cost_basis = match non_blank(req.cost_basis.as_deref()) {
            Some(raw) => raw.parse::<CostBasis>().map_err(ApiError::InvalidInput)?,
            None => CostBasis::default(),
        };

        let primary_dimension = match non_blank(req.primary_dimension.as_deref()) {
            Some(raw) => {
                let dimension = raw.parse::<Dimension>().map_err(ApiError::InvalidInput)?;
                if !Dimension::ROLLUP.contains(&dimension) {
                    return Err(ApiError::InvalidInput(format!(
                        "主维度不支持: {}",
                        dimension
                    )));
                }
                dimension
            }
            None => Dimension::Service,
        };

        let min_change = match req.min_change {
            Some(v) if !v.is_finite() => {
                return Err(ApiError::InvalidInput("minChange 必须为有限数值".to_string()))
            }
            Some(v) => v.max(0.0),
            None => 0.0,
        };

        let query = VarianceQuery {
            filters: self.parse_filters(req)?,
            range,
            compare,
            previous_start,
            previous_end,
            cost_basis,
            primary_dimension,
            min_change,
            row_limit: self.config.materiality.clamp_row_limit(req.row_limit),
            source_ids: normalize_source_ids(&req.source_ids),
            as_of,
        };

        debug!(
            range = %query.range.label(),
            compare = %query.compare,
            basis = %query.cost_basis,
            dimension = %query.primary_dimension,
            row_limit = query.row_limit,
            sources = query.source_ids.len(),
            "请求规范化完成"
        );

        Ok(query)
    }

    fn parse_range(
        &self,
        raw: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ApiResult<RangeSpec> {
        let raw = non_blank(raw).unwrap_or(self.config.default_range.as_str());
        let range = RangeSpec::parse(raw, start, end).map_err(ApiError::InvalidInput)?;
        if let RangeSpec::Custom {
            start: None,
            end: None,
        } = range
        {
            return RangeSpec::parse(&self.config.default_range, None, None)
                .map_err(ApiError::InvalidInput);
        }
        Ok(range)
    }

    fn parse_filters(&self, req: &CostVarianceRequest) -> ApiResult<ScopeFilters> {
        let tag = match (
            non_blank(req.tag_key.as_deref()),
            non_blank(req.tag_value.as_deref()),
        ) {
            (Some(key), Some(value)) => Some(TagPredicate {
                key: key.to_string(),
                value: value.to_string(),
            }),
            (None, None) => None,
            _ => {
                return Err(ApiError::InvalidInput(
                    "tagKey 与 tagValue 必须同时提供".to_string(),
                ))
            }
        };

        Ok(ScopeFilters {
            provider: FilterValue::parse(req.provider.as_deref()),
            service: FilterValue::parse(req.service.as_deref()),
            region: FilterValue::parse(req.region.as_deref()),
            account: FilterValue::parse(req.account.as_deref()),
            sub_account: FilterValue::parse(req.sub_account.as_deref()),
            team: FilterValue::parse(req.team.as_deref()),
            app: FilterValue::parse(req.app.as_deref()),
            env: FilterValue::parse(req.env.as_deref()),
            cost_category: FilterValue::parse(req.cost_category.as_deref()),
            tag,
        })
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(field: &str, raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match non_blank(raw) {
        None => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| ApiError::InvalidInput(format!("{} 日期格式错误 ({}): {}", field, value, e))),
    }
}

pub fn normalize_source_ids(raw: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = raw
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
