// ==========================================
// 云成本变动归因 - API DTO 定义
// ==========================================
// 职责: 定义变动归因与下钻明细的请求结构
// 约束: 入参全部为可选原始值，由 validator 统一规范化
// ==========================================

use crate::domain::types::Dimension;
use crate::domain::variance::{DimensionRow, TopDriver};
use serde::{Deserialize, Serialize};

// ==========================================
// get_cost_variance - 成本变动归因
// ==========================================

/// 成本变动归因请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostVarianceRequest {
    /// 作用域过滤（"All" 或具体值）
    pub provider: Option<String>,
    pub service: Option<String>,
    pub region: Option<String>,
    pub account: Option<String>,
    pub sub_account: Option<String>,
    pub team: Option<String>,
    pub app: Option<String>,
    pub env: Option<String>,
    pub cost_category: Option<String>,

    /// 标签过滤（键、值须同时提供）
    pub tag_key: Option<String>,
    pub tag_value: Option<String>,

    /// 时间范围: "30d" / "mtd" / "qtd" / "custom"
    pub range: Option<String>,

    /// 对比模式: previous_period / same_period_last_month / custom_previous / none
    pub compare_to: Option<String>,

    /// 显式日期 (YYYY-MM-DD)
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub previous_start_date: Option<String>,
    pub previous_end_date: Option<String>,

    /// 成本口径: actual / amortized / net
    pub cost_basis: Option<String>,

    /// 主维度: service / account / region / team / sku
    pub primary_dimension: Option<String>,

    pub min_change: Option<f64>,
    pub row_limit: Option<usize>,

    /// 账单上传/数据源 ID（至少一个）
    pub source_ids: Vec<String>,

    /// 覆盖"今天"（YYYY-MM-DD），缺省取当前 UTC 日期
    pub as_of: Option<String>,
}

// ==========================================
// get_driver_detail - 驱动因素下钻
// ==========================================

/// 先前返回的驱动对象引用（TopDriver / DimensionRow 的 JSON 均可直接反序列化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverReference {
    pub dimension: Dimension,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&TopDriver> for DriverReference {
    fn from(driver: &TopDriver) -> Self {
        Self {
            dimension: driver.dimension,
            key: driver.key.clone(),
            name: Some(driver.name.clone()),
        }
    }
}

impl From<&DimensionRow> for DriverReference {
    fn from(row: &DimensionRow) -> Self {
        Self {
            dimension: row.dimension,
            key: row.key.clone(),
            name: Some(row.name.clone()),
        }
    }
}

/// 下钻请求: dimension + key，或 driver 对象二选一（driver 优先）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDetailRequest {
    #[serde(flatten)]
    pub scope: CostVarianceRequest,

    #[serde(default)]
    pub dimension: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub driver: Option<DriverReference>,
}
