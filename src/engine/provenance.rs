// ==========================================
// 云成本变动归因 - 运行溯源
// ==========================================
// 职责: 内容派生的运行 ID + 每次调用的请求 ID
// 规则: run_id = "run_" + sha256(规范化 JSON) 前 16 位十六进制
//       规范化 JSON 键名有序；来源 ID 在请求校验阶段已排序去重
// ==========================================

use crate::domain::variance::{ResolvedControls, RowCounts, RunProvenance};
use crate::engine::numeric::round2;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunFingerprint<'a> {
    engine_version: &'a str,
    controls: &'a ResolvedControls,
    row_counts: &'a RowCounts,
    previous_total: f64,
    current_total: f64,
}

/// 内容派生运行 ID
pub fn run_id(
    controls: &ResolvedControls,
    row_counts: &RowCounts,
    previous_total: f64,
    current_total: f64,
) -> String {
    let fingerprint = RunFingerprint {
        engine_version: ENGINE_VERSION,
        controls,
        row_counts,
        previous_total: round2(previous_total),
        current_total: round2(current_total),
    };
    // serde_json::Value 的对象键有序
    let canonical = serde_json::to_value(&fingerprint)
        .map(|value| value.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("run_{}", &hex[..16])
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn build_provenance(
    controls: &ResolvedControls,
    row_counts: RowCounts,
    previous_total: f64,
    current_total: f64,
    data_as_of: Option<NaiveDate>,
) -> RunProvenance {
    RunProvenance {
        run_id: run_id(controls, &row_counts, previous_total, current_total),
        request_id: new_request_id(),
        engine_version: ENGINE_VERSION.to_string(),
        generated_at: Utc::now(),
        data_as_of,
        source_ids: controls.source_ids.clone(),
        row_counts,
    }
}
