// ==========================================
// 云成本变动归因 - 账单明细仓储
// ==========================================
// 职责: 向引擎提供原始账单行（外部协作方接口 + SQLite / 内存实现）
// 红线: Repository 不含业务逻辑，只负责数据访问
// 约束: 每个请求只取数一次，本期与上期窗口共用同一份行集
// ==========================================

use crate::domain::billing::{BillingRow, TagValue};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// BillingRowSource Trait
// ==========================================
// 用途: 引擎唯一的 I/O 挂起点
// 实现者: SqliteBillingRowRepository, InMemoryBillingRowSource
#[async_trait]
pub trait BillingRowSource: Send + Sync {
    /// 过滤出实际存在的上传/数据源 ID（保持入参顺序、去重）
    async fn resolve_source_ids(&self, source_ids: &[String]) -> RepositoryResult<Vec<String>>;

    /// 拉取指定数据源的全部账单行
    async fn fetch_rows(&self, source_ids: &[String]) -> RepositoryResult<Vec<BillingRow>>;
}

fn dedup_preserving_order(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// 解析时间戳: RFC3339 / "YYYY-MM-DD HH:MM:SS" / "YYYY-MM-DD"，均按 UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

// ==========================================
// SqliteBillingRowRepository - SQLite 实现
// ==========================================
pub struct SqliteBillingRowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBillingRowRepository {
    /// 创建新的仓储实例（会初始化 schema）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 登记数据源
    pub fn register_source(&self, source_id: &str, label: Option<&str>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO billing_source (source_id, label) VALUES (?1, ?2)",
            params![source_id, label],
        )?;
        Ok(())
    }

    /// 批量写入账单行（单事务）
    ///
    /// # 返回
    /// 写入行数
    pub fn insert_rows(&self, source_id: &str, rows: &[BillingRow]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO billing_line_item (
                    source_id, charge_period_start, charge_period_end,
                    billed_cost, effective_cost, contracted_cost,
                    consumed_quantity, pricing_quantity, currency,
                    charge_category, commitment_discount_id,
                    provider, service_name, region_name,
                    account_id, account_name, sub_account,
                    sku, resource_id, resource_name, tags_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                "#,
            )?;
            for row in rows {
                let tags_json = if row.tags.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&row.tags)?)
                };
                stmt.execute(params![
                    source_id,
                    row.charge_period_start.map(|ts| ts.to_rfc3339()),
                    row.charge_period_end.map(|ts| ts.to_rfc3339()),
                    row.billed_cost,
                    row.effective_cost,
                    row.contracted_cost,
                    row.consumed_quantity,
                    row.pricing_quantity,
                    row.currency,
                    row.charge_category,
                    row.commitment_discount_id,
                    row.provider,
                    row.service_name,
                    row.region_name,
                    row.account_id,
                    row.account_name,
                    row.sub_account,
                    row.sku,
                    row.resource_id,
                    row.resource_name,
                    tags_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn resolve_blocking(&self, source_ids: &[String]) -> RepositoryResult<Vec<String>> {
        let wanted = dedup_preserving_order(source_ids);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = placeholders(wanted.len());
        let sql = format!(
            "SELECT source_id FROM billing_source WHERE source_id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let found: Vec<String> = stmt
            .query_map(params_from_iter(wanted.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;

        Ok(wanted.into_iter().filter(|id| found.contains(id)).collect())
    }

    fn fetch_blocking(&self, source_ids: &[String]) -> RepositoryResult<Vec<BillingRow>> {
        let wanted = dedup_preserving_order(source_ids);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT
                charge_period_start, charge_period_end,
                billed_cost, effective_cost, contracted_cost,
                consumed_quantity, pricing_quantity, currency,
                charge_category, commitment_discount_id,
                provider, service_name, region_name,
                account_id, account_name, sub_account,
                sku, resource_id, resource_name, tags_json
            FROM billing_line_item
            WHERE source_id IN ({})
            ORDER BY line_id
            "#,
            placeholders(wanted.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw_rows = stmt.query_map(params_from_iter(wanted.iter()), |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                BillingRow {
                    charge_period_start: None,
                    charge_period_end: None,
                    billed_cost: row.get(2)?,
                    effective_cost: row.get(3)?,
                    contracted_cost: row.get(4)?,
                    consumed_quantity: row.get(5)?,
                    pricing_quantity: row.get(6)?,
                    currency: row.get(7)?,
                    charge_category: row.get(8)?,
                    commitment_discount_id: row.get(9)?,
                    provider: row.get(10)?,
                    service_name: row.get(11)?,
                    region_name: row.get(12)?,
                    account_id: row.get(13)?,
                    account_name: row.get(14)?,
                    sub_account: row.get(15)?,
                    sku: row.get(16)?,
                    resource_id: row.get(17)?,
                    resource_name: row.get(18)?,
                    tags: BTreeMap::new(),
                },
                row.get::<_, Option<String>>(19)?,
            ))
        })?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            let (start, end, mut row, tags_json) = raw?;
            row.charge_period_start = start.as_deref().and_then(parse_timestamp);
            row.charge_period_end = end.as_deref().and_then(parse_timestamp);
            if let Some(json) = tags_json.filter(|s| !s.trim().is_empty()) {
                row.tags = serde_json::from_str::<BTreeMap<String, TagValue>>(&json)?;
            }
            rows.push(row);
        }

        debug!(sources = wanted.len(), rows = rows.len(), "账单行读取完成");
        Ok(rows)
    }
}

fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl BillingRowSource for SqliteBillingRowRepository {
    async fn resolve_source_ids(&self, source_ids: &[String]) -> RepositoryResult<Vec<String>> {
        self.resolve_blocking(source_ids)
    }

    async fn fetch_rows(&self, source_ids: &[String]) -> RepositoryResult<Vec<BillingRow>> {
        self.fetch_blocking(source_ids)
    }
}

// ==========================================
// InMemoryBillingRowSource - 内存实现
// ==========================================
// 用途: 引擎级测试、离线样例
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingRowSource {
    sources: HashMap<String, Vec<BillingRow>>,
}

impl InMemoryBillingRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: &str, rows: Vec<BillingRow>) -> Self {
        self.sources.insert(source_id.to_string(), rows);
        self
    }
}

#[async_trait]
impl BillingRowSource for InMemoryBillingRowSource {
    async fn resolve_source_ids(&self, source_ids: &[String]) -> RepositoryResult<Vec<String>> {
        Ok(dedup_preserving_order(source_ids)
            .into_iter()
            .filter(|id| self.sources.contains_key(id))
            .collect())
    }

    async fn fetch_rows(&self, source_ids: &[String]) -> RepositoryResult<Vec<BillingRow>> {
        Ok(dedup_preserving_order(source_ids)
            .iter()
            .filter_map(|id| self.sources.get(id))
            .flat_map(|rows| rows.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_row(service: &str, cost: f64) -> BillingRow {
        let mut tags = BTreeMap::new();
        tags.insert("team".to_string(), TagValue::Text("core".to_string()));
        tags.insert("shard".to_string(), TagValue::Number(3.0));
        BillingRow {
            charge_period_start: Some(Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()),
            billed_cost: Some(cost),
            consumed_quantity: Some(10.0),
            currency: Some("USD".to_string()),
            service_name: Some(service.to_string()),
            tags,
            ..Default::default()
        }
    }

    fn memory_repo() -> SqliteBillingRowRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        SqliteBillingRowRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        for raw in ["2026-02-10T05:00:00Z", "2026-02-10 05:00:00", "2026-02-10"] {
            assert_eq!(parse_timestamp(raw).map(|t| t.date_naive()), Some(expected), "{}", raw);
        }
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_preserves_tags_and_nulls() {
        let repo = memory_repo();
        repo.register_source("upload-1", Some("feb export")).unwrap();
        let mut row = sample_row("EC2", 12.5);
        row.effective_cost = None;
        repo.insert_rows("upload-1", &[row, sample_row("S3", 3.0)]).unwrap();

        let resolved = repo
            .resolve_source_ids(&["upload-1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved, vec!["upload-1".to_string()]);

        let rows = repo.fetch_rows(&resolved).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].service_name.as_deref(), Some("EC2"));
        assert_eq!(rows[0].billed_cost, Some(12.5));
        assert_eq!(rows[0].effective_cost, None);
        assert_eq!(rows[0].tags.get("shard"), Some(&TagValue::Number(3.0)));
        assert_eq!(
            rows[0].day_key(),
            NaiveDate::from_ymd_opt(2026, 2, 10)
        );
    }

    #[tokio::test]
    async fn test_in_memory_source_resolves_known_ids_only() {
        let source = InMemoryBillingRowSource::new()
            .with_source("a", vec![sample_row("EC2", 1.0)])
            .with_source("b", vec![sample_row("S3", 2.0), sample_row("S3", 3.0)]);

        let ids = vec!["b".to_string(), " a ".to_string(), "b".to_string(), "zz".to_string()];
        let resolved = source.resolve_source_ids(&ids).await.unwrap();
        assert_eq!(resolved, vec!["b".to_string(), "a".to_string()]);

        let rows = source.fetch_rows(&resolved).await.unwrap();
        assert_eq!(rows.len(), 3);
    }
}
