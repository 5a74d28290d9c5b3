// ==========================================
// 云成本变动归因 - 配置管理器
// ==========================================
// 职责: 从 config_kv 表读取全局覆写项，生成完整的 VarianceConfig
// 存储: config_kv 表 (key-value + scope)
// 约束: 非法覆写值忽略并告警，不影响其余配置
// ==========================================

use crate::config::variance_config::{ConfidenceConfig, RiskConfig, VarianceConfig};
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    // ==========================================
    // VarianceConfig 组装
    // ==========================================

    /// 读取标量覆写项；解析失败时返回 None 并告警
    fn scalar<T: FromStr>(&self, key: &str) -> RepositoryResult<Option<T>> {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(None);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                warn!(key = key, value = %raw, "配置值无法解析,使用默认值");
                Ok(None)
            }
        }
    }

    /// 读取 JSON 覆写项；解析失败时返回 None 并告警
    fn json_value<T: DeserializeOwned>(&self, key: &str) -> RepositoryResult<Option<T>> {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<T>(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(key = key, error = %e, "JSON 配置值无法解析,使用默认值");
                Ok(None)
            }
        }
    }

    /// 以默认配置为底，叠加 config_kv 中的全局覆写，得到完整配置
    pub fn load_variance_config(&self) -> RepositoryResult<VarianceConfig> {
        let mut cfg = VarianceConfig::default();

        if let Some(v) = self.scalar::<f64>(config_keys::MATERIALITY_FLOOR)? {
            if v >= 0.0 {
                cfg.materiality.floor = v;
            }
        }
        if let Some(v) = self.scalar::<f64>(config_keys::MATERIALITY_NET_SHARE)? {
            if (0.0..=1.0).contains(&v) {
                cfg.materiality.net_change_share = v;
            }
        }
        if let Some(v) = self.scalar::<usize>(config_keys::DEFAULT_ROW_LIMIT)? {
            cfg.materiality.default_row_limit = v;
        }
        if let Some(v) = self.scalar::<usize>(config_keys::TOP_DRIVER_LIMIT)? {
            cfg.top_driver_limit = v;
        }
        if let Some(v) = self.scalar::<f64>(config_keys::SAME_PERIOD_MIN_COVERAGE)? {
            if (0.0..=1.0).contains(&v) {
                cfg.same_period_min_coverage = v;
            } else {
                warn!(value = v, "same_period_min_coverage 超出 [0, 1],忽略");
            }
        }
        if let Some(v) = self.scalar::<f64>(config_keys::BALANCE_TOLERANCE)? {
            if v >= 0.0 {
                cfg.balance_tolerance = v;
            }
        }
        if let Some(v) = self.get_config_value(config_keys::DEFAULT_RANGE)? {
            if crate::domain::types::RangeSpec::parse(&v, None, None).is_ok() {
                cfg.default_range = v.trim().to_string();
            } else {
                warn!(value = %v, "默认时间范围无法识别,忽略");
            }
        }
        if let Some(v) = self.get_config_value(config_keys::LINK_BASE_PATH)? {
            cfg.link_base_path = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = self.json_value::<Vec<String>>(config_keys::CREDIT_KEYWORDS)? {
            cfg.credit_keywords = v;
        }
        if let Some(v) = self.json_value::<Vec<String>>(config_keys::TEAM_TAG_KEYS)? {
            cfg.tag_keys.team = v;
        }
        if let Some(v) = self.json_value::<RiskConfig>(config_keys::RISK_THRESHOLDS)? {
            cfg.risk = v;
        }
        if let Some(v) = self.json_value::<ConfidenceConfig>(config_keys::CONFIDENCE_RULES)? {
            cfg.confidence = v;
        }

        debug!(?cfg, "变动归因配置加载完成");
        Ok(cfg)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 重要性阈值
    pub const MATERIALITY_FLOOR: &str = "variance_materiality_floor";
    pub const MATERIALITY_NET_SHARE: &str = "variance_materiality_net_share";
    pub const DEFAULT_ROW_LIMIT: &str = "variance_default_row_limit";

    // 展示
    pub const TOP_DRIVER_LIMIT: &str = "variance_top_driver_limit";
    pub const LINK_BASE_PATH: &str = "variance_link_base_path";

    // 时间窗口
    pub const DEFAULT_RANGE: &str = "variance_default_range";
    pub const SAME_PERIOD_MIN_COVERAGE: &str = "variance_same_period_min_coverage";

    // 对账
    pub const BALANCE_TOLERANCE: &str = "variance_balance_tolerance";

    // 分类
    pub const CREDIT_KEYWORDS: &str = "variance_credit_keywords"; // JSON 数组
    pub const TEAM_TAG_KEYS: &str = "variance_team_tag_keys"; // JSON 数组

    // 分级规则
    pub const RISK_THRESHOLDS: &str = "variance_risk_thresholds"; // JSON 对象
    pub const CONFIDENCE_RULES: &str = "variance_confidence_rules"; // JSON 对象
}
