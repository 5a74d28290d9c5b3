// ==========================================
// 云成本变动归因 - 离线报告入口
// ==========================================
// 用法:
//   cost-variance <db_path> <source_id>[,<source_id>...] [range] [compare_to] [dimension]
//
// 示例:
//   cost-variance billing.db upload-2026-03 30d previous_period service
//
// 输出: 报告信封 JSON（stdout），日志写 stderr
// 环境变量: RUST_LOG 控制日志级别；COST_VARIANCE_LOG_JSON=1 输出 JSON 日志
// ==========================================

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use cloud_cost_variance::db::{init_schema, open_sqlite_connection};
use cloud_cost_variance::repository::SqliteBillingRowRepository;
use cloud_cost_variance::{logging, ConfigManager, CostVarianceApi, CostVarianceRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("COST_VARIANCE_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        logging::init_json();
    } else {
        logging::init();
    }

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        bail!("用法: cost-variance <db_path> <source_id>[,...] [range] [compare_to] [dimension]");
    };
    let source_ids: Vec<String> = args
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let request = CostVarianceRequest {
        source_ids,
        range: args.next(),
        compare_to: args.next(),
        primary_dimension: args.next(),
        ..Default::default()
    };

    tracing::info!("{} v{}", cloud_cost_variance::APP_NAME, cloud_cost_variance::VERSION);
    tracing::info!("使用数据库: {}", db_path);

    let conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库 {}", db_path))?;
    init_schema(&conn).context("数据库 schema 初始化失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())?
        .load_variance_config()
        .context("读取引擎配置失败")?;
    let source = Arc::new(SqliteBillingRowRepository::from_connection(conn));
    let api = CostVarianceApi::new(source, config);

    let report = api.get_cost_variance(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
