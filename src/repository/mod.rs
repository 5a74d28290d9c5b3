// ==========================================
// 云成本变动归因 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供账单行数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod billing_row_repo;
pub mod error;

// 重导出核心仓储
pub use billing_row_repo::{
    parse_timestamp, BillingRowSource, InMemoryBillingRowSource, SqliteBillingRowRepository,
};
pub use error::{RepositoryError, RepositoryResult};
