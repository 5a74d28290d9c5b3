// ==========================================
// 云成本变动归因 - API 层
// ==========================================
// 职责: 提供面向控制器的业务 API，请求校验与错误转换
// ==========================================

pub mod cost_variance_api;
pub mod dto;
pub mod error;
pub mod validator;

// 重导出核心类型
pub use cost_variance_api::CostVarianceApi;
pub use dto::{CostVarianceRequest, DriverDetailRequest, DriverReference};
pub use error::{ApiError, ApiResult};
pub use validator::RequestValidator;
