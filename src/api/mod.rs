// ==========================================
// 动态台账导入系统 - API 层
// ==========================================
// 职责: 受理导入请求,查询任务状态
// 红线: API 层不含校验/提交逻辑,仅编排
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, ImportHandle};
