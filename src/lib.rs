// ==========================================
// 动态台账导入系统 - 核心库
// ==========================================
// 职责: CSV/Excel 批量导入到多租户动态台账
// 技术栈: Tokio + SQLite（任务/配置） + 远程协作方接口
// 流程: 受理 -> 取文件 -> 校验转换 -> 关联检查 -> 提交 -> 报告
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 任务存储与协作方接口
pub mod repository;

// 导入层 - 导入流水线
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 受理与查询
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CsvEncoding, FieldType, ImportAction, JobOutcome, JobStep, RecordStatus, WorkflowFieldPolicy,
};

// 领域实体
pub use domain::{FieldError, ImportJob, ImportRequest, Value};

// 导入流水线
pub use importer::{Collaborators, ImportError, ImportPipeline};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "datastore-import";
