// ==========================================
// 动态台账导入系统 - 数据仓储与外部协作方
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 声明导入管道消费的协作方接口,提供任务表的 SQLite 实现
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod import_task_repo;
pub mod object_storage;
pub mod record_store;
pub mod schema_repo;
pub mod task_repo;
pub mod workflow_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_task_repo::ImportTaskRepository;
pub use object_storage::{ObjectStorage, StoredObject};
pub use record_store::{
    AckStatus, CountCondition, ImportAck, ImportFrame, ImportMeta, ImportStream, RecordStore,
    RemoteRowError,
};
pub use schema_repo::SchemaSource;
pub use task_repo::TaskRepository;
pub use workflow_repo::WorkflowService;
