// ==========================================
// 动态台账导入系统 - 领域模型层
// ==========================================
// 职责: 定义导入相关实体、值类型与枚举
// 红线: 不含数据访问逻辑,不含校验流程
// ==========================================

pub mod field;
pub mod job;
pub mod record;
pub mod request;
pub mod types;
pub mod value;
pub mod workflow;

// 重导出核心类型
pub use field::{
    DatastoreInfo, FieldDefinition, GroupEntry, LabelTable, OptionEntry, RelationDefinition,
    UserEntry,
};
pub use job::{FileRef, ImportJob, JobCounts, TaskUpdate};
pub use record::{ErrorKind, FieldError, LineRef, PriorRecord, RowContext, ValidatedRow};
pub use request::{Actor, ImportRequest};
pub use types::{
    CsvEncoding, FieldType, ImportAction, JobOutcome, JobStep, RecordStatus, WorkflowFieldPolicy,
};
pub use value::{FileValue, Value};
pub use workflow::{ApprovalEnvelope, WorkflowDefinition};
