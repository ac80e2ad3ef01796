// ==========================================
// 动态台账导入系统 - 导入层
// ==========================================
// 职责: 批量导入 CSV/Excel（可附图片压缩包）到动态定义的台账
// 阶段: 文件准备 -> 元数据 -> 逐行校验 -> 关联检查 -> 提交 -> 报告
// ==========================================

// 模块声明
pub mod commit_router;
pub mod error;
pub mod field_coercer;
pub mod file_parser;
pub mod file_resolver;
pub mod file_uploader;
pub mod header;
pub mod message;
pub mod pipeline;
pub mod progress_reporter;
pub mod relation_checker;
pub mod row_validator;
pub mod schema_context;
pub mod stream_committer;
pub mod workflow_committer;

// 重导出核心类型
pub use commit_router::{CommitRouter, CommitStrategy};
pub use error::{ImportError, ImportResult};
pub use file_parser::{excel_to_csv, CsvRowReader};
pub use file_resolver::{FileResolver, ResolvedFiles, SourceFormat};
pub use header::HeaderScan;
pub use message::Message;
pub use pipeline::{Collaborators, ImportPipeline};
pub use progress_reporter::{ProgressReporter, RunReport};
pub use relation_checker::RelationChecker;
pub use row_validator::{RowValidator, EMPTY_MARKER};
pub use schema_context::{SchemaContext, SchemaContextBuilder, SchemaContextLoader};
pub use stream_committer::{StreamCommitter, StreamSession, StreamState, StreamSummary};
pub use workflow_committer::{WorkflowCommitter, WorkflowRowState};
