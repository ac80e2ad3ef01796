// ==========================================
// 动态台账导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类:
// - ImportError: 致命错误,中止整次运行
// - 行级错误（校验/关联/工作流/提交）以 FieldError 值收集,不走 Err 分支
// ==========================================

use crate::importer::message::Message;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块致命错误
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件访问失败: {0}")]
    FileAccess(Message),

    // ===== 表头/定义错误 =====
    #[error("表头与定义不匹配: {0}")]
    SchemaMismatch(Message),

    // ===== 数据行错误 =====
    #[error("数据行无效: {0}")]
    InvalidRow(Message),

    // ===== 远程提交错误 =====
    #[error("远程提交失败: {0}")]
    RemoteCommit(Message),

    // ===== 工作流错误 =====
    #[error("工作流错误: {0}")]
    Workflow(Message),

    // ===== 协作方错误 =====
    #[error("协作方调用失败: {0}")]
    Collaborator(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 写入错误日志的本地化原因
    pub fn message(&self) -> Message {
        match self {
            ImportError::FileAccess(m)
            | ImportError::SchemaMismatch(m)
            | ImportError::InvalidRow(m)
            | ImportError::RemoteCommit(m)
            | ImportError::Workflow(m) => m.clone(),
            ImportError::Collaborator(e) => {
                Message::new("import.fatal.internal").arg("reason", e)
            }
            ImportError::Other(e) => Message::new("import.fatal.internal").arg("reason", e),
        }
    }

    /// 错误类别名（日志字段）
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::FileAccess(_) => "file_access",
            ImportError::SchemaMismatch(_) => "schema_mismatch",
            ImportError::InvalidRow(_) => "invalid_row",
            ImportError::RemoteCommit(_) => "remote_commit",
            ImportError::Workflow(_) => "workflow",
            ImportError::Collaborator(_) => "collaborator",
            ImportError::Other(_) => "other",
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileAccess(Message::new("import.fatal.file_read").arg("reason", err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::FileAccess(Message::new("import.fatal.file_read").arg("reason", err))
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::FileAccess(Message::new("import.fatal.excel_convert").arg("reason", err))
    }
}

// 实现 From<zip::result::ZipError>
impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::FileAccess(Message::new("import.fatal.zip_extract").arg("reason", err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
