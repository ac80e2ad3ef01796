// ==========================================
// 动态台账导入系统 - API 层错误类型
// ==========================================
// 职责: 定义上传受理阶段的错误,转换 Repository 错误为用户可读的消息
// 注意: 受理之后的导入错误写入任务记录与错误日志,不经过这里
// ==========================================

use crate::i18n::t_in;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API 层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 请求错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 同一台账同时只允许一个导入
    #[error("台账正在导入中: datastore_id={0}")]
    ImportInProgress(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 面向用户的本地化消息
    pub fn localized(&self, locale: &str) -> String {
        match self {
            ApiError::InvalidInput(reason) => {
                t_in(locale, "api.invalid_request", &[("reason", reason.as_str())])
            }
            ApiError::UnsupportedFormat(name) => {
                t_in(locale, "api.unsupported_format", &[("name", name.as_str())])
            }
            ApiError::ImportInProgress(datastore) => t_in(
                locale,
                "api.import_in_progress",
                &[("datastore", datastore.as_str())],
            ),
            ApiError::NotFound(id) => t_in(locale, "api.job_not_found", &[("id", id.as_str())]),
            other => t_in(
                locale,
                "import.fatal.internal",
                &[("reason", other.to_string().as_str())],
            ),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
