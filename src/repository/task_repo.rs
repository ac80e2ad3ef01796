// ==========================================
// 动态台账导入系统 - 导入任务仓储 Trait
// ==========================================
// 职责: 导入任务的创建、增量更新与查询
// 红线: 未提供的字段保持不变; 已结束任务不再更新
// ==========================================

use crate::domain::job::{ImportJob, TaskUpdate};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// 实现者: ImportTaskRepository（使用 rusqlite）
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建任务
    async fn create_task(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 增量更新任务（幂等）
    async fn modify_task(&self, update: &TaskUpdate) -> RepositoryResult<()>;

    /// 查询任务
    async fn find_task(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>>;
}
