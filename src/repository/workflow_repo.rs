// ==========================================
// 动态台账导入系统 - 工作流协作方 Trait
// ==========================================
// 职责: 工作流查询、实例创建/启动、审批模板暂存与补偿删除
// 红线: 审批节点/审批人解析属于工作流引擎,此处只消费提交/补偿契约
// ==========================================

use crate::domain::types::ImportAction;
use crate::domain::workflow::{ApprovalEnvelope, WorkflowDefinition};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// 按 ID 查询工作流
    ///
    /// # 返回
    /// - Ok(None): 工作流不存在
    async fn find_workflow(&self, workflow_id: &str) -> RepositoryResult<Option<WorkflowDefinition>>;

    /// 查询操作者所在组对台账/动作配置的工作流
    async fn find_user_workflows(
        &self,
        group_id: &str,
        app_id: &str,
        datastore_id: &str,
        action: ImportAction,
    ) -> RepositoryResult<Vec<WorkflowDefinition>>;

    /// 创建工作流实例
    ///
    /// # 返回
    /// - example_id
    async fn add_example(&self, workflow_id: &str, actor: &str) -> RepositoryResult<String>;

    /// 暂存审批信封
    ///
    /// # 参数
    /// - collection: 暂存集合（操作者 ID）
    ///
    /// # 返回
    /// - template_id
    async fn stage_item(
        &self,
        collection: &str,
        envelope: &ApprovalEnvelope,
    ) -> RepositoryResult<String>;

    /// 删除暂存的审批模板（补偿动作）
    async fn delete_template_items(&self, collection: &str, template_id: &str)
        -> RepositoryResult<()>;

    /// 启动工作流实例
    async fn start_example_instance(
        &self,
        workflow_id: &str,
        actor: &str,
        example_id: &str,
        domain: &str,
    ) -> RepositoryResult<()>;
}
