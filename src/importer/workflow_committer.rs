// ==========================================
// 动态台账导入系统 - 工作流提交
// ==========================================
// 每行独立: Pending -> Opened -> Staged -> (StatusLocked) -> Started
// - Opened: 创建工作流实例（example）
// - Staged: 暂存审批数据（模板记录）
// - StatusLocked: 更新行的记录状态置为"审批中"
// - Started: 启动实例,行进入审批
// 任一步失败: 行失败,删除已暂存的模板记录并恢复记录状态（补偿）
// 行与行之间互不影响; 每行一次远程往返,不走流式批量
// ==========================================

use crate::domain::record::{ErrorKind, FieldError, PriorRecord, ValidatedRow};
use crate::domain::request::ImportRequest;
use crate::domain::types::RecordStatus;
use crate::domain::workflow::{ApprovalEnvelope, WorkflowDefinition};
use crate::importer::message::Message;
use crate::repository::error::RepositoryError;
use crate::repository::record_store::RecordStore;
use crate::repository::workflow_repo::WorkflowService;
use std::sync::Arc;
use tracing::{debug, warn};

/// 单行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowRowState {
    Pending,
    Opened,
    Staged,
    StatusLocked,
    Started,
}

/// 已完成、失败时需要撤销的步骤
#[derive(Debug, Default)]
struct Compensation {
    template_id: Option<String>,
    locked_item: Option<String>,
}

pub struct WorkflowCommitter {
    workflows: Arc<dyn WorkflowService>,
    store: Arc<dyn RecordStore>,
    workflow: WorkflowDefinition,
    request: Arc<ImportRequest>,
}

impl WorkflowCommitter {
    pub fn new(
        workflows: Arc<dyn WorkflowService>,
        store: Arc<dyn RecordStore>,
        workflow: WorkflowDefinition,
        request: Arc<ImportRequest>,
    ) -> Self {
        Self {
            workflows,
            store,
            workflow,
            request,
        }
    }

    /// 模板记录集合（操作者用户 ID）
    fn collection(&self) -> &str {
        &self.request.actor.user_id
    }

    /// 提交一行到审批
    ///
    /// # 参数
    /// - row: 已校验的行
    /// - prior: 更新前的记录（新增时为 None）
    /// - locale: 错误消息语言
    ///
    /// # 返回
    /// - Ok: 行已进入审批
    /// - Err: 行失败（补偿已执行）
    pub async fn commit_row(
        &self,
        row: &ValidatedRow,
        prior: Option<&PriorRecord>,
        locale: &str,
    ) -> Result<WorkflowRowState, FieldError> {
        let mut compensation = Compensation::default();
        match self.advance(row, prior, &mut compensation).await {
            Ok(state) => {
                debug!(line = row.index, state = ?state, "行已进入审批");
                Ok(state)
            }
            Err((state, e)) => {
                warn!(line = row.index, state = ?state, error = %e, "行提交审批失败,执行补偿");
                self.compensate(compensation).await;
                Err(FieldError::row(
                    row.index,
                    ErrorKind::Workflow,
                    Message::new("import.error.workflow_failed")
                        .arg("reason", e)
                        .render(locale),
                ))
            }
        }
    }

    async fn advance(
        &self,
        row: &ValidatedRow,
        prior: Option<&PriorRecord>,
        compensation: &mut Compensation,
    ) -> Result<WorkflowRowState, (WorkflowRowState, RepositoryError)> {
        let request = &self.request;
        let workflow_id = &self.workflow.workflow_id;
        let actor = &request.actor.user_id;

        let example_id = self
            .workflows
            .add_example(workflow_id, actor)
            .await
            .map_err(|e| (WorkflowRowState::Pending, e))?;

        let envelope = ApprovalEnvelope {
            workflow_id: workflow_id.clone(),
            example_id: example_id.clone(),
            app_id: request.app_id.clone(),
            datastore_id: request.datastore_id.clone(),
            item_id: row.item_id.clone(),
            writer: actor.clone(),
            owner_key: row.owner_key.clone(),
            current_values: row.values.clone(),
            prior_values_subset: prior
                .map(|p| self.workflow.restrict_prior(&p.values))
                .unwrap_or_default(),
        };
        let template_id = self
            .workflows
            .stage_item(self.collection(), &envelope)
            .await
            .map_err(|e| (WorkflowRowState::Opened, e))?;
        compensation.template_id = Some(template_id);

        let mut state = WorkflowRowState::Staged;
        if let (true, Some(item_id)) = (request.action.targets_existing(), &row.item_id) {
            self.store
                .change_status(&request.datastore_id, item_id, RecordStatus::PendingApproval)
                .await
                .map_err(|e| (state, e))?;
            compensation.locked_item = Some(item_id.clone());
            state = WorkflowRowState::StatusLocked;
        }

        self.workflows
            .start_example_instance(workflow_id, actor, &example_id, &request.tenant)
            .await
            .map_err(|e| (state, e))?;
        Ok(WorkflowRowState::Started)
    }

    async fn compensate(&self, compensation: Compensation) {
        if let Some(template_id) = compensation.template_id {
            if let Err(e) = self
                .workflows
                .delete_template_items(self.collection(), &template_id)
                .await
            {
                warn!(template_id = %template_id, error = %e, "暂存数据删除失败");
            }
        }
        if let Some(item_id) = compensation.locked_item {
            if let Err(e) = self
                .store
                .change_status(&self.request.datastore_id, &item_id, RecordStatus::Normal)
                .await
            {
                warn!(item_id = %item_id, error = %e, "记录状态恢复失败");
            }
        }
    }
}
