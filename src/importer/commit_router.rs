// ==========================================
// 动态台账导入系统 - 提交路由
// ==========================================
// 职责: 每次运行决定一次提交方式
// - Direct: 流式直接提交到记录存储
// - Workflow: 整个文件的每一行都走同一个审批工作流
// 约束: 同一文件内不混用两种方式
// ==========================================

use crate::domain::request::ImportRequest;
use crate::domain::types::{ImportAction, WorkflowFieldPolicy};
use crate::domain::workflow::WorkflowDefinition;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header::HeaderScan;
use crate::importer::message::Message;
use crate::importer::schema_context::SchemaContext;
use crate::repository::error::RepositoryError;
use crate::repository::workflow_repo::WorkflowService;
use std::sync::Arc;
use tracing::{info, instrument};

/// 提交方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStrategy {
    Direct,
    Workflow(WorkflowDefinition),
}

impl CommitStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CommitStrategy::Direct => "direct",
            CommitStrategy::Workflow(_) => "workflow",
        }
    }
}

pub struct CommitRouter {
    workflows: Arc<dyn WorkflowService>,
    policy: WorkflowFieldPolicy,
}

impl CommitRouter {
    pub fn new(workflows: Arc<dyn WorkflowService>, policy: WorkflowFieldPolicy) -> Self {
        Self { workflows, policy }
    }

    /// 决定提交方式（在处理任何数据行之前调用）
    ///
    /// # 错误
    /// - 指定的工作流不存在/无效: Workflow
    /// - 更新时文件字段与工作流声明字段不一致: SchemaMismatch
    /// - 未指定工作流但表头字段受工作流管控: Workflow
    #[instrument(skip_all, fields(datastore_id = %request.datastore_id, action = %request.action))]
    pub async fn route(
        &self,
        request: &ImportRequest,
        header: &HeaderScan,
        ctx: &SchemaContext,
    ) -> ImportResult<CommitStrategy> {
        let strategy = match &request.workflow_id {
            Some(workflow_id) => self.route_selected(workflow_id, request.action, header, ctx).await?,
            None => self.route_configured(request, header, ctx).await?,
        };

        info!(strategy = strategy.name(), "提交方式已确定");
        Ok(strategy)
    }

    async fn route_selected(
        &self,
        workflow_id: &str,
        action: ImportAction,
        header: &HeaderScan,
        ctx: &SchemaContext,
    ) -> ImportResult<CommitStrategy> {
        let workflow = self
            .workflows
            .find_workflow(workflow_id)
            .await
            .map_err(workflow_load_error)?
            .ok_or_else(|| {
                ImportError::Workflow(
                    Message::new("import.fatal.workflow_not_found").arg("id", workflow_id),
                )
            })?;

        if !workflow.is_valid {
            return Err(ImportError::Workflow(
                Message::new("import.fatal.workflow_invalid").arg("id", workflow_id),
            ));
        }

        if action == ImportAction::Update && workflow.has_declared_fields() {
            check_declared_fields(self.policy, &workflow, header, ctx)?;
        }
        Ok(CommitStrategy::Workflow(workflow))
    }

    async fn route_configured(
        &self,
        request: &ImportRequest,
        header: &HeaderScan,
        ctx: &SchemaContext,
    ) -> ImportResult<CommitStrategy> {
        let candidates: Vec<WorkflowDefinition> = self
            .workflows
            .find_user_workflows(
                &request.actor.group_id,
                &request.app_id,
                &request.datastore_id,
                request.action,
            )
            .await
            .map_err(workflow_load_error)?
            .into_iter()
            .filter(|w| w.is_valid)
            .collect();

        if request.action != ImportAction::Update {
            return Ok(candidates
                .into_iter()
                .next()
                .map_or(CommitStrategy::Direct, CommitStrategy::Workflow));
        }

        // 未声明字段的工作流管控整条记录
        if let Some(whole) = candidates.iter().find(|w| !w.has_declared_fields()) {
            return Ok(CommitStrategy::Workflow(whole.clone()));
        }

        for (_, column) in header.data_columns() {
            if candidates
                .iter()
                .any(|w| w.declared_fields().iter().any(|f| f == column))
            {
                return Err(ImportError::Workflow(
                    Message::new("import.fatal.workflow_required")
                        .arg("field", ctx.field_label(column)),
                ));
            }
        }
        Ok(CommitStrategy::Direct)
    }
}

/// 文件字段与工作流声明字段的一致性检查
fn check_declared_fields(
    policy: WorkflowFieldPolicy,
    workflow: &WorkflowDefinition,
    header: &HeaderScan,
    ctx: &SchemaContext,
) -> ImportResult<()> {
    let declared = workflow.declared_fields();
    let mismatch = |message: Message| Err(ImportError::SchemaMismatch(message));

    match policy {
        WorkflowFieldPolicy::Exact => {
            if declared.len() != header.data_column_count() {
                return mismatch(
                    Message::new("import.fatal.workflow_field_count")
                        .arg("actual", header.data_column_count())
                        .arg("expected", declared.len()),
                );
            }
            let missing = bracketed(
                ctx,
                declared.iter().filter(|f| !header.contains(f)).map(String::as_str),
            );
            if !missing.is_empty() {
                return mismatch(
                    Message::new("import.fatal.workflow_field_missing").arg("fields", missing),
                );
            }
        }
        WorkflowFieldPolicy::Subset => {
            let extra = bracketed(
                ctx,
                header
                    .data_columns()
                    .map(|(_, c)| c)
                    .filter(|c| !declared.iter().any(|f| f == c)),
            );
            if !extra.is_empty() {
                return mismatch(
                    Message::new("import.fatal.workflow_field_undeclared").arg("fields", extra),
                );
            }
        }
    }
    Ok(())
}

/// 字段显示名称列表,如 "[名称][数量]"
fn bracketed<'a>(ctx: &SchemaContext, fields: impl Iterator<Item = &'a str>) -> String {
    fields
        .map(|f| format!("[{}]", ctx.field_label(f)))
        .collect()
}

fn workflow_load_error(err: RepositoryError) -> ImportError {
    ImportError::Workflow(Message::new("import.fatal.workflow_load").arg("reason", err))
}
