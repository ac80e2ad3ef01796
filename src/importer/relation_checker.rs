// ==========================================
// 动态台账导入系统 - 关联完整性检查
// ==========================================
// 规则（逐关联）:
// - 本地映射字段全部为空: 跳过
// - 部分有值: 一条错误（未提供全部对应字段）
// - 全部有值: 目标台账按映射值等值计数,0 条则报错（对应数据不存在）
// 关联目标视为既存数据,不依赖同一文件中先前行的提交
// ==========================================

use crate::domain::field::RelationDefinition;
use crate::domain::record::{ErrorKind, FieldError, ValidatedRow};
use crate::importer::message::Message;
use crate::importer::schema_context::SchemaContext;
use crate::repository::record_store::{CountCondition, RecordStore};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RelationChecker {
    store: Arc<dyn RecordStore>,
}

impl RelationChecker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 检查一行的全部关联
    ///
    /// # 返回
    /// 每个不满足的关联一条错误（按关联定义顺序）
    pub async fn check(&self, ctx: &SchemaContext, row: &ValidatedRow) -> Vec<FieldError> {
        let checks = ctx
            .relations
            .iter()
            .map(|relation| self.check_relation(ctx, relation, row));
        join_all(checks).await.into_iter().flatten().collect()
    }

    async fn check_relation(
        &self,
        ctx: &SchemaContext,
        relation: &RelationDefinition,
        row: &ValidatedRow,
    ) -> Option<FieldError> {
        let conditions: Vec<CountCondition> = relation
            .field_mapping
            .iter()
            .filter_map(|(local, remote)| {
                row.values
                    .get(local)
                    .filter(|v| !v.is_empty())
                    .map(|v| CountCondition {
                        field_id: remote.clone(),
                        value: v.raw_string(),
                    })
            })
            .collect();

        if conditions.is_empty() {
            return None;
        }

        let target = &relation.target_datastore_id;
        let fields = remote_labels(ctx, relation);

        if conditions.len() < relation.field_mapping.len() {
            debug!(relation_id = %relation.relation_id, line = row.index, "关联字段不完整");
            return Some(self.error(
                ctx,
                row.index,
                Message::new("import.error.relation_incomplete").arg("fields", fields),
            ));
        }

        let message = match self.store.count_items(target, &conditions).await {
            Ok(0) => Message::new("import.error.relation_missing")
                .arg("datastore", ctx.labels.datastore_label(target))
                .arg("fields", fields),
            Ok(_) => return None,
            Err(e) => {
                warn!(relation_id = %relation.relation_id, error = %e, "关联数据查询失败");
                Message::new("import.error.lookup_failed").arg("reason", e)
            }
        };
        Some(self.error(ctx, row.index, message))
    }

    fn error(&self, ctx: &SchemaContext, line: usize, message: Message) -> FieldError {
        FieldError::row(line, ErrorKind::RelationIntegrity, message.render(&ctx.locale))
    }
}

/// 关联的远程字段名称,如 "[客户编号][客户名]"
fn remote_labels(ctx: &SchemaContext, relation: &RelationDefinition) -> String {
    relation
        .field_mapping
        .values()
        .map(|remote| format!("[{}]", ctx.labels.field_label(&relation.target_datastore_id, remote)))
        .collect()
}
