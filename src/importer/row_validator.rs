// ==========================================
// 动态台账导入系统 - 行校验器
// ==========================================
// 职责: 原始行 + 表头 + 元数据快照 -> 类型化字段值 或 字段级错误
// 规则顺序:
// 1. 记录 ID 与导入动作是否匹配（前置条件失败则整行中止）
// 2. 新增: 必填字段必须有列; 图片模式: 只允许文件字段列
// 3. 逐列: 空值标记 -> 必填检查 -> 类型转换
// 红线: 同一行的错误全部收集,不在第一个错误处返回
// ==========================================

use crate::domain::record::{ErrorKind, FieldError, RowContext, ValidatedRow};
use crate::domain::types::{FieldType, ImportAction, RecordStatus};
use crate::domain::value::Value;
use crate::importer::field_coercer::{coerce, Coerced};
use crate::importer::file_uploader::FileUploader;
use crate::importer::header::{HeaderScan, OWNER_COLUMN};
use crate::importer::message::Message;
use crate::importer::schema_context::SchemaContext;
use std::collections::BTreeMap;
use tracing::debug;

/// 空值标记: 显式清空字段
pub const EMPTY_MARKER: &str = "#N/A";

/// 单元格的有效值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellIntent<'c> {
    /// 保持原值（更新时的普通空白单元格）
    Keep,
    /// 置为空
    Clear,
    /// 非空值
    Set(&'c str),
}

pub struct RowValidator<'a> {
    ctx: &'a SchemaContext,
    header: &'a HeaderScan,
    action: ImportAction,
    empty_as_clear: bool,
    uploader: &'a FileUploader<'a>,
    /// 新增时缺列的必填字段（字段名称）
    missing_required: Vec<String>,
    /// 图片模式下的非文件列
    image_column_invalid: bool,
}

impl<'a> RowValidator<'a> {
    pub fn new(
        ctx: &'a SchemaContext,
        header: &'a HeaderScan,
        action: ImportAction,
        empty_as_clear: bool,
        uploader: &'a FileUploader<'a>,
    ) -> Self {
        let missing_required = if action == ImportAction::Insert {
            ctx.required_fields()
                .into_iter()
                .filter(|f| !header.contains(&f.field_id))
                .map(|f| ctx.field_label(&f.field_id))
                .collect()
        } else {
            Vec::new()
        };

        let image_column_invalid = action == ImportAction::Image
            && header.data_columns().any(|(_, name)| {
                ctx.input_field(name)
                    .map_or(true, |f| f.field_type != FieldType::File)
            });

        if !missing_required.is_empty() || image_column_invalid {
            debug!(
                missing_required = ?missing_required,
                image_column_invalid = image_column_invalid,
                "表头不满足导入动作要求,所有行将报错"
            );
        }

        Self {
            ctx,
            header,
            action,
            empty_as_clear,
            uploader,
            missing_required,
            image_column_invalid,
        }
    }

    fn row_error(&self, index: usize, message: Message) -> FieldError {
        FieldError::row(index, ErrorKind::RowValidation, message.render(&self.ctx.locale))
    }

    fn field_error(&self, index: usize, label: &str, message: Message) -> FieldError {
        FieldError::field(
            index,
            ErrorKind::RowValidation,
            label,
            message.render(&self.ctx.locale),
        )
    }

    /// 行级前置条件
    fn check_preconditions(&self, row: &RowContext) -> Vec<FieldError> {
        let mut errors = Vec::new();

        match (self.action, row.item_id()) {
            (ImportAction::Insert, Some(_)) => {
                errors.push(self.row_error(row.index, Message::new("import.error.id_with_insert")));
            }
            (ImportAction::Insert, None) => {
                for label in &self.missing_required {
                    errors.push(self.field_error(
                        row.index,
                        label,
                        Message::new("import.error.required_column_missing"),
                    ));
                }
            }
            (_, None) => {
                errors.push(self.row_error(row.index, Message::new("import.error.id_missing")));
            }
            (_, Some(_)) => match &row.prior_record {
                None => errors.push(
                    self.row_error(row.index, Message::new("import.error.record_not_found")),
                ),
                Some(prior) if prior.status == RecordStatus::PendingApproval => errors.push(
                    self.row_error(row.index, Message::new("import.error.record_in_approval")),
                ),
                Some(_) => {}
            },
        }

        if self.image_column_invalid {
            errors.push(self.row_error(row.index, Message::new("import.error.image_column_invalid")));
        }
        errors
    }

    fn intent<'c>(&self, cell: &'c str) -> CellIntent<'c> {
        let trimmed = cell.trim();
        if trimmed == EMPTY_MARKER {
            return CellIntent::Clear;
        }
        if trimmed.is_empty() {
            return match self.action {
                ImportAction::Insert => CellIntent::Clear,
                _ if self.empty_as_clear => CellIntent::Clear,
                _ => CellIntent::Keep,
            };
        }
        CellIntent::Set(cell)
    }

    /// 校验并转换一行
    ///
    /// # 参数
    /// - row: 原始行（更新/图片模式下已填充 prior_record）
    ///
    /// # 返回
    /// - Ok: 可提交的行
    /// - Err: 该行的全部错误
    pub async fn validate(&self, row: &RowContext) -> Result<ValidatedRow, Vec<FieldError>> {
        let mut errors = self.check_preconditions(row);
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut values = BTreeMap::new();
        let mut owner_key = None;

        for (column, name) in self.header.data_columns() {
            let cell = row.cell(column);

            if name == OWNER_COLUMN {
                match self.intent(cell) {
                    CellIntent::Set(group) => match self.ctx.resolve_group(group.trim()) {
                        Some(key) => owner_key = Some(key.to_string()),
                        None => errors.push(self.field_error(
                            row.index,
                            OWNER_COLUMN,
                            Message::new("import.error.unknown_group").arg("name", group.trim()),
                        )),
                    },
                    CellIntent::Keep | CellIntent::Clear => {}
                }
                continue;
            }

            let field = match self.ctx.input_field(name) {
                Some(field) => field,
                None => {
                    // 自动编号/计算字段由服务端生成,忽略输入
                    let computed = self
                        .ctx
                        .field(name)
                        .is_some_and(|f| f.field_type.is_server_computed());
                    if !computed {
                        errors.push(self.field_error(
                            row.index,
                            name,
                            Message::new("import.error.unknown_field").arg("field", name),
                        ));
                    }
                    continue;
                }
            };
            let label = self.ctx.field_label(&field.field_id);

            let text = match self.intent(cell) {
                CellIntent::Keep => continue,
                CellIntent::Clear => {
                    if field.is_required {
                        errors.push(self.field_error(
                            row.index,
                            &label,
                            Message::new("import.error.required"),
                        ));
                    } else if let Some(empty) = Value::empty_of(field.field_type) {
                        values.insert(field.field_id.clone(), empty);
                    }
                    continue;
                }
                CellIntent::Set(text) => text,
            };

            let coerced = match coerce(self.ctx, field, text) {
                Ok(Coerced::Ready(value)) => Ok(value),
                Ok(Coerced::Files(names)) => self.uploader.upload_all(&names).await.map(Value::File),
                Err(messages) => Err(messages),
            };

            match coerced {
                Ok(value) => {
                    values.insert(field.field_id.clone(), value);
                }
                Err(messages) => {
                    errors.extend(
                        messages
                            .into_iter()
                            .map(|m| self.field_error(row.index, &label, m)),
                    );
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedRow {
            index: row.index,
            item_id: row.item_id().map(str::to_string),
            values,
            owner_key,
        })
    }
}
