// ==========================================
// 动态台账导入系统 - 单元格类型转换
// ==========================================
// 职责: 按字段类型把单元格文本转换为 Value
// - 每种类型独立校验,不做跨类型的隐式转换
// - 空值与必填判断由行校验器负责,这里只处理非空单元格
// - 文件类型只拆分文件名,上传由 FileUploader 完成
// ==========================================

use crate::domain::field::FieldDefinition;
use crate::domain::types::FieldType;
use crate::domain::value::Value;
use crate::importer::message::Message;
use crate::importer::schema_context::SchemaContext;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// 转换结果
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// 可直接提交的值
    Ready(Value),
    /// 文件字段: 待上传的文件名
    Files(Vec<String>),
}

/// 单元格转换
///
/// # 参数
/// - ctx: 元数据快照
/// - field: 字段定义
/// - cell: 非空单元格文本
///
/// # 返回
/// - Err: 该单元格的全部错误（用户字段会一次报告所有无法解析的名称）
pub fn coerce(
    ctx: &SchemaContext,
    field: &FieldDefinition,
    cell: &str,
) -> Result<Coerced, Vec<Message>> {
    let value = match field.field_type {
        FieldType::Text => Value::Text(check_text(ctx, field, cell)?),
        FieldType::Textarea => Value::Textarea(check_text(ctx, field, cell)?),
        FieldType::Number => Value::Number(coerce_number(field, cell).map_err(|m| vec![m])?),
        FieldType::Date => Value::Date(coerce_date(cell).map_err(|m| vec![m])?),
        FieldType::Time => Value::Time(coerce_time(cell).map_err(|m| vec![m])?),
        FieldType::Options => Value::Options(coerce_option(ctx, field, cell).map_err(|m| vec![m])?),
        FieldType::User => Value::User(coerce_users(ctx, cell)?),
        FieldType::Lookup => Value::Lookup(cell.to_string()),
        FieldType::File => return Ok(Coerced::Files(split_list(cell))),
        FieldType::Autonum | FieldType::Function => {
            return Err(vec![
                Message::new("import.error.unknown_field").arg("field", &field.field_id)
            ])
        }
    };
    Ok(Coerced::Ready(value))
}

/// 逗号分隔列表（去除空白项）
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ===== text / textarea =====

fn check_text(
    ctx: &SchemaContext,
    field: &FieldDefinition,
    cell: &str,
) -> Result<String, Vec<Message>> {
    let mut errors = Vec::new();
    // 按字符计数,而非字节
    let len = cell.chars().count();

    if let Some(min) = field.min_length {
        if len < min {
            errors.push(Message::new("import.error.length_too_short").arg("min", min));
        }
    }
    if let Some(max) = field.max_length {
        if len > max {
            errors.push(Message::new("import.error.length_too_long").arg("max", max));
        }
    }

    let found = ctx.disallowed_in(cell);
    if !found.is_empty() {
        let chars: Vec<String> = found.iter().map(char::to_string).collect();
        errors.push(Message::new("import.error.disallowed_char").arg("chars", chars.join(" ")));
    }

    if errors.is_empty() {
        Ok(cell.to_string())
    } else {
        Err(errors)
    }
}

// ===== number =====

fn coerce_number(field: &FieldDefinition, cell: &str) -> Result<String, Message> {
    let text = cell.trim();
    let value: f64 = text
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| Message::new("import.error.not_a_number").arg("value", text))?;

    if let Some(min) = field.min_value {
        if value < min {
            return Err(Message::new("import.error.below_min").arg("min", min));
        }
    }
    if let Some(max) = field.max_value {
        if value > max {
            return Err(Message::new("import.error.above_max").arg("max", max));
        }
    }

    Ok(format!("{:.*}", field.precision, value))
}

// ===== date =====

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// 宽松日期解析,统一输出 YYYY-MM-DD
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    // YYYYMMDD
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        let year = text[0..4].parse().ok()?;
        let month = text[4..6].parse().ok()?;
        let day = text[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

fn coerce_date(cell: &str) -> Result<String, Message> {
    parse_date(cell)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| Message::new("import.error.invalid_date").arg("value", cell.trim()))
}

// ===== time =====

fn coerce_time(cell: &str) -> Result<String, Message> {
    let text = cell.trim();
    // 严格 HH:MM:SS
    if text.len() == 8 && NaiveTime::parse_from_str(text, "%H:%M:%S").is_ok() {
        Ok(text.to_string())
    } else {
        Err(Message::new("import.error.invalid_time").arg("value", text))
    }
}

// ===== options =====

fn coerce_option(
    ctx: &SchemaContext,
    field: &FieldDefinition,
    cell: &str,
) -> Result<String, Message> {
    let label = cell.trim();
    field
        .option_group_id
        .as_deref()
        .and_then(|group| ctx.resolve_option(group, label))
        .map(str::to_string)
        .ok_or_else(|| Message::new("import.error.unknown_option").arg("value", label))
}

// ===== user =====

fn coerce_users(ctx: &SchemaContext, cell: &str) -> Result<Vec<String>, Vec<Message>> {
    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for name in split_list(cell) {
        match ctx.resolve_user(&name) {
            Some(id) => ids.push(id.to_string()),
            None => errors.push(Message::new("import.error.unknown_user").arg("name", name)),
        }
    }

    if errors.is_empty() {
        Ok(ids)
    } else {
        Err(errors)
    }
}
