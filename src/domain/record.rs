// ==========================================
// 动态台账导入系统 - 行与记录
// ==========================================
// 职责: 原始行上下文、既有记录快照、校验后行数据、行级错误
// 所有权: 校验器产出 ValidatedRow 后移交提交阶段,不再修改
// ==========================================

use crate::domain::types::RecordStatus;
use crate::domain::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// PriorRecord - 更新前的记录快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRecord {
    pub item_id: String,
    pub status: RecordStatus,
    pub values: BTreeMap<String, Value>,
}

// ==========================================
// RowContext - 原始数据行
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RowContext {
    /// 文件行号（表头为第 1 行）
    pub index: usize,
    /// 原始单元格,第 0 列为记录 ID
    pub raw_columns: Vec<String>,
    /// 仅更新类动作填充
    pub prior_record: Option<PriorRecord>,
}

impl RowContext {
    pub fn new(index: usize, raw_columns: Vec<String>) -> Self {
        Self {
            index,
            raw_columns,
            prior_record: None,
        }
    }

    /// 第 0 列的记录 ID（去除空白后为空则视为缺失）
    pub fn item_id(&self) -> Option<&str> {
        self.raw_columns
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// 指定列的单元格（越界视为空白）
    pub fn cell(&self, column: usize) -> &str {
        self.raw_columns
            .get(column)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// 整行全部为空白
    pub fn is_blank(&self) -> bool {
        self.raw_columns.iter().all(|c| c.trim().is_empty())
    }
}

// ==========================================
// ValidatedRow - 校验通过的行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRow {
    /// 文件行号
    pub index: usize,
    /// 更新类动作的目标记录 ID
    pub item_id: Option<String>,
    pub values: BTreeMap<String, Value>,
    /// owner 列解析出的访问键
    pub owner_key: Option<String>,
}

// ==========================================
// 行级错误
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RowValidation,
    RelationIntegrity,
    Workflow,
    Commit,
}

/// 行号描述（单行或范围）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRef {
    Single(usize),
    Range { first: usize, last: usize },
}

impl fmt::Display for LineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRef::Single(line) => write!(f, "{}", line),
            LineRef::Range { first, last } => write!(f, "{}-{}", first, last),
        }
    }
}

/// 行级错误（消息已本地化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub line: LineRef,
    pub kind: ErrorKind,
    /// 字段显示名称（行级错误为 None）
    pub field_label: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn row(line: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            line: LineRef::Single(line),
            kind,
            field_label: None,
            message: message.into(),
        }
    }

    pub fn field(
        line: usize,
        kind: ErrorKind,
        field_label: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line: LineRef::Single(line),
            kind,
            field_label: Some(field_label.into()),
            message: message.into(),
        }
    }

    /// 起始行号（用于排序）
    pub fn first_line(&self) -> usize {
        match self.line {
            LineRef::Single(line) => line,
            LineRef::Range { first, .. } => first,
        }
    }
}
