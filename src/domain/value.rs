// ==========================================
// 动态台账导入系统 - 字段值
// ==========================================
// 职责: 按字段类型区分的字段值（带载荷的枚举）
// 红线: data_type 永远等于所属字段定义的 field_type
// 传输格式: { "data_type": "...", "value": "..." }
// ==========================================

use crate::domain::types::FieldType;
use serde::{Deserialize, Serialize};

/// 文件字段中的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValue {
    pub url: String,
    pub name: String,
}

// ==========================================
// Value - 字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireValue", try_from = "WireValue")]
pub enum Value {
    Text(String),
    Textarea(String),
    /// 已按精度格式化的数值,空串表示清空
    Number(String),
    /// YYYY-MM-DD
    Date(String),
    /// HH:MM:SS
    Time(String),
    /// 选项值编码（非显示名称）
    Options(String),
    /// 用户 ID 列表
    User(Vec<String>),
    /// 目标记录标识
    Lookup(String),
    File(Vec<FileValue>),
}

impl Value {
    pub fn data_type(&self) -> FieldType {
        match self {
            Value::Text(_) => FieldType::Text,
            Value::Textarea(_) => FieldType::Textarea,
            Value::Number(_) => FieldType::Number,
            Value::Date(_) => FieldType::Date,
            Value::Time(_) => FieldType::Time,
            Value::Options(_) => FieldType::Options,
            Value::User(_) => FieldType::User,
            Value::Lookup(_) => FieldType::Lookup,
            Value::File(_) => FieldType::File,
        }
    }

    /// 存储端字符串表示
    ///
    /// - user: 逗号分隔的用户 ID
    /// - file: `[{url, name}]` JSON 数组（空列表为 `[]`）
    pub fn raw_string(&self) -> String {
        match self {
            Value::Text(s)
            | Value::Textarea(s)
            | Value::Number(s)
            | Value::Date(s)
            | Value::Time(s)
            | Value::Options(s)
            | Value::Lookup(s) => s.clone(),
            Value::User(ids) => ids.join(","),
            Value::File(files) if files.is_empty() => "[]".to_string(),
            Value::File(files) => serde_json::to_string(files).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::User(ids) => ids.is_empty(),
            Value::File(files) => files.is_empty(),
            other => other.raw_string().is_empty(),
        }
    }

    /// 指定类型的空值（用于"显式清空"）
    ///
    /// 服务端计算字段没有可写入的值,返回 None
    pub fn empty_of(field_type: FieldType) -> Option<Value> {
        let value = match field_type {
            FieldType::Text => Value::Text(String::new()),
            FieldType::Textarea => Value::Textarea(String::new()),
            FieldType::Number => Value::Number(String::new()),
            FieldType::Date => Value::Date(String::new()),
            FieldType::Time => Value::Time(String::new()),
            FieldType::Options => Value::Options(String::new()),
            FieldType::User => Value::User(Vec::new()),
            FieldType::Lookup => Value::Lookup(String::new()),
            FieldType::File => Value::File(Vec::new()),
            FieldType::Autonum | FieldType::Function => return None,
        };
        Some(value)
    }
}

// ==========================================
// WireValue - 传输格式
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireValue {
    pub data_type: FieldType,
    pub value: String,
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        WireValue {
            data_type: value.data_type(),
            value: value.raw_string(),
        }
    }
}

impl TryFrom<WireValue> for Value {
    type Error = String;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        let WireValue { data_type, value } = wire;
        match data_type {
            FieldType::Text => Ok(Value::Text(value)),
            FieldType::Textarea => Ok(Value::Textarea(value)),
            FieldType::Number => Ok(Value::Number(value)),
            FieldType::Date => Ok(Value::Date(value)),
            FieldType::Time => Ok(Value::Time(value)),
            FieldType::Options => Ok(Value::Options(value)),
            FieldType::Lookup => Ok(Value::Lookup(value)),
            FieldType::User => Ok(Value::User(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            FieldType::File if value.trim().is_empty() => Ok(Value::File(Vec::new())),
            FieldType::File => serde_json::from_str(&value)
                .map(Value::File)
                .map_err(|e| format!("文件字段值格式错误: {}", e)),
            FieldType::Autonum | FieldType::Function => {
                Err(format!("{} 类型字段不可写入", data_type))
            }
        }
    }
}
