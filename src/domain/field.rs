// ==========================================
// 动态台账导入系统 - 字段元数据
// ==========================================
// 职责: 字段定义、选项、用户/组目录、关联定义、多语言标签
// 红线: 每个 (datastore, field_id) 仅对应一个字段定义
// ==========================================

use crate::domain::types::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// FieldDefinition - 字段定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub field_id: String,
    pub datastore_id: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub unique: bool,
    /// 最小字符数（None 表示不限制）
    pub min_length: Option<usize>,
    /// 最大字符数（None 表示不限制）
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// 小数位数
    pub precision: usize,
    /// 选项组 ID（options 类型）
    pub option_group_id: Option<String>,
    /// 关联目标台账（lookup 类型）
    pub lookup_target: Option<String>,
    pub as_title: bool,
}

impl FieldDefinition {
    /// 以默认约束构造字段定义
    pub fn new(datastore_id: &str, field_id: &str, field_type: FieldType) -> Self {
        Self {
            field_id: field_id.to_string(),
            datastore_id: datastore_id.to_string(),
            field_type,
            is_required: false,
            unique: false,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            precision: 0,
            option_group_id: None,
            lookup_target: None,
            as_title: false,
        }
    }
}

// ==========================================
// 选项 / 用户 / 组
// ==========================================

/// 选项组中的一个选项值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub option_group_id: String,
    pub option_value: String,
    pub deleted: bool,
}

/// 用户目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub user_id: String,
    pub user_name: String,
}

/// 用户组目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group_id: String,
    pub parent_group_id: Option<String>,
    pub access_key: String,
}

// ==========================================
// RelationDefinition - 台账间关联
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub relation_id: String,
    pub target_datastore_id: String,
    /// 本台账字段 -> 目标台账字段
    pub field_mapping: BTreeMap<String, String>,
}

// ==========================================
// DatastoreInfo - 台账信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreInfo {
    pub datastore_id: String,
    pub app_id: String,
    pub relations: Vec<RelationDefinition>,
}

// ==========================================
// LabelTable - 多语言名称表
// ==========================================
// 键格式:
// - datastores: datastore_id
// - fields: "{datastore_id}_{field_id}"
// - options: "{option_group_id}_{option_value}"
// - groups: group_id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    pub datastores: HashMap<String, String>,
    pub fields: HashMap<String, String>,
    pub options: HashMap<String, String>,
    pub groups: HashMap<String, String>,
}

impl LabelTable {
    /// 台账名称,缺失时回退为 ID
    pub fn datastore_label(&self, datastore_id: &str) -> String {
        self.datastores
            .get(datastore_id)
            .cloned()
            .unwrap_or_else(|| datastore_id.to_string())
    }

    /// 字段名称,缺失时回退为字段 ID
    pub fn field_label(&self, datastore_id: &str, field_id: &str) -> String {
        self.fields
            .get(&format!("{}_{}", datastore_id, field_id))
            .cloned()
            .unwrap_or_else(|| field_id.to_string())
    }

    pub fn option_label(&self, option_group_id: &str, option_value: &str) -> Option<&str> {
        self.options
            .get(&format!("{}_{}", option_group_id, option_value))
            .map(String::as_str)
    }

    pub fn group_label(&self, group_id: &str) -> Option<&str> {
        self.groups.get(group_id).map(String::as_str)
    }
}
