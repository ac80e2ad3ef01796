// ==========================================
// 动态台账导入系统 - 审批工作流
// ==========================================
// 职责: 工作流定义与审批信封
// ==========================================

use crate::domain::types::ImportAction;
use crate::domain::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// WorkflowDefinition - 工作流定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub is_valid: bool,
    pub action: Option<ImportAction>,
    /// 工作流参数（"fields" 为逗号分隔的字段 ID）
    pub params: HashMap<String, String>,
}

impl WorkflowDefinition {
    /// 工作流声明的相关字段（未声明时为空列表）
    pub fn declared_fields(&self) -> Vec<String> {
        self.params
            .get("fields")
            .map(|fields| {
                fields
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 是否声明了字段子集
    pub fn has_declared_fields(&self) -> bool {
        !self.declared_fields().is_empty()
    }

    /// 从既有记录中截取声明字段（未声明时返回全部字段）
    pub fn restrict_prior(&self, prior: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let declared = self.declared_fields();
        if declared.is_empty() {
            return prior.clone();
        }
        prior
            .iter()
            .filter(|(field_id, _)| declared.iter().any(|d| d == *field_id))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ==========================================
// ApprovalEnvelope - 审批信封
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEnvelope {
    pub workflow_id: String,
    pub example_id: String,
    pub app_id: String,
    pub datastore_id: String,
    /// 更新类动作的目标记录
    pub item_id: Option<String>,
    pub writer: String,
    pub owner_key: Option<String>,
    pub current_values: BTreeMap<String, Value>,
    pub prior_values_subset: BTreeMap<String, Value>,
}
