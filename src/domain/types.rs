// ==========================================
// 动态台账导入系统 - 领域类型定义
// ==========================================
// 职责: 导入动作、字段类型、文件编码、任务步骤、终态等枚举
// 红线: 所有分支以枚举表达,禁止字符串比较驱动流程
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入动作 (Import Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Insert, // 新增
    Update, // 更新
    Image,  // 仅更新文件/图片字段
}

impl ImportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportAction::Insert => "insert",
            ImportAction::Update => "update",
            ImportAction::Image => "image",
        }
    }

    /// 是否需要携带记录 ID 并读取既有记录
    pub fn targets_existing(&self) -> bool {
        !matches!(self, ImportAction::Insert)
    }
}

impl fmt::Display for ImportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Ok(ImportAction::Insert),
            "update" => Ok(ImportAction::Update),
            "image" => Ok(ImportAction::Image),
            other => Err(format!("未知的导入动作: {}", other)),
        }
    }
}

// ==========================================
// 字段类型 (Field Type)
// ==========================================
// Autonum / Function 由服务端计算,导入时忽略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Date,
    Time,
    Options,
    User,
    Lookup,
    File,
    Autonum,
    Function,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Options => "options",
            FieldType::User => "user",
            FieldType::Lookup => "lookup",
            FieldType::File => "file",
            FieldType::Autonum => "autonum",
            FieldType::Function => "function",
        }
    }

    /// 服务端计算字段（不接受导入输入）
    pub fn is_server_computed(&self) -> bool {
        matches!(self, FieldType::Autonum | FieldType::Function)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// CSV 文件编码
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CsvEncoding {
    Utf8,
    ShiftJis,
}

impl CsvEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsvEncoding::Utf8 => "utf-8",
            CsvEncoding::ShiftJis => "sjis",
        }
    }

    /// 对应的 encoding_rs 编码
    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        match self {
            CsvEncoding::Utf8 => encoding_rs::UTF_8,
            CsvEncoding::ShiftJis => encoding_rs::SHIFT_JIS,
        }
    }
}

impl FromStr for CsvEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "utf-8" | "utf8" => Ok(CsvEncoding::Utf8),
            "sjis" | "shift-jis" | "shift_jis" => Ok(CsvEncoding::ShiftJis),
            other => Err(format!("不支持的文件编码: {}", other)),
        }
    }
}

impl fmt::Display for CsvEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 任务步骤 (Job Step)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStep {
    GetFile,   // 获取文件
    ReadFile,  // 读取文件
    CheckData, // 校验并提交
    Upload,    // 上传错误日志
    End,       // 结束
}

impl JobStep {
    /// 导入任务的完整步骤列表
    pub const ALL: [JobStep; 5] = [
        JobStep::GetFile,
        JobStep::ReadFile,
        JobStep::CheckData,
        JobStep::Upload,
        JobStep::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::GetFile => "get-file",
            JobStep::ReadFile => "read-file",
            JobStep::CheckData => "check-data",
            JobStep::Upload => "upload",
            JobStep::End => "end",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStep::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("未知的任务步骤: {}", s))
    }
}

// ==========================================
// 导入终态 (Job Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,         // 全部成功
    PartialSuccess,  // 部分成功
    AllFailed,       // 全部失败
    PendingApproval, // 已进入审批
    Failed,          // 致命错误中止
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::PartialSuccess => "partial_success",
            JobOutcome::AllFailed => "all_failed",
            JobOutcome::PendingApproval => "pending_approval",
            JobOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(JobOutcome::Success),
            "partial_success" => Ok(JobOutcome::PartialSuccess),
            "all_failed" => Ok(JobOutcome::AllFailed),
            "pending_approval" => Ok(JobOutcome::PendingApproval),
            "failed" => Ok(JobOutcome::Failed),
            other => Err(format!("未知的导入终态: {}", other)),
        }
    }
}

// ==========================================
// 记录状态 (Record Status)
// ==========================================
// 存储端编码: "1" 正常, "2" 审批中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Normal,
    PendingApproval,
}

impl RecordStatus {
    pub fn code(&self) -> &'static str {
        match self {
            RecordStatus::Normal => "1",
            RecordStatus::PendingApproval => "2",
        }
    }
}

// ==========================================
// 工作流字段匹配策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowFieldPolicy {
    Exact,  // 表头字段与声明字段完全一致
    Subset, // 表头字段为声明字段的子集
}

impl FromStr for WorkflowFieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(WorkflowFieldPolicy::Exact),
            "subset" => Ok(WorkflowFieldPolicy::Subset),
            other => Err(format!("未知的工作流字段策略: {}", other)),
        }
    }
}
