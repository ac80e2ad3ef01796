// ==========================================
// 动态台账导入系统 - 记录存储协作方 Trait
// ==========================================
// 职责: 定义记录存储的双向导入流与查询接口（不包含实现）
// 传输: 以 tokio mpsc 通道抽象双向流,帧编解码由实现方负责
// ==========================================

use crate::domain::record::{PriorRecord, ValidatedRow};
use crate::domain::types::RecordStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ==========================================
// 导入流帧
// ==========================================

/// 元数据帧（每个流只发送一次,且必须最先发送）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMeta {
    pub app_id: String,
    pub datastore_id: String,
    pub writer: String,
    pub owners: Vec<String>,
    pub update_owners: Vec<String>,
    pub database: String,
}

/// 客户端发往记录存储的帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportFrame {
    Meta(ImportMeta),
    /// None 表示输入结束
    Data(Option<ValidatedRow>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Section,
    Success,
    Failed,
}

/// 服务端返回的行错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRowError {
    pub first_line: usize,
    pub last_line: usize,
    /// 0 表示范围错误
    pub current_line: usize,
    pub field_id: Option<String>,
    pub message: String,
}

/// 服务端应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAck {
    pub status: AckStatus,
    pub insert_count: usize,
    pub update_count: usize,
    pub errors: Vec<RemoteRowError>,
}

impl ImportAck {
    pub fn section() -> Self {
        Self {
            status: AckStatus::Section,
            insert_count: 0,
            update_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn success(insert_count: usize, update_count: usize) -> Self {
        Self {
            status: AckStatus::Success,
            insert_count,
            update_count,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<RemoteRowError>) -> Self {
        Self {
            status: AckStatus::Failed,
            insert_count: 0,
            update_count: 0,
            errors,
        }
    }
}

/// 已打开的双向导入流
///
/// - frames: 发送端（有界通道,满时发送方等待）
/// - acks: 接收端,通道关闭即流结束
pub struct ImportStream {
    pub frames: mpsc::Sender<ImportFrame>,
    pub acks: mpsc::Receiver<RepositoryResult<ImportAck>>,
}

/// 计数查询的等值条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCondition {
    pub field_id: String,
    pub value: String,
}

// ==========================================
// RecordStore Trait
// ==========================================
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 打开导入流
    ///
    /// # 参数
    /// - buffer: 帧/应答通道容量
    async fn open_import_stream(&self, buffer: usize) -> RepositoryResult<ImportStream>;

    /// 按等值条件统计目标台账记录数
    async fn count_items(
        &self,
        datastore_id: &str,
        conditions: &[CountCondition],
    ) -> RepositoryResult<u64>;

    /// 在访问键范围内查询记录
    ///
    /// # 返回
    /// - Ok(None): 记录不存在或无权限
    async fn find_item(
        &self,
        datastore_id: &str,
        item_id: &str,
        owners: &[String],
    ) -> RepositoryResult<Option<PriorRecord>>;

    /// 修改记录状态
    async fn change_status(
        &self,
        datastore_id: &str,
        item_id: &str,
        status: RecordStatus,
    ) -> RepositoryResult<()>;
}
