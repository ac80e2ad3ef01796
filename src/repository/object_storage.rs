// ==========================================
// 动态台账导入系统 - 对象存储协作方 Trait
// ==========================================
// 职责: 文件读取/保存/删除与租户容量配额
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 保存后的对象信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub size: u64,
    /// 对象名（删除时使用）
    pub name: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 读取对象内容
    async fn fetch_object(&self, path: &str) -> RepositoryResult<Vec<u8>>;

    /// 保存对象
    ///
    /// # 参数
    /// - bytes: 内容
    /// - path: 目标路径
    /// - content_type: MIME 类型
    async fn save_object(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> RepositoryResult<StoredObject>;

    /// 删除对象
    async fn delete_object(&self, name: &str) -> RepositoryResult<()>;

    /// 租户是否还能容纳 size 字节
    async fn can_upload(&self, tenant: &str, size: u64) -> RepositoryResult<bool>;

    /// 调整租户已用容量
    async fn modify_used_size(&self, tenant: &str, delta: i64) -> RepositoryResult<()>;
}
