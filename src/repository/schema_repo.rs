// ==========================================
// 动态台账导入系统 - 元数据来源 Trait
// ==========================================
// 职责: 字段定义、权限、选项、用户/组目录、标签与禁用字符的只读查询
// 红线: 只读; 不做重试（由传输层负责）
// ==========================================

use crate::domain::field::{
    DatastoreInfo, FieldDefinition, GroupEntry, LabelTable, OptionEntry, UserEntry,
};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// 台账全部字段定义
    async fn find_fields(&self, app_id: &str, datastore_id: &str)
        -> RepositoryResult<Vec<FieldDefinition>>;

    /// 角色可写入的字段 ID
    async fn find_writable_fields(
        &self,
        datastore_id: &str,
        role_ids: &[String],
    ) -> RepositoryResult<Vec<String>>;

    /// 台账信息（含关联定义）
    async fn find_datastore(&self, datastore_id: &str) -> RepositoryResult<DatastoreInfo>;

    /// 应用下的全部选项
    async fn find_options(&self, app_id: &str) -> RepositoryResult<Vec<OptionEntry>>;

    /// 用户目录
    async fn find_users(&self, tenant: &str, app_id: &str) -> RepositoryResult<Vec<UserEntry>>;

    /// 用户组目录
    async fn find_groups(&self, tenant: &str) -> RepositoryResult<Vec<GroupEntry>>;

    /// 多语言名称表
    async fn find_labels(&self, tenant: &str, app_id: &str, lang: &str)
        -> RepositoryResult<LabelTable>;

    /// 租户禁用字符配置（逗号分隔,如 "#,$,%"）
    async fn find_disallowed_chars(&self, tenant: &str) -> RepositoryResult<String>;
}
