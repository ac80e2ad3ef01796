// ==========================================
// 动态台账导入系统 - 导入请求
// ==========================================
// 职责: 一次导入运行的全部输入参数
// ==========================================

use crate::domain::types::{CsvEncoding, ImportAction};
use serde::{Deserialize, Serialize};

/// 发起导入的操作者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub group_id: String,
    pub role_ids: Vec<String>,
    /// 消息语言（如 "en" / "ja" / "zh-CN"）
    pub lang: String,
}

// ==========================================
// ImportRequest - 导入请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub job_id: String,
    /// 租户域
    pub tenant: String,
    pub database: String,
    pub app_id: String,
    pub datastore_id: String,
    pub action: ImportAction,
    /// None 时使用配置的默认编码
    pub encoding: Option<CsvEncoding>,
    /// 压缩包内非 UTF-8 文件名的编码
    pub zip_charset: Option<CsvEncoding>,
    /// 更新时空白单元格视为清空
    pub empty_as_clear: bool,
    /// 调用方预选的工作流
    pub workflow_id: Option<String>,
    pub actor: Actor,
    /// 新增记录的所有者访问键
    pub owners: Vec<String>,
    /// 可更新记录的访问键
    pub update_owners: Vec<String>,
    /// 对象存储中的数据文件路径
    pub file_path: String,
    /// 对象存储中的图片压缩包路径
    pub zip_path: Option<String>,
}

impl ImportRequest {
    /// 数据文件名（去除目录部分）
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        let req = ImportRequest {
            job_id: "job1".into(),
            tenant: "t1".into(),
            database: "db".into(),
            app_id: "app1".into(),
            datastore_id: "ds1".into(),
            action: ImportAction::Insert,
            encoding: None,
            zip_charset: None,
            empty_as_clear: false,
            workflow_id: None,
            actor: Actor {
                user_id: "u1".into(),
                group_id: "g1".into(),
                role_ids: vec![],
                lang: "en".into(),
            },
            owners: vec![],
            update_owners: vec![],
            file_path: "temp/upload/items.csv".into(),
            zip_path: None,
        };
        assert_eq!(req.file_name(), "items.csv");
    }
}
