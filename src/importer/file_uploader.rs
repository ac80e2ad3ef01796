// ==========================================
// 动态台账导入系统 - 文件字段上传
// ==========================================
// 职责: 文件字段单元格中的文件名 -> 压缩包内文件 -> 对象存储
// 流程: 保存对象 -> 配额检查 -> 计入已用容量（超额则删除刚保存的对象）
// ==========================================

use crate::domain::value::FileValue;
use crate::importer::message::Message;
use crate::repository::object_storage::ObjectStorage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct FileUploader<'a> {
    storage: Arc<dyn ObjectStorage>,
    tenant: String,
    app_id: String,
    datastore_id: String,
    file_map: &'a HashMap<String, PathBuf>,
}

impl<'a> FileUploader<'a> {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        tenant: &str,
        app_id: &str,
        datastore_id: &str,
        file_map: &'a HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            storage,
            tenant: tenant.to_string(),
            app_id: app_id.to_string(),
            datastore_id: datastore_id.to_string(),
            file_map,
        }
    }

    /// 对象存储路径
    pub fn object_path(&self, file_name: &str) -> String {
        format!(
            "app_{}/data/datastore_{}/{}",
            self.app_id, self.datastore_id, file_name
        )
    }

    /// 上传单元格中的全部文件
    ///
    /// # 返回
    /// - Ok: 文件值列表（顺序与单元格一致）
    /// - Err: 每个失败文件一条错误,其余文件照常上传
    pub async fn upload_all(&self, names: &[String]) -> Result<Vec<FileValue>, Vec<Message>> {
        let mut files = Vec::with_capacity(names.len());
        let mut errors = Vec::new();

        for name in names {
            match self.upload_one(name).await {
                Ok(file) => files.push(file),
                Err(message) => errors.push(message),
            }
        }

        if errors.is_empty() {
            Ok(files)
        } else {
            Err(errors)
        }
    }

    async fn upload_one(&self, name: &str) -> Result<FileValue, Message> {
        let local = self
            .file_map
            .get(name)
            .ok_or_else(|| Message::new("import.error.file_not_uploaded").arg("name", name))?;

        let failed = || Message::new("import.error.file_upload_failed").arg("name", name);

        let bytes = tokio::fs::read(local).await.map_err(|e| {
            warn!(file = %name, error = %e, "读取压缩包文件失败");
            failed()
        })?;
        let content_type = infer::get(&bytes)
            .map(|t| t.mime_type())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let stored = self
            .storage
            .save_object(bytes, &self.object_path(name), content_type)
            .await
            .map_err(|e| {
                warn!(file = %name, error = %e, "保存文件失败");
                failed()
            })?;

        let allowed = self
            .storage
            .can_upload(&self.tenant, stored.size)
            .await
            .map_err(|e| {
                warn!(file = %name, error = %e, "容量检查失败");
                failed()
            })?;

        if !allowed {
            if let Err(e) = self.storage.delete_object(&stored.name).await {
                warn!(file = %name, error = %e, "超额文件删除失败");
            }
            return Err(Message::new("import.error.quota_exceeded").arg("name", name));
        }

        self.storage
            .modify_used_size(&self.tenant, stored.size as i64)
            .await
            .map_err(|e| {
                warn!(file = %name, error = %e, "更新已用容量失败");
                failed()
            })?;

        debug!(file = %name, size = stored.size, content_type = content_type, "文件上传完成");
        Ok(FileValue {
            url: stored.url,
            name: name.to_string(),
        })
    }
}
