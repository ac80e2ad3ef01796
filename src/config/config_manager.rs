// ==========================================
// 动态台账导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigResult, ImportConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::types::{CsvEncoding, WorkflowFieldPolicy};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        let manager = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        manager.ensure_schema()?;
        Ok(manager)
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致,会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        let manager = Self { conn };
        manager.ensure_schema()?;
        Ok(manager)
    }

    /// 建表（幂等）
    fn ensure_schema(&self) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置值（存在则覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值,带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取正整数配置,格式错误时回退默认值
    fn get_positive_or_default(&self, key: &str, default: usize) -> ConfigResult<usize> {
        let value = self.get_config_or_default(key, &default.to_string())?;
        match value.trim().parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => {
                warn!(config_key = key, value = %value, "配置值无效,使用默认值");
                Ok(default)
            }
        }
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    // ===== 远程调用 =====

    async fn get_stream_timeout(&self) -> ConfigResult<Duration> {
        let secs = self.get_positive_or_default(config_keys::STREAM_TIMEOUT_SECS, 600)?;
        Ok(Duration::from_secs(secs as u64))
    }

    async fn get_stream_buffer(&self) -> ConfigResult<usize> {
        self.get_positive_or_default(config_keys::STREAM_BUFFER, 64)
    }

    async fn get_progress_every(&self) -> ConfigResult<usize> {
        self.get_positive_or_default(config_keys::PROGRESS_EVERY, 1)
    }

    // ===== 文件处理 =====

    async fn get_temp_root(&self) -> ConfigResult<PathBuf> {
        match self.get_config_value(config_keys::TEMP_ROOT)? {
            Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
            _ => Ok(default_temp_root()),
        }
    }

    async fn get_default_encoding(&self) -> ConfigResult<CsvEncoding> {
        let value = self.get_config_or_default(config_keys::DEFAULT_ENCODING, "utf-8")?;
        Ok(value.parse::<CsvEncoding>().unwrap_or(CsvEncoding::Utf8))
    }

    async fn get_zip_charset(&self) -> ConfigResult<CsvEncoding> {
        let value = self.get_config_or_default(config_keys::ZIP_CHARSET, "sjis")?;
        Ok(value.parse::<CsvEncoding>().unwrap_or(CsvEncoding::ShiftJis))
    }

    // ===== 工作流 =====

    async fn get_workflow_field_policy(&self) -> ConfigResult<WorkflowFieldPolicy> {
        let value = self.get_config_or_default(config_keys::WORKFLOW_FIELD_POLICY, "exact")?;
        Ok(value
            .parse::<WorkflowFieldPolicy>()
            .unwrap_or(WorkflowFieldPolicy::Exact))
    }
}

/// 默认临时目录: 系统缓存目录/datastore-import
pub fn default_temp_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("datastore-import")
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 远程调用
    pub const STREAM_TIMEOUT_SECS: &str = "import.stream_timeout_secs";
    pub const STREAM_BUFFER: &str = "import.stream_buffer";
    pub const PROGRESS_EVERY: &str = "import.progress_every";

    // 文件处理
    pub const TEMP_ROOT: &str = "import.temp_root";
    pub const DEFAULT_ENCODING: &str = "import.default_encoding";
    pub const ZIP_CHARSET: &str = "import.zip_charset";

    // 工作流
    pub const WORKFLOW_FIELD_POLICY: &str = "import.workflow_field_policy";
}
