// ==========================================
// 动态台账导入系统 - 单次运行配置快照
// ==========================================
// 职责: 运行开始时一次性读取全部导入配置,运行期间不再访问配置存储
// ==========================================

use crate::config::config_manager::default_temp_root;
use crate::config::import_config_trait::{ConfigResult, ImportConfigReader};
use crate::domain::types::{CsvEncoding, WorkflowFieldPolicy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub stream_timeout: Duration,
    pub stream_buffer: usize,
    pub progress_every: usize,
    pub temp_root: PathBuf,
    pub default_encoding: CsvEncoding,
    pub zip_charset: CsvEncoding,
    pub workflow_field_policy: WorkflowFieldPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(600),
            stream_buffer: 64,
            progress_every: 1,
            temp_root: default_temp_root(),
            default_encoding: CsvEncoding::Utf8,
            zip_charset: CsvEncoding::ShiftJis,
            workflow_field_policy: WorkflowFieldPolicy::Exact,
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载快照
    pub async fn load(reader: &dyn ImportConfigReader) -> ConfigResult<Self> {
        Ok(Self {
            stream_timeout: reader.get_stream_timeout().await?,
            stream_buffer: reader.get_stream_buffer().await?,
            progress_every: reader.get_progress_every().await?,
            temp_root: reader.get_temp_root().await?,
            default_encoding: reader.get_default_encoding().await?,
            zip_charset: reader.get_zip_charset().await?,
            workflow_field_policy: reader.get_workflow_field_policy().await?,
        })
    }
}
