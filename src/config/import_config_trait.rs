// ==========================================
// 动态台账导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{CsvEncoding, WorkflowFieldPolicy};
use async_trait::async_trait;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 远程调用 =====

    /// 获取记录存储导入流的整体超时
    ///
    /// # 默认值
    /// - 600 秒
    ///
    /// # 说明
    /// - 作用于整个远程调用,不是单行超时
    async fn get_stream_timeout(&self) -> ConfigResult<Duration>;

    /// 获取导入流通道容量
    ///
    /// # 默认值
    /// - 64
    ///
    /// # 说明
    /// - 通道满时发送方等待,形成背压
    async fn get_stream_buffer(&self) -> ConfigResult<usize>;

    /// 获取进度上报间隔（每 N 个成功应答上报一次）
    ///
    /// # 默认值
    /// - 1
    async fn get_progress_every(&self) -> ConfigResult<usize>;

    // ===== 文件处理 =====

    /// 获取临时文件根目录
    ///
    /// # 默认值
    /// - 系统缓存目录/datastore-import（缺失时使用系统临时目录）
    async fn get_temp_root(&self) -> ConfigResult<PathBuf>;

    /// 获取请求未指定时的 CSV 编码
    ///
    /// # 默认值
    /// - utf-8
    async fn get_default_encoding(&self) -> ConfigResult<CsvEncoding>;

    /// 获取压缩包内非 UTF-8 文件名的编码
    ///
    /// # 默认值
    /// - sjis
    async fn get_zip_charset(&self) -> ConfigResult<CsvEncoding>;

    // ===== 工作流 =====

    /// 获取更新动作的工作流字段匹配策略
    ///
    /// # 返回
    /// - Exact: 表头字段与声明字段完全一致
    /// - Subset: 表头字段为声明字段的子集
    ///
    /// # 默认值
    /// - exact
    async fn get_workflow_field_policy(&self) -> ConfigResult<WorkflowFieldPolicy>;
}
