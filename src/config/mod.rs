// ==========================================
// 动态台账导入系统 - 配置层
// ==========================================
// 职责: 导入配置读取与单次运行快照
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;
pub mod settings;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::{ConfigResult, ImportConfigReader};
pub use settings::ImportSettings;
