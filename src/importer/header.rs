// ==========================================
// 动态台账导入系统 - 表头扫描
// ==========================================
// 职责: 表头只扫描一次
// - 空白列名（含全角空格）: 致命错误
// - owner 伪字段: 触发用户组目录加载
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::message::Message;

/// 第 0 列: 记录 ID
pub const ID_COLUMN: &str = "id";
/// 所有者伪字段
pub const OWNER_COLUMN: &str = "owner";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderScan {
    /// 完整表头（第 0 列为记录 ID）
    pub columns: Vec<String>,
    pub has_owner: bool,
}

impl HeaderScan {
    pub fn scan(header: &[String]) -> ImportResult<Self> {
        if header.is_empty() {
            return Err(ImportError::SchemaMismatch(Message::new(
                "import.fatal.empty_file",
            )));
        }

        // char::is_whitespace 覆盖全角空格 U+3000
        if let Some(pos) = header.iter().position(|name| name.trim().is_empty()) {
            return Err(ImportError::SchemaMismatch(
                Message::new("import.fatal.blank_header").arg("column", pos + 1),
            ));
        }

        let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
        let has_owner = columns.iter().skip(1).any(|c| c == OWNER_COLUMN);

        Ok(Self { columns, has_owner })
    }

    /// 数据列（跳过记录 ID 列）: (列序号, 列名)
    pub fn data_columns(&self) -> impl Iterator<Item = (usize, &str)> {
        self.columns
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| (i, c.as_str()))
    }

    /// 数据列数量
    pub fn data_column_count(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().skip(1).any(|c| c == column)
    }
}
