// ==========================================
// 动态台账导入系统 - 文件解析准备
// ==========================================
// 职责:
// 1. 从对象存储取回数据文件（及可选的图片压缩包）
// 2. Excel 转换为 CSV
// 3. 解压压缩包,生成 文件名 -> 本地路径 映射
// 红线: 所有临时文件位于一个 TempDir 中,ResolvedFiles 销毁即清理
// ==========================================

use crate::domain::types::CsvEncoding;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::excel_to_csv;
use crate::importer::message::Message;
use crate::repository::object_storage::ObjectStorage;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// 数据文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Excel,
}

impl SourceFormat {
    /// 按扩展名识别
    pub fn detect(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "xlsx" | "xls" | "xlsm" => Some(SourceFormat::Excel),
            _ => None,
        }
    }
}

// ==========================================
// ResolvedFiles - 准备完成的本地文件
// ==========================================
pub struct ResolvedFiles {
    pub csv_path: PathBuf,
    /// CSV 实际编码（Excel 转换后恒为 UTF-8）
    pub encoding: CsvEncoding,
    /// 压缩包内文件名 -> 本地路径
    pub file_map: HashMap<String, PathBuf>,
    workspace: TempDir,
}

impl ResolvedFiles {
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }
}

impl Drop for ResolvedFiles {
    fn drop(&mut self) {
        debug!(path = %self.workspace.path().display(), "清理导入临时文件");
    }
}

// ==========================================
// FileResolver
// ==========================================
pub struct FileResolver {
    storage: Arc<dyn ObjectStorage>,
    temp_root: PathBuf,
}

impl FileResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, temp_root: PathBuf) -> Self {
        Self { storage, temp_root }
    }

    /// 准备本地文件
    ///
    /// # 参数
    /// - file_path: 对象存储中的数据文件
    /// - zip_path: 对象存储中的图片压缩包（可选）
    /// - encoding: CSV 编码
    /// - zip_charset: 压缩包内非 UTF-8 文件名的编码
    ///
    /// # 错误
    /// - 数据文件无法取回/格式不支持/转换失败: FileAccess
    /// - 提供了压缩包但解压失败: FileAccess
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        file_path: &str,
        zip_path: Option<&str>,
        encoding: CsvEncoding,
        zip_charset: CsvEncoding,
    ) -> ImportResult<ResolvedFiles> {
        let file_name = base_name(file_path).to_string();
        let format = SourceFormat::detect(&file_name).ok_or_else(|| {
            ImportError::FileAccess(
                Message::new("import.fatal.unsupported_format").arg("name", &file_name),
            )
        })?;

        fs::create_dir_all(&self.temp_root)?;
        let workspace = tempfile::Builder::new()
            .prefix("import_")
            .tempdir_in(&self.temp_root)?;

        // 步骤 1: 取回数据文件
        let source_path = workspace.path().join(&file_name);
        self.fetch_to(file_path, &source_path).await?;

        // 步骤 2: Excel 转换
        let (csv_path, encoding) = match format {
            SourceFormat::Csv => (source_path, encoding),
            SourceFormat::Excel => {
                let csv_path = workspace.path().join("converted.csv");
                let (src, dst) = (source_path.clone(), csv_path.clone());
                tokio::task::spawn_blocking(move || excel_to_csv(&src, &dst))
                    .await
                    .map_err(|e| anyhow!("Excel 转换任务异常: {}", e))??;
                fs::remove_file(&source_path)?;
                (csv_path, CsvEncoding::Utf8)
            }
        };

        // 步骤 3: 解压图片压缩包
        let file_map = match zip_path {
            Some(zip_path) => {
                let archive_path = workspace.path().join("images.zip");
                self.fetch_to(zip_path, &archive_path).await?;

                let dest = workspace.path().join("images");
                tokio::task::spawn_blocking(move || extract_zip(&archive_path, &dest, zip_charset))
                    .await
                    .map_err(|e| anyhow!("解压任务异常: {}", e))?
                    .map_err(|e| {
                        ImportError::FileAccess(
                            Message::new("import.fatal.zip_extract")
                                .arg("reason", format!("{:#}", e)),
                        )
                    })?
            }
            None => HashMap::new(),
        };

        info!(
            file = %file_name,
            images = file_map.len(),
            "导入文件准备完成"
        );

        Ok(ResolvedFiles {
            csv_path,
            encoding,
            file_map,
            workspace,
        })
    }

    /// 取回对象写入本地,随后删除远程临时对象
    async fn fetch_to(&self, remote: &str, local: &Path) -> ImportResult<()> {
        let bytes = self.storage.fetch_object(remote).await.map_err(|e| {
            warn!(path = remote, error = %e, "取回上传文件失败");
            ImportError::FileAccess(
                Message::new("import.fatal.file_fetch").arg("name", base_name(remote)),
            )
        })?;
        tokio::fs::write(local, bytes).await?;

        if let Err(e) = self.storage.delete_object(remote).await {
            warn!(path = remote, error = %e, "删除远程临时文件失败");
        }
        Ok(())
    }
}

/// 路径中的文件名部分
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

// ==========================================
// 压缩包解压
// ==========================================

fn extract_zip(
    archive_path: &Path,
    dest: &Path,
    charset: CsvEncoding,
) -> anyhow::Result<HashMap<String, PathBuf>> {
    let file = File::open(archive_path).context("打开压缩包失败")?;
    let mut archive = zip::ZipArchive::new(file).context("读取压缩包目录失败")?;
    let mut map = HashMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let name = decode_entry_name(entry.name_raw(), charset);
        let relative =
            safe_relative_path(&name).ok_or_else(|| anyhow!("非法的压缩包条目: {}", name))?;
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&target)
            .with_context(|| format!("创建文件失败: {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;

        // 子目录中的文件同时以文件名登记（不覆盖已有条目）
        let short = base_name(&name).to_string();
        if short != name {
            map.entry(short).or_insert_with(|| target.clone());
        }
        map.insert(name, target);
    }

    Ok(map)
}

/// 条目名不是合法 UTF-8 时按指定编码解码
fn decode_entry_name(raw: &[u8], charset: CsvEncoding) -> String {
    match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) => charset
            .encoding()
            .decode_without_bom_handling(raw)
            .0
            .into_owned(),
    }
}

/// 仅允许普通路径分量,拒绝 ".."、绝对路径
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}
