// ==========================================
// 动态台账导入系统 - 文件解析器实现
// ==========================================
// 支持: CSV (UTF-8 / Shift-JIS) 流式读取, Excel -> CSV 转换
// 约束: 逐行读取,不把整个文件载入内存
// 异步侧: RowStream 在阻塞线程中读取,经有界通道交付
// ==========================================

use crate::domain::record::RowContext;
use crate::domain::types::CsvEncoding;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::message::Message;
use calamine::{open_workbook_auto, Data, ExcelDateTime, Reader};
use chrono::Timelike;
use csv::{ReaderBuilder, StringRecordsIntoIter};
use encoding_rs::Decoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

const READ_CHUNK: usize = 8 * 1024;

// ==========================================
// DecodingReader - 增量转码为 UTF-8
// ==========================================
// 带 BOM 嗅探: UTF-8 BOM 会被去除
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    out_pos: usize,
    out_len: usize,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: CsvEncoding) -> Self {
        Self {
            inner,
            decoder: encoding.encoding().new_decoder(),
            in_buf: vec![0; READ_CHUNK],
            out_buf: Vec::new(),
            out_pos: 0,
            out_len: 0,
            finished: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let n = self.inner.read(&mut self.in_buf)?;
        let last = n == 0;

        let needed = self
            .decoder
            .max_utf8_buffer_length(n)
            .unwrap_or(n * 3 + 16);
        if self.out_buf.len() < needed {
            self.out_buf.resize(needed, 0);
        }

        let (_, _, written, _) =
            self.decoder
                .decode_to_utf8(&self.in_buf[..n], &mut self.out_buf, last);
        self.out_pos = 0;
        self.out_len = written;
        self.finished = last;
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_pos < self.out_len {
                let n = buf.len().min(self.out_len - self.out_pos);
                buf[..n].copy_from_slice(&self.out_buf[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.refill()?;
        }
    }
}

// ==========================================
// CsvRowReader - 逐行读取 CSV
// ==========================================
// 行号: 表头为第 1 行,数据行从第 2 行开始
pub struct CsvRowReader {
    records: StringRecordsIntoIter<DecodingReader<File>>,
    header: Vec<String>,
    next_index: usize,
}

impl CsvRowReader {
    /// 打开 CSV 并读取表头
    ///
    /// # 错误
    /// - 文件无表头行: SchemaMismatch
    pub fn open(path: &Path, encoding: CsvEncoding) -> ImportResult<Self> {
        let file = File::open(path)?;
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(DecodingReader::new(file, encoding));

        let mut records = reader.into_records();
        let header = match records.next() {
            Some(record) => record?
                .iter()
                .map(|h| h.trim().to_string())
                .collect::<Vec<_>>(),
            None => {
                return Err(ImportError::SchemaMismatch(Message::new(
                    "import.fatal.empty_file",
                )))
            }
        };

        debug!(columns = header.len(), encoding = %encoding, "读取表头完成");
        Ok(Self {
            records,
            header,
            next_index: 2,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl Iterator for CsvRowReader {
    type Item = ImportResult<RowContext>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let index = self.next_index;
        self.next_index += 1;

        Some(
            record
                .map(|r| RowContext::new(index, r.iter().map(str::to_string).collect()))
                .map_err(ImportError::from),
        )
    }
}

// ==========================================
// RowStream - 异步逐行读取
// ==========================================
pub struct RowStream {
    header: Vec<String>,
    rx: mpsc::Receiver<ImportResult<RowContext>>,
}

impl RowStream {
    /// 在阻塞线程中打开 CSV 并持续读取
    ///
    /// # 参数
    /// - buffer: 通道容量（读取线程最多领先的行数）
    ///
    /// # 错误
    /// 同 CsvRowReader::open
    pub async fn open(path: PathBuf, encoding: CsvEncoding, buffer: usize) -> ImportResult<Self> {
        let reader = tokio::task::spawn_blocking(move || CsvRowReader::open(&path, encoding))
            .await
            .map_err(|e| ImportError::Other(anyhow::Error::from(e)))??;
        let header = reader.header().to_vec();

        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::task::spawn_blocking(move || {
            for row in reader {
                let failed = row.is_err();
                // 接收端已放弃
                if tx.blocking_send(row).is_err() || failed {
                    break;
                }
            }
        });

        Ok(Self { header, rx })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// 下一行; 读完返回 None
    pub async fn next(&mut self) -> Option<ImportResult<RowContext>> {
        self.rx.recv().await
    }
}

// ==========================================
// Excel -> CSV 转换
// ==========================================
// 工作表: 优先 "Sheet1",否则第一个工作表
// 输出: UTF-8 CSV
pub fn excel_to_csv(excel_path: &Path, csv_path: &Path) -> ImportResult<()> {
    let mut workbook = open_workbook_auto(excel_path)?;

    let sheet_names = workbook.sheet_names();
    let sheet = sheet_names
        .iter()
        .find(|name| name.as_str() == "Sheet1")
        .or_else(|| sheet_names.first())
        .cloned()
        .ok_or_else(|| {
            ImportError::FileAccess(
                Message::new("import.fatal.excel_convert").arg("reason", "no worksheet"),
            )
        })?;

    let range = workbook.worksheet_range(&sheet)?;
    let mut writer = csv::Writer::from_path(csv_path)?;
    let mut rows = 0usize;
    for row in range.rows() {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        writer.write_record(&cells)?;
        rows += 1;
    }
    writer.flush()?;

    debug!(sheet = %sheet, rows = rows, "Excel 转换 CSV 完成");
    Ok(())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_datetime_to_string(dt),
    }
}

// 纯时间 -> HH:MM:SS; 零点 -> YYYY-MM-DD; 其他 -> YYYY-MM-DD HH:MM:SS
fn excel_datetime_to_string(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(ndt) if dt.as_f64() < 1.0 => ndt.format("%H:%M:%S").to_string(),
        Some(ndt) if ndt.time().num_seconds_from_midnight() == 0 => {
            ndt.format("%Y-%m-%d").to_string()
        }
        Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => dt.as_f64().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn read_all(bytes: &[u8], encoding: CsvEncoding) -> String {
        let mut reader = DecodingReader::new(bytes, encoding);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decoding_shift_jis() {
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("品名,数量\n部品,3\n");
        assert_eq!(read_all(&encoded, CsvEncoding::ShiftJis), "品名,数量\n部品,3\n");
    }

    #[test]
    fn test_decoding_strips_utf8_bom() {
        let bytes = "\u{FEFF}id,name\n".as_bytes();
        assert_eq!(read_all(bytes, CsvEncoding::Utf8), "id,name\n");
    }

    #[test]
    fn test_decoding_large_input_across_chunks() {
        let text = "名前,値\n".repeat(5_000);
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(&text);
        assert_eq!(read_all(&encoded, CsvEncoding::ShiftJis), text);
    }

    #[test]
    fn test_csv_row_reader_indices() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "id, name ,amount\n,Widget,10.5\nabc,\"a,b\",\n").unwrap();

        let mut reader = CsvRowReader::open(temp_file.path(), CsvEncoding::Utf8).unwrap();
        assert_eq!(reader.header(), &["id", "name", "amount"]);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.index, 2);
        assert_eq!(first.raw_columns, vec!["", "Widget", "10.5"]);

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.index, 3);
        assert_eq!(second.item_id(), Some("abc"));
        assert_eq!(second.cell(1), "a,b");

        assert!(reader.next().is_none());
    }

    #[test]
    fn test_csv_row_reader_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let err = CsvRowReader::open(temp_file.path(), CsvEncoding::Utf8)
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_row_stream_delivers_rows_in_order() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let mut text = String::from("id,name\n");
        for i in 0..50 {
            text.push_str(&format!(",item{}\n", i));
        }
        write!(temp_file, "{}", text).unwrap();

        let mut stream = RowStream::open(temp_file.path().to_path_buf(), CsvEncoding::Utf8, 4)
            .await
            .unwrap();
        assert_eq!(stream.header(), &["id", "name"]);

        let mut indices = Vec::new();
        while let Some(row) = stream.next().await {
            let row = row.unwrap();
            assert_eq!(row.cell(1), format!("item{}", row.index - 2));
            indices.push(row.index);
        }
        assert_eq!(indices, (2..52).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_row_stream_open_errors() {
        let temp_file = NamedTempFile::new().unwrap();
        let err = RowStream::open(temp_file.path().to_path_buf(), CsvEncoding::Utf8, 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_file_is_file_access_error() {
        let err = CsvRowReader::open(Path::new("/nonexistent/data.csv"), CsvEncoding::Utf8)
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::FileAccess(_)));
    }
}
