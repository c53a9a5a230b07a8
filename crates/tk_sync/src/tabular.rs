//! 行式表格存储，读取输入的 csv 并写出规范格式的 meta.csv

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use tk_sync_entity::VideoRecord;

pub const VIDEO_ID: &str = "video_id";
pub const AUTHOR_ID: &str = "author_id";
pub const COLLECT_TIMESTAMP: &str = "collect_timestamp";

// polars 等工具导出缺失值时会写出这些占位符
const NULL_MARKERS: [&str; 4] = ["NaN", "nan", "null", "None"];

/// 未经解释的表格内容，列的语义由 Ledger 负责
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    source: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(source: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source: source.into(),
            headers,
            rows,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_reader(path, file).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_reader<R: io::Read>(source: impl Into<PathBuf>, reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).flexible(true).from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_owned).collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = record
                .iter()
                .map(|cell| {
                    if NULL_MARKERS.contains(&cell) {
                        String::new()
                    } else {
                        cell.to_owned()
                    }
                })
                .collect::<Vec<_>>();
            // 短行补齐，保证按列下标访问不越界
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self::new(source, headers, rows))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// 重命名列，返回该列是否存在
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column(from) {
            Some(idx) => {
                self.headers[idx] = to.to_owned();
                true
            }
            None => false,
        }
    }

    /// 删除列及其所有单元格，返回该列是否存在
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column(name) else {
            return false;
        };
        self.headers.remove(idx);
        for row in self.rows.iter_mut() {
            row.remove(idx);
        }
        true
    }
}

/// 以规范列名写出记录，返回写入的行数
pub fn write_records<'a, W, I>(writer: W, records: I) -> Result<usize>
where
    W: io::Write,
    I: IntoIterator<Item = &'a VideoRecord>,
{
    // 表头手动写出，空记录也能得到完整的表头
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record([VIDEO_ID, AUTHOR_ID, COLLECT_TIMESTAMP])?;
    let mut count = 0;
    for record in records {
        writer.serialize(record)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// 先写入同目录下的临时文件再重命名，避免中途崩溃留下残缺的 meta.csv
pub fn save_records<'a, I>(path: &Path, records: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a VideoRecord>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("csv.tmp");
    let file = File::create(&temp_path).with_context(|| format!("failed to create {}", temp_path.display()))?;
    let count = write_records(io::BufWriter::new(file), records)?;
    fs::rename(&temp_path, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_read_table() {
        let input = "id, author_unique_id ,extra\n1,a,x\n2,b\n3,NaN,z\n";
        let table = Table::from_reader("in.csv", input.as_bytes()).unwrap();
        assert_eq!(table.headers(), ["id", "author_unique_id", "extra"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[1], ["2", "b", ""]);
        assert_eq!(table.rows()[2], ["3", "", "z"]);
        assert_eq!(table.source(), Path::new("in.csv"));
    }

    #[test]
    fn test_column_operations() {
        let mut table = Table::from_reader("in.csv", "id,author_id,author_unique_id\n1,old,new\n".as_bytes()).unwrap();
        assert!(table.drop_column(AUTHOR_ID));
        assert!(!table.drop_column(AUTHOR_ID));
        assert!(table.rename_column("author_unique_id", AUTHOR_ID));
        assert!(table.rename_column("id", VIDEO_ID));
        assert!(!table.rename_column("id", VIDEO_ID));
        assert_eq!(table.headers(), [VIDEO_ID, AUTHOR_ID]);
        assert_eq!(table.rows()[0], ["1", "new"]);
    }

    #[test]
    fn test_write_records() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let records = [
            VideoRecord::new(7000000000000000001, "a", Some(ts)),
            VideoRecord::new(2, "b,c", None),
        ];
        let mut buf = Vec::new();
        assert_eq!(write_records(&mut buf, &records).unwrap(), 2);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "video_id,author_id,collect_timestamp\n\
             7000000000000000001,a,2024-01-01T08:00:00.000000\n\
             2,\"b,c\",\n"
        );
    }

    #[test]
    fn test_save_records_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("meta.csv");
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let first = [VideoRecord::new(1, "a", Some(ts)), VideoRecord::new(2, "b", Some(ts))];
        assert_eq!(save_records(&path, &first).unwrap(), 2);
        assert_eq!(save_records(&path, &first[..1]).unwrap(), 1);
        let table = Table::read(&path).unwrap();
        assert_eq!(table.headers(), [VIDEO_ID, AUTHOR_ID, COLLECT_TIMESTAMP]);
        assert_eq!(table.rows(), [vec!["1".to_owned(), "a".to_owned(), "2024-01-01T00:00:00.000000".to_owned()]]);
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
