use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDateTime;
use tk_sync_entity::{VideoKey, VideoRecord, timestamp};

use crate::error::TkError;
use crate::tabular::{self, AUTHOR_ID, COLLECT_TIMESTAMP, Table, VIDEO_ID};

// 旧版导出文件使用的列名
const LEGACY_VIDEO_ID: &str = "id";
const LEGACY_AUTHOR_ID: &str = "author_unique_id";

/// 采集账本，记录所有需要采集的视频以及已经采集成功的时间。
/// 运行期间只追加不修改，待采集集合每次都从当前记录重新计算，不单独保存。
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<VideoRecord>,
    skip: bool,
}

impl Ledger {
    pub fn new(skip: bool) -> Self {
        Self {
            records: Vec::new(),
            skip,
        }
    }

    /// 用输入表格替换当前记录，并合并上一次运行持久化的、带有时间戳的记录。
    /// 同一个 (video_id, author_id) 只保留第一次出现的位置，后续出现的时间戳只用于补全缺失的时间戳。
    pub fn load(&mut self, input: Table, persisted: Option<Table>) -> Result<()> {
        let mut records = records_from_table(input)?;
        if let Some(persisted) = persisted {
            records.extend(
                records_from_table(persisted)?
                    .into_iter()
                    .filter(VideoRecord::is_collected),
            );
        }
        self.records = dedup_records(records);
        Ok(())
    }

    /// 计算待采集的视频集合，保持第一次出现的顺序且不包含重复项。
    /// 开启 skip 时排除任何一条记录已带有时间戳的视频，关闭时返回所有视频。
    pub fn pending(&self) -> Vec<VideoKey> {
        let collected: HashSet<VideoKey> = if self.skip {
            self.records
                .iter()
                .filter(|r| r.is_collected())
                .map(VideoRecord::key)
                .collect()
        } else {
            HashSet::new()
        };
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(VideoRecord::key)
            .filter(|key| !collected.contains(key) && seen.insert(key.clone()))
            .collect()
    }

    /// 追加一条采集成功的记录，不修改同一视频的旧记录，去重发生在下一次 load
    pub fn record_collected(&mut self, video_id: u64, author_id: impl Into<String>, timestamp: NaiveDateTime) {
        self.records.push(VideoRecord::new(video_id, author_id, Some(timestamp)));
    }

    /// 需要持久化的记录，永远不包含没有时间戳的记录
    pub fn persisted(&self) -> impl Iterator<Item = &VideoRecord> {
        self.records.iter().filter(|r| r.is_collected())
    }

    /// 将账本写入表格存储，返回写入的行数
    pub fn persist(&self, path: &Path) -> Result<usize> {
        tabular::save_records(path, self.persisted())
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn collected_count(&self) -> usize {
        self.persisted().count()
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }
}

/// 统一旧版列名，id -> video_id，author_unique_id -> author_id（覆盖已有的 author_id）
fn normalize_columns(table: &mut Table) {
    if table.has_column(LEGACY_VIDEO_ID) && !table.has_column(VIDEO_ID) {
        table.rename_column(LEGACY_VIDEO_ID, VIDEO_ID);
    }
    if table.has_column(LEGACY_AUTHOR_ID) {
        table.drop_column(AUTHOR_ID);
        table.rename_column(LEGACY_AUTHOR_ID, AUTHOR_ID);
    }
}

fn records_from_table(mut table: Table) -> Result<Vec<VideoRecord>> {
    normalize_columns(&mut table);
    let source = table.source().to_path_buf();
    let (video_idx, author_idx) = match (table.column(VIDEO_ID), table.column(AUTHOR_ID)) {
        (Some(v), Some(a)) => (v, a),
        (video_idx, author_idx) => {
            let missing = [(VIDEO_ID, video_idx), (AUTHOR_ID, author_idx)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name)
                .collect::<Vec<_>>();
            return Err(TkError::schema(source, format!("missing required column(s): {}", missing.join(", "))).into());
        }
    };
    let timestamp_idx = table.column(COLLECT_TIMESTAMP);
    let mut records = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows().iter().enumerate() {
        // 行号从 2 开始，与编辑器中看到的行号一致（第 1 行是表头）
        let line = row_idx + 2;
        let raw_video_id = row[video_idx].as_str();
        if raw_video_id.is_empty() {
            warn!("{} 第 {} 行缺少 video_id，已跳过", source.display(), line);
            continue;
        }
        let video_id = parse_video_id(raw_video_id)
            .ok_or_else(|| TkError::schema(&source, format!("invalid video_id {raw_video_id:?} at line {line}")))?;
        let collect_timestamp = match timestamp_idx.map(|idx| timestamp::parse(&row[idx])) {
            Some(Ok(ts)) => ts,
            Some(Err(raw)) => {
                warn!(
                    "{} 第 {} 行的 collect_timestamp {:?} 无法解析，视为未采集",
                    source.display(),
                    line,
                    raw
                );
                None
            }
            None => None,
        };
        records.push(VideoRecord::new(video_id, row[author_idx].clone(), collect_timestamp));
    }
    Ok(records)
}

// 部分工具会把整数列导出为浮点数，例如 "7234567890123456789.0"
fn parse_video_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.strip_suffix(".0").and_then(|s| s.parse::<u64>().ok()))
}

fn dedup_records(records: Vec<VideoRecord>) -> Vec<VideoRecord> {
    let mut index: HashMap<VideoKey, usize> = HashMap::with_capacity(records.len());
    let mut deduped: Vec<VideoRecord> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&record.key()) {
            Some(&idx) => {
                if deduped[idx].collect_timestamp.is_none() {
                    deduped[idx].collect_timestamp = record.collect_timestamp;
                }
            }
            None => {
                index.insert(record.key(), deduped.len());
                deduped.push(record);
            }
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn table(content: &str) -> Table {
        Table::from_reader("test.csv", content.as_bytes()).unwrap()
    }

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_pending_excludes_collected() {
        let mut ledger = Ledger::new(true);
        ledger
            .load(table("video_id,author_id,collect_timestamp\n1,a,\n2,b,2024-01-01\n"), None)
            .unwrap();
        assert_eq!(ledger.pending(), [VideoKey::new(1, "a")]);
        // 关闭 skip 后所有视频都需要采集
        ledger.set_skip(false);
        assert_eq!(ledger.pending(), [VideoKey::new(1, "a"), VideoKey::new(2, "b")]);
    }

    #[test]
    fn test_pending_without_duplicates() {
        let mut ledger = Ledger::new(true);
        ledger
            .load(table("video_id,author_id\n3,c\n1,a\n3,c\n1,a\n3,d\n"), None)
            .unwrap();
        assert_eq!(
            ledger.pending(),
            [VideoKey::new(3, "c"), VideoKey::new(1, "a"), VideoKey::new(3, "d")]
        );
        // 追加的成功记录在同一次运行中也会从待采集集合中排除
        ledger.record_collected(3, "c", ts(2));
        assert_eq!(ledger.pending(), [VideoKey::new(1, "a"), VideoKey::new(3, "d")]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let input = "video_id,author_id,collect_timestamp\n1,a,\n2,b,2024-01-01T00:00:00\n1,a,\n2,b,\n";
        let persisted = "video_id,author_id,collect_timestamp\n1,a,2024-01-03T00:00:00\n9,z,\n";
        let mut first = Ledger::new(true);
        first.load(table(input), Some(table(persisted))).unwrap();
        let mut second = first.clone();
        second.load(table(input), Some(table(persisted))).unwrap();
        assert_eq!(first.records(), second.records());
        assert_eq!(
            first.records(),
            [
                VideoRecord::new(1, "a", Some(ts(3))),
                VideoRecord::new(2, "b", Some(ts(1))),
            ]
        );
        assert!(first.pending().is_empty());
    }

    #[test]
    fn test_load_keeps_existing_timestamp() {
        let mut ledger = Ledger::new(true);
        ledger
            .load(
                table("video_id,author_id,collect_timestamp\n1,a,2024-01-01\n"),
                Some(table("video_id,author_id,collect_timestamp\n1,a,2024-01-05\n")),
            )
            .unwrap();
        assert_eq!(ledger.records(), [VideoRecord::new(1, "a", Some(ts(1)))]);
    }

    #[test]
    fn test_alias_normalization() {
        let mut canonical = Ledger::new(true);
        canonical
            .load(table("video_id,author_id,collect_timestamp\n1,a,\n2,b,2024-01-01\n"), None)
            .unwrap();
        let mut legacy = Ledger::new(true);
        legacy
            .load(table("id,author_unique_id,collect_timestamp\n1,a,\n2,b,2024-01-01\n"), None)
            .unwrap();
        assert_eq!(canonical.records(), legacy.records());
        // author_unique_id 优先于已经存在的 author_id
        let mut both = Ledger::new(true);
        both.load(table("id,author_id,author_unique_id\n1,123456,a\n"), None).unwrap();
        assert_eq!(both.records(), [VideoRecord::pending(1, "a")]);
        // 已经存在 video_id 时不会使用 id
        let mut both = Ledger::new(true);
        both.load(table("id,video_id,author_id\n99,1,a\n"), None).unwrap();
        assert_eq!(both.records(), [VideoRecord::pending(1, "a")]);
    }

    #[test]
    fn test_schema_error() {
        let mut ledger = Ledger::new(true);
        let err = ledger.load(table("video,author\n1,a\n"), None).unwrap_err();
        match err.downcast_ref::<TkError>() {
            Some(TkError::Schema { reason, .. }) => assert!(reason.contains("video_id, author_id")),
            _ => panic!("unexpected error: {err}"),
        }
        let err = ledger.load(table("video_id,author_id\nabc,a\n"), None).unwrap_err();
        assert!(matches!(err.downcast_ref::<TkError>(), Some(TkError::Schema { .. })));
        // 持久化文件的结构错误同样是致命错误
        let err = ledger
            .load(table("video_id,author_id\n1,a\n"), Some(table("author_id\na\n")))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TkError>(), Some(TkError::Schema { .. })));
    }

    #[test]
    fn test_load_tolerates_dirty_cells() {
        let mut ledger = Ledger::new(true);
        ledger
            .load(
                table("video_id,author_id,collect_timestamp\n,a,\n7234567890123456789.0,b,not a date\n3,c,NaN\n"),
                None,
            )
            .unwrap();
        assert_eq!(
            ledger.records(),
            [
                VideoRecord::pending(7234567890123456789, "b"),
                VideoRecord::pending(3, "c"),
            ]
        );
    }

    #[test]
    fn test_persist_filters_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        let mut ledger = Ledger::new(true);
        ledger
            .load(table("video_id,author_id,collect_timestamp\n1,a,\n2,b,\n"), None)
            .unwrap();
        ledger.record_collected(1, "a", ts(7));
        // 追加不会修改旧记录
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.collected_count(), 1);
        assert_eq!(ledger.persist(&path).unwrap(), 1);
        let written = table(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(written.headers(), [VIDEO_ID, AUTHOR_ID, COLLECT_TIMESTAMP]);
        assert_eq!(written.len(), 1);
        assert_eq!(written.rows()[0], ["1", "a", "2024-01-07T00:00:00.000000"]);
        // 重新加载时重复记录被合并
        let mut reloaded = Ledger::new(true);
        reloaded
            .load(
                table("video_id,author_id,collect_timestamp\n1,a,\n2,b,\n"),
                Some(Table::read(&path).unwrap()),
            )
            .unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.pending(), [VideoKey::new(2, "b")]);
    }
}
