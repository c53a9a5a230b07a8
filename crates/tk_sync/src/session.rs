use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tk_sync_entity::VideoKey;
use tokio::fs;

use crate::config::Config;
use crate::error::{ExecutionStatus, TkError};
use crate::ledger::Ledger;
use crate::locator::{FetchMode, Fetched, Media, MediaLocator};
use crate::tabular::Table;
use crate::utils::aux_process::AuxProcess;
use crate::utils::throttle::Throttle;

/// 一次批量任务中各状态的视频数量
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, status: &ExecutionStatus) {
        match status {
            ExecutionStatus::Succeeded => self.succeeded += 1,
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Ignored(_) => self.ignored += 1,
            ExecutionStatus::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.ignored + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "共 {} 个视频，成功 {}，跳过 {}，暂不可用 {}，失败 {}",
            self.total(),
            self.succeeded,
            self.skipped,
            self.ignored,
            self.failed
        )
    }
}

/// 批量任务的结果。Bytes 模式下视频内容只存在于 fetched 中，调用方需要自行保存
#[derive(Debug, Default)]
pub struct BatchReport {
    pub summary: BatchSummary,
    /// 成功获取以及因文件已存在而跳过的视频，顺序与输入一致
    pub fetched: Vec<Fetched>,
}

/// 采集会话，持有账本、视频源、限速器以及辅助进程
pub struct Session<L: MediaLocator> {
    ledger: Ledger,
    locator: L,
    folder: Option<PathBuf>,
    meta_path: Option<PathBuf>,
    csv: Option<PathBuf>,
    throttle: Throttle,
    aux: Option<AuxProcess>,
}

impl<L: MediaLocator> Session<L> {
    pub fn open(config: &Config, locator: L) -> Result<Self> {
        if let Some(folder) = &config.folder {
            std::fs::create_dir_all(folder).with_context(|| format!("failed to create {}", folder.display()))?;
        }
        let mut session = Self {
            ledger: Ledger::new(config.skip),
            locator,
            folder: config.folder.clone(),
            meta_path: config.meta_path(),
            csv: config.csv.clone(),
            throttle: Throttle::new(config.sleep_range),
            aux: None,
        };
        if let Some(csv) = config.csv.as_deref() {
            session.read_csv(csv)?;
        }
        if let Some(argv) = &config.aux_command {
            session.aux = Some(AuxProcess::spawn(argv)?);
        }
        Ok(session)
    }

    /// 读取输入表格，并合并 meta.csv 中已有的采集记录
    pub fn read_csv(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(TkError::configuration(format!("input csv {} does not exist", path.display())).into());
        }
        let input = Table::read(path)?;
        let persisted = match &self.meta_path {
            Some(meta_path) if meta_path.is_file() => Some(Table::read(meta_path)?),
            _ => None,
        };
        if input.is_empty() {
            warn!("{} 中没有任何视频", path.display());
        }
        self.ledger.load(input, persisted)?;
        info!(
            "已加载 {}：共 {} 个视频，{} 个已采集，{} 个待采集",
            path.display(),
            self.ledger.len(),
            self.ledger.collected_count(),
            self.ledger.pending().len()
        );
        Ok(())
    }

    async fn locate(&mut self, key: &VideoKey) -> Result<Vec<u8>> {
        let bytes = self.locator.locate(key).await?;
        if bytes.is_empty() {
            return Err(TkError::unavailable(key, "empty content").into());
        }
        Ok(bytes)
    }

    /// 成功后追加采集记录，按需等待
    async fn finish(&mut self, key: VideoKey, media: Media, throttle: bool) -> Fetched {
        let collected_at = chrono::Local::now().naive_local();
        self.ledger
            .record_collected(key.video_id, key.author_id.clone(), collected_at);
        if throttle {
            self.throttle.pause().await;
        }
        Fetched {
            key,
            media,
            collected_at: Some(collected_at),
        }
    }

    pub async fn get_video_bytes(&mut self, author_id: &str, video_id: u64, throttle: bool) -> Result<Fetched> {
        let key = VideoKey::new(video_id, author_id);
        let bytes = self.locate(&key).await?;
        Ok(self.finish(key, Media::InMemory(bytes), throttle).await)
    }

    /// 未指定 file 时保存为 folder/{video_id}.mp4，开启 skip 且文件已存在时不会访问视频源
    pub async fn get_video_file(
        &mut self,
        author_id: &str,
        video_id: u64,
        throttle: bool,
        file: Option<&Path>,
    ) -> Result<Fetched> {
        let key = VideoKey::new(video_id, author_id);
        let target = match (file, &self.folder) {
            (Some(file), _) => file.to_path_buf(),
            (None, Some(folder)) => folder.join(format!("{}.mp4", video_id)),
            (None, None) => {
                return Err(TkError::configuration(format!("no output file or folder for {key}")).into());
            }
        };
        if self.ledger.skip() && fs::try_exists(&target).await? {
            info!("{} 已存在，跳过", target.display());
            return Ok(Fetched {
                key,
                media: Media::OnDisk(target),
                collected_at: None,
            });
        }
        let bytes = self.locate(&key).await?;
        write_file(&target, &bytes).await?;
        Ok(self.finish(key, Media::OnDisk(target), throttle).await)
    }

    pub async fn get_video(&mut self, author_id: &str, video_id: u64, throttle: bool, mode: FetchMode) -> Result<Fetched> {
        match mode {
            FetchMode::Bytes => self.get_video_bytes(author_id, video_id, throttle).await,
            FetchMode::File => self.get_video_file(author_id, video_id, throttle, None).await,
        }
    }

    /// 依次处理每个视频，单个视频的错误只记录日志，只有致命错误会中止
    pub async fn get_videos(&mut self, keys: &[VideoKey], throttle: bool, mode: FetchMode) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for (idx, key) in keys.iter().enumerate() {
            let status = match self.get_video(&key.author_id, key.video_id, throttle, mode).await {
                Ok(fetched) => {
                    let status = match (&fetched.collected_at, &fetched.media) {
                        (None, _) => ExecutionStatus::Skipped,
                        (Some(_), Media::OnDisk(path)) => {
                            info!("[{}/{}] {} 采集成功，已保存到 {}", idx + 1, keys.len(), key, path.display());
                            ExecutionStatus::Succeeded
                        }
                        (Some(_), Media::InMemory(bytes)) => {
                            info!("[{}/{}] {} 采集成功，共 {} 字节", idx + 1, keys.len(), key, bytes.len());
                            ExecutionStatus::Succeeded
                        }
                    };
                    report.fetched.push(fetched);
                    status
                }
                Err(e) if e.downcast_ref::<TkError>().is_some_and(TkError::is_fatal) => return Err(e),
                Err(e) => ExecutionStatus::from(Err::<ExecutionStatus, _>(e)),
            };
            match &status {
                ExecutionStatus::Ignored(e) => warn!("[{}/{}] {} 暂时无法获取：{:#}", idx + 1, keys.len(), key, e),
                ExecutionStatus::Failed(e) => error!("[{}/{}] {} 采集失败：{:#}", idx + 1, keys.len(), key, e),
                _ => {}
            }
            report.summary.record(&status);
        }
        Ok(report)
    }

    pub async fn get_videos_from_self(&mut self, throttle: bool, mode: FetchMode) -> Result<BatchReport> {
        let pending = self.ledger.pending();
        if pending.is_empty() {
            info!("没有待采集的视频");
            return Ok(BatchReport::default());
        }
        info!("开始采集 {} 个视频..", pending.len());
        self.get_videos(&pending, throttle, mode).await
    }

    pub async fn get_videos_from_csv(&mut self, path: &Path, throttle: bool, mode: FetchMode) -> Result<BatchReport> {
        self.read_csv(path)?;
        self.get_videos_from_self(throttle, mode).await
    }

    /// 将账本写入 meta.csv，返回写入的行数
    pub fn persist(&self) -> Result<usize> {
        let Some(meta_path) = &self.meta_path else {
            return Err(TkError::configuration("no output folder, cannot persist meta.csv").into());
        };
        let count = self.ledger.persist(meta_path)?;
        info!("已写入 {} 条采集记录到 {}", count, meta_path.display());
        Ok(count)
    }

    /// 批量入口：采集所有待采集的视频并保存 meta.csv
    pub async fn auto_main(&mut self) -> Result<BatchSummary> {
        let mut missing = Vec::new();
        if self.folder.is_none() {
            missing.push("folder");
        }
        if self.meta_path.is_none() {
            missing.push("meta path");
        }
        if self.csv.is_none() {
            missing.push("input csv");
        }
        if !missing.is_empty() {
            return Err(TkError::configuration(format!("auto_main requires {}", missing.join(", "))).into());
        }
        let res = self.get_videos_from_self(true, FetchMode::File).await;
        // 即使中途遇到致命错误，已经采集成功的记录也需要保存
        let persisted = self.persist();
        let summary = match (res, persisted) {
            (Ok(report), Ok(_)) => report.summary,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), persisted) => {
                if let Err(persist_err) = persisted {
                    error!("保存采集记录时遇到错误：{:#}", persist_err);
                }
                return Err(e);
            }
        };
        info!("本轮采集完成，{}", summary);
        Ok(summary)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// 关闭浏览器并终止辅助进程，两者都会尝试，返回遇到的第一个错误
    pub async fn close(mut self) -> Result<()> {
        let locator_res = self.locator.close().await;
        let aux_res = match self.aux.as_mut() {
            Some(aux) => aux.terminate().await,
            None => Ok(()),
        };
        locator_res.and(aux_res)
    }
}

/// 先写入同目录的临时文件再重命名
async fn write_file(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = target.with_file_name(format!("{file_name}.tmp"));
    fs::write(&temp_path, bytes)
        .await
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, target)
        .await
        .with_context(|| format!("failed to replace {}", target.display()))?;
    Ok(())
}
