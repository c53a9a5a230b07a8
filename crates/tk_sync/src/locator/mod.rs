mod tiktok;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tk_sync_entity::VideoKey;

pub use crate::locator::tiktok::TikTokLocator;

/// 根据 (author_id, video_id) 找到视频并下载其内容
#[async_trait]
pub trait MediaLocator: Send {
    /// 视频已删除、私密或为图集时返回 TkError::MediaUnavailable，
    /// 下载中断或不完整时返回 TkError::Transfer
    async fn locate(&mut self, key: &VideoKey) -> Result<Vec<u8>>;

    async fn close(&mut self) -> Result<()>;
}

/// 调用方决定视频内容保留在内存中还是写入文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    Bytes,
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    InMemory(Vec<u8>),
    OnDisk(PathBuf),
}

/// 一次成功获取的结果，跳过已存在的文件时 collected_at 为 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub key: VideoKey,
    pub media: Media,
    pub collected_at: Option<NaiveDateTime>,
}

impl Fetched {
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.media {
            Media::OnDisk(path) => Some(path),
            Media::InMemory(_) => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.media {
            Media::InMemory(bytes) => Some(bytes),
            Media::OnDisk(_) => None,
        }
    }
}
