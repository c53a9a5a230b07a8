//! 采集记录实体定义

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 一个视频的唯一标识，由视频 id 和作者 id 共同确定
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VideoKey {
    pub video_id: u64,
    pub author_id: String,
}

impl VideoKey {
    pub fn new(video_id: u64, author_id: impl Into<String>) -> Self {
        Self {
            video_id,
            author_id: author_id.into(),
        }
    }

    /// 视频在 TikTok 上的页面地址
    pub fn page_url(&self) -> String {
        format!("https://www.tiktok.com/@{}/video/{}", self.author_id, self.video_id)
    }
}

impl fmt::Display for VideoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.author_id, self.video_id)
    }
}

/// 账本中的一行。collect_timestamp 为空表示该视频尚未采集成功
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: u64,
    pub author_id: String,
    #[serde(with = "crate::timestamp::option")]
    pub collect_timestamp: Option<NaiveDateTime>,
}

impl VideoRecord {
    pub fn new(video_id: u64, author_id: impl Into<String>, collect_timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            video_id,
            author_id: author_id.into(),
            collect_timestamp,
        }
    }

    pub fn pending(video_id: u64, author_id: impl Into<String>) -> Self {
        Self::new(video_id, author_id, None)
    }

    pub fn key(&self) -> VideoKey {
        VideoKey::new(self.video_id, self.author_id.clone())
    }

    pub fn is_collected(&self) -> bool {
        self.collect_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_key() {
        let key = VideoKey::new(7234567890123456789, "someone");
        assert_eq!(key.page_url(), "https://www.tiktok.com/@someone/video/7234567890123456789");
        assert_eq!(key.to_string(), "@someone/7234567890123456789");
        let record = VideoRecord::pending(7234567890123456789, "someone");
        assert_eq!(record.key(), key);
        assert!(!record.is_collected());
    }
}
