use std::io;
use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TkError {
    /// 输入表格缺少必要的列，或者标识列无法解析
    #[error("schema error in {}: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },
    /// 视频已删除、设为私密或者是图集，本轮无法获取内容
    #[error("media unavailable for {key}: {reason}")]
    MediaUnavailable { key: String, reason: String },
    /// 下载被中断或者内容不完整
    #[error("transfer error for {key}: {reason}")]
    Transfer { key: String, reason: String },
    /// 批量入口所需的配置缺失
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TkError {
    pub fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::MediaUnavailable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transfer(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::Transfer {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// 只有表格结构错误和配置错误会中止整次运行
    pub fn is_fatal(&self) -> bool {
        matches!(self, TkError::Schema { .. } | TkError::Configuration(_))
    }
}

/// 单个视频的处理结果
#[derive(Debug)]
pub enum ExecutionStatus {
    /// 目标文件已存在，没有访问视频源
    Skipped,
    Succeeded,
    /// 软失败，该视频保持待采集状态，下一次运行时重试
    Ignored(anyhow::Error),
    /// 硬失败，同样不会中止批量任务
    Failed(anyhow::Error),
}

// 与 ? 搭配使用：函数内部返回 Result<ExecutionStatus>，在调用处统一归类
impl From<Result<ExecutionStatus>> for ExecutionStatus {
    fn from(res: Result<ExecutionStatus>) -> Self {
        match res {
            Ok(status) => status,
            Err(err) => {
                for cause in err.chain() {
                    if cause
                        .downcast_ref::<TkError>()
                        .is_some_and(|e| matches!(e, TkError::MediaUnavailable { .. } | TkError::Transfer { .. }))
                    {
                        return ExecutionStatus::Ignored(err);
                    }
                    if cause
                        .downcast_ref::<reqwest::Error>()
                        .is_some_and(|e| e.is_decode() || e.is_body() || e.is_timeout())
                    {
                        return ExecutionStatus::Ignored(err);
                    }
                    if cause
                        .downcast_ref::<io::Error>()
                        .is_some_and(|e| e.kind() == io::ErrorKind::UnexpectedEof)
                    {
                        return ExecutionStatus::Ignored(err);
                    }
                }
                ExecutionStatus::Failed(err)
            }
        }
    }
}
