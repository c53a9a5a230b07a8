use std::time::Duration;

use rand::Rng;

use crate::config::SleepRange;

/// 两次成功下载之间的随机等待，模拟人工浏览的节奏
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    range: SleepRange,
}

impl Throttle {
    pub fn new(range: SleepRange) -> Self {
        Self {
            range: range.normalized(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.range.is_disabled()
    }

    /// 在闭区间内均匀抽取一个等待时长
    pub fn next_delay(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::rng().random_range(self.range.min..=self.range.max))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!("等待 {} 秒后继续..", delay.as_secs());
        tokio::time::sleep(delay).await;
    }
}
