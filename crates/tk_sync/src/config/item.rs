use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 两次成功下载之间随机等待的秒数范围（闭区间）
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepRange {
    pub min: u64,
    pub max: u64,
}

impl Default for SleepRange {
    fn default() -> Self {
        Self { min: 45, max: 70 }
    }
}

impl SleepRange {
    pub fn new(a: u64, b: u64) -> Self {
        Self { min: a, max: b }.normalized()
    }

    /// 上下界写反时自动交换
    pub fn normalized(self) -> Self {
        if self.min <= self.max {
            self
        } else {
            Self {
                min: self.max,
                max: self.min,
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max == 0
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        let range = self.normalized();
        (Duration::from_secs(range.min), Duration::from_secs(range.max))
    }
}

pub(super) fn default_element_timeout_secs() -> u64 {
    240
}

pub(super) fn default_page_settle_secs() -> u64 {
    10
}

pub(super) fn default_start_url() -> String {
    "https://www.tiktok.com/".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_range_normalize() {
        assert_eq!(SleepRange::new(70, 45), SleepRange { min: 45, max: 70 });
        assert_eq!(SleepRange::new(3, 3), SleepRange { min: 3, max: 3 });
        assert_eq!(
            SleepRange { min: 9, max: 1 }.bounds(),
            (Duration::from_secs(1), Duration::from_secs(9))
        );
        assert!(SleepRange::new(0, 0).is_disabled());
        assert!(!SleepRange::default().is_disabled());
    }
}
