use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// 写入 meta.csv 时统一使用的时间格式
pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

// 读取时兼容的格式，按顺序尝试
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn format(timestamp: &NaiveDateTime) -> String {
    timestamp.format(FORMAT).to_string()
}

/// 解析一个时间单元格，空字符串返回 Ok(None)，无法识别的内容返回 Err 并携带原始内容
pub fn parse(value: &str) -> Result<Option<NaiveDateTime>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.naive_local()));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(dt));
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(dt));
    }
    Err(value.to_owned())
}

pub mod option {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&super::format(ts)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        super::parse(&value).map_err(|v| serde::de::Error::custom(format!("invalid timestamp: {v}")))
    }
}
