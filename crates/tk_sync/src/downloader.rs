use std::time::Duration;

use anyhow::{Context, Result};
use cookie::Cookie;
use futures::TryStreamExt;
use parking_lot::Once;
use reqwest::header;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use ua_generator::ua;

use crate::error::TkError;

// content-length 由服务端给出，预分配的内存不能超过这个上限
const MAX_PREALLOC: u64 = 64 << 20;

// 对 reqwest::Client 的简单封装，视频地址需要带上浏览器中的 cookie 才能访问
#[derive(Clone)]
pub struct Downloader(reqwest::Client);

impl Downloader {
    pub fn new(verify: bool) -> Result<Self> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");
        });
        // 不带浏览器的 header 时视频 CDN 会直接返回 403
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(ua::spoof_chrome_ua()),
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            header::REFERER,
            header::HeaderValue::from_static("https://www.tiktok.com/"),
        );
        if !verify {
            warn!("已关闭 TLS 证书校验");
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .danger_accept_invalid_certs(!verify)
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self(client))
    }

    /// 下载完整内容到内存，key 只用于错误信息
    pub async fn fetch(&self, key: &str, url: &str, cookies: &[(String, String)]) -> Result<Vec<u8>> {
        let mut req = self.0.get(url);
        if let Some(cookie) = cookie_header(cookies) {
            req = req.header(header::COOKIE, cookie);
        }
        let resp = req.send().await?.error_for_status()?;
        let expected = resp.header_content_length();
        let mut stream_reader = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
        let mut buf = Vec::with_capacity(initial_capacity(expected));
        if let Err(e) = stream_reader.read_to_end(&mut buf).await {
            return Err(TkError::transfer(key, format!("download interrupted after {} bytes: {e}", buf.len())).into());
        }
        check_length(key, expected, buf.len() as u64)?;
        Ok(buf)
    }
}

fn initial_capacity(expected: Option<u64>) -> usize {
    expected.map_or(0, |len| len.min(MAX_PREALLOC) as usize)
}

fn cookie_header(cookies: &[(String, String)]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| Cookie::new(name.as_str(), value.as_str()).stripped().to_string())
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn check_length(key: &str, expected: Option<u64>, received: u64) -> Result<(), TkError> {
    match expected {
        Some(expected) if expected != received => Err(TkError::transfer(
            key,
            format!("downloaded bytes mismatch: expected {}, got {}", expected, received),
        )),
        _ if received == 0 => Err(TkError::transfer(key, "empty response body")),
        _ => Ok(()),
    }
}

/// reqwest.content_length() 指的是 body_size 而非 content-length header，需要自己实现
/// https://github.com/seanmonstar/reqwest/issues/1814
trait ResponseExt {
    fn header_content_length(&self) -> Option<u64>;
}

impl ResponseExt for reqwest::Response {
    fn header_content_length(&self) -> Option<u64> {
        self.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header(&[]), None);
        let cookies = [
            ("tt_chain_token".to_owned(), "abc".to_owned()),
            ("msToken".to_owned(), "x=y".to_owned()),
        ];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("tt_chain_token=abc; msToken=x=y"));
    }

    #[test]
    fn test_check_length() {
        assert!(check_length("@a/1", Some(3), 3).is_ok());
        assert!(check_length("@a/1", None, 3).is_ok());
        assert!(matches!(check_length("@a/1", Some(4), 3), Err(TkError::Transfer { .. })));
        assert!(matches!(check_length("@a/1", None, 0), Err(TkError::Transfer { .. })));
    }

    #[test]
    fn test_initial_capacity() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(1024)), 1024);
        assert_eq!(initial_capacity(Some(900_000_000_000_000)), MAX_PREALLOC as usize);
    }

    /// 在本地端口上返回一次固定的响应
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request).await.unwrap();
            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}/video.mp4")
    }

    #[tokio::test]
    async fn test_fetch_with_bogus_content_length() {
        let downloader = Downloader::new(true).unwrap();
        let url = serve_once(b"HTTP/1.1 200 OK\r\ncontent-length: 900000000000000\r\nconnection: close\r\n\r\nabc").await;
        let err = downloader.fetch("@a/1", &url, &[]).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<TkError>(), Some(TkError::Transfer { .. })));
        let url = serve_once(b"HTTP/1.1 200 OK\r\ncontent-length: 3\r\nconnection: close\r\n\r\nabc").await;
        let cookies = [("tt_chain_token".to_owned(), "abc".to_owned())];
        assert_eq!(downloader.fetch("@a/1", &url, &cookies).await.unwrap(), b"abc");
    }

    #[ignore = "only for manual test"]
    #[tokio::test]
    async fn test_fetch() {
        let downloader = Downloader::new(true).unwrap();
        let bytes = downloader
            .fetch("manual", "https://www.tiktok.com/favicon.ico", &[])
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }
}
