use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tk_sync_entity::VideoKey;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::TkError;
use crate::locator::MediaLocator;

const CAROUSEL_SELECTOR: &str = "div.swiper-wrapper";
const ERROR_SELECTOR: &str = "div[class*='DivErrorContainer']";
const VIDEO_SELECTOR: &str = "video";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 通过浏览器打开视频页面取得真实的视频地址，再携带页面 cookie 下载
pub struct TikTokLocator {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    downloader: Downloader,
    page_settle: Duration,
    element_timeout: Duration,
}

impl TikTokLocator {
    pub async fn launch(config: &Config) -> Result<Self> {
        let downloader = Downloader::new(config.verify)?;
        let browser_config = browser_config(config)?;
        info!("启动浏览器（headless: {}）..", config.headless);
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });
        let page = browser
            .new_page(config.start_url.as_str())
            .await
            .with_context(|| format!("failed to open {}", config.start_url))?;
        Ok(Self {
            browser: Some(browser),
            page,
            handler,
            downloader,
            page_settle: config.page_settle(),
            element_timeout: config.element_timeout(),
        })
    }

    async fn has_element(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }

    /// 轮询等待视频元素出现，超时视为硬失败
    async fn wait_for_video_src(&self, key: &VideoKey) -> Result<String> {
        let deadline = Instant::now() + self.element_timeout;
        loop {
            if let Ok(element) = self.page.find_element(VIDEO_SELECTOR).await {
                return match element.attribute("src").await? {
                    Some(src) if !src.is_empty() => Ok(src),
                    _ => Err(TkError::unavailable(key, "video element has no src").into()),
                };
            }
            if Instant::now() >= deadline {
                bail!(
                    "timed out after {}s waiting for <video> on {}",
                    self.element_timeout.as_secs(),
                    key.page_url()
                );
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .page
            .get_cookies()
            .await
            .context("failed to read cookies from browser")?
            .into_iter()
            .map(|cookie| (cookie.name, cookie.value))
            .collect())
    }
}

#[async_trait]
impl MediaLocator for TikTokLocator {
    async fn locate(&mut self, key: &VideoKey) -> Result<Vec<u8>> {
        let url = key.page_url();
        self.page
            .goto(url.as_str())
            .await
            .with_context(|| format!("failed to navigate to {url}"))?;
        time::sleep(self.page_settle).await;
        if self.has_element(CAROUSEL_SELECTOR).await {
            return Err(TkError::unavailable(key, "carousel").into());
        }
        if self.has_element(ERROR_SELECTOR).await {
            return Err(TkError::unavailable(key, "removed or private").into());
        }
        let src = self.wait_for_video_src(key).await?;
        let cookies = self.cookies().await?;
        debug!("{} 的视频地址：{}", key, src);
        self.downloader.fetch(&key.to_string(), &src, &cookies).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let res = browser.close().await.map(|_| ()).map_err(|e| anyhow!("failed to close browser: {e}"));
        if let Err(e) = browser.wait().await {
            warn!("等待浏览器进程退出时遇到错误：{}", e);
        }
        self.handler.abort();
        info!("浏览器已关闭");
        res
    }
}

impl Drop for TikTokLocator {
    fn drop(&mut self) {
        // Browser 自身的 drop 会杀死浏览器进程，这里只需要停止事件循环
        self.handler.abort();
    }
}

fn browser_args(headless: bool) -> Vec<&'static str> {
    let mut args = vec!["--no-sandbox", "--start-maximized"];
    if headless {
        args.extend(["--headless=new", "--mute-audio"]);
    }
    args
}

fn browser_config(config: &Config) -> Result<BrowserConfig> {
    // 无头模式的参数由 browser_args 显式给出，不使用 chromiumoxide 默认的 --headless
    let mut builder = BrowserConfig::builder().with_head().args(browser_args(config.headless));
    if let Some(exe) = &config.chrome_executable {
        builder = builder.chrome_executable(exe);
    }
    builder
        .build()
        .map_err(|e| TkError::configuration(format!("failed to build browser config: {e}")).into())
}
