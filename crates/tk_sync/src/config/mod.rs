use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod args;
mod item;

pub use crate::config::args::{ARGS, Args, version};
use crate::config::item::{default_element_timeout_secs, default_page_settle_secs, default_start_url};
pub use crate::config::item::SleepRange;
use crate::error::TkError;

const CONFIG_FILE: &str = "config.toml";

/// 配置文件所在的目录，命令行参数优先
pub fn config_dir(args: &Args) -> PathBuf {
    args.config_dir.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tk-sync")
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default = "default_true")]
    pub skip: bool,
    #[serde(default)]
    pub sleep_range: SleepRange,
    /// 等待页面中出现视频元素的最长时间
    #[serde(default = "default_element_timeout_secs")]
    pub element_timeout_secs: u64,
    /// 打开视频页面后检查 DOM 之前的等待时间
    #[serde(default = "default_page_settle_secs")]
    pub page_settle_secs: u64,
    #[serde(default = "default_start_url")]
    pub start_url: String,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// 会话期间在后台运行的辅助进程，会话结束时保证被终止
    #[serde(default)]
    pub aux_command: Option<Vec<String>>,
    #[serde(default)]
    pub folder: Option<PathBuf>,
    #[serde(default)]
    pub csv: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless: true,
            verify: true,
            skip: true,
            sleep_range: SleepRange::default(),
            element_timeout_secs: default_element_timeout_secs(),
            page_settle_secs: default_page_settle_secs(),
            start_url: default_start_url(),
            chrome_executable: None,
            aux_command: None,
            folder: None,
            csv: None,
        }
    }
}

impl Config {
    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("配置文件 {} 不存在，使用默认配置..", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(CONFIG_FILE), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 命令行参数覆盖配置文件中的对应项
    pub fn apply_args(&mut self, args: &Args) {
        if args.headed {
            self.headless = false;
        }
        if args.insecure {
            self.verify = false;
        }
        if args.no_skip {
            self.skip = false;
        }
        if let Some(min) = args.sleep_min {
            self.sleep_range.min = min;
        }
        if let Some(max) = args.sleep_max {
            self.sleep_range.max = max;
        }
        self.sleep_range = self.sleep_range.normalized();
        if !args.aux_command.is_empty() {
            self.aux_command = Some(args.aux_command.clone());
        }
        if args.folder.is_some() {
            self.folder.clone_from(&args.folder);
        }
        if args.csv.is_some() {
            self.csv.clone_from(&args.csv);
        }
    }

    pub fn check(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.element_timeout_secs == 0 {
            errors.push("element_timeout_secs 必须大于 0");
        }
        if !(self.start_url.starts_with("http://") || self.start_url.starts_with("https://")) {
            errors.push("start_url 必须是 http(s) 地址");
        }
        if self
            .aux_command
            .as_ref()
            .is_some_and(|cmd| cmd.first().is_none_or(|program| program.trim().is_empty()))
        {
            errors.push("aux_command 已设置但没有指定可执行文件");
        }
        if !errors.is_empty() {
            return Err(TkError::configuration(
                errors
                    .into_iter()
                    .map(|e| format!("- {}", e))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
            .into());
        }
        Ok(())
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_secs(self.page_settle_secs)
    }

    /// 视频与 meta.csv 所在的目录
    pub fn meta_path(&self) -> Option<PathBuf> {
        self.folder.as_ref().map(|folder| folder.join("meta.csv"))
    }
}

/// 加载配置文件、写回补全后的配置，再叠加命令行参数
pub fn load_config(args: &Args) -> Result<Config> {
    let dir = config_dir(args);
    info!("开始加载配置文件..");
    let mut config = Config::load(&dir)?;
    // 在应用命令行参数之前保存，避免单次运行的参数被写入配置文件
    config.save(&dir).context("保存配置文件时遇到错误")?;
    config.apply_args(args);
    info!("检查配置文件..");
    config.check()?;
    info!("配置文件检查通过");
    Ok(config)
}
