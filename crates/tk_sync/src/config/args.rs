use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::LazyLock;

use clap::Parser;

pub static ARGS: LazyLock<Args> = LazyLock::new(Args::parse);

#[derive(Parser, Debug, Default)]
#[command(name = "TK-Sync", version = detail_version(), about, long_about = None)]
pub struct Args {
    /// 需要采集的视频列表，至少包含 video_id（或 id）与 author_id（或 author_unique_id）两列
    #[arg(short = 'i', long, env = "TK_SYNC_CSV")]
    pub csv: Option<PathBuf>,

    /// 视频与 meta.csv 的保存目录
    #[arg(short = 'o', long, env = "TK_SYNC_FOLDER")]
    pub folder: Option<PathBuf>,

    /// 显示浏览器窗口
    #[arg(long, env = "TK_SYNC_HEADED")]
    pub headed: bool,

    /// 下载视频时不校验 TLS 证书
    #[arg(long, env = "TK_SYNC_INSECURE")]
    pub insecure: bool,

    /// 即使文件或采集记录已经存在也重新下载
    #[arg(long, env = "TK_SYNC_NO_SKIP")]
    pub no_skip: bool,

    #[arg(long)]
    pub sleep_min: Option<u64>,

    #[arg(long)]
    pub sleep_max: Option<u64>,

    /// 运行期间在后台执行的辅助进程，每个参数单独传入一次
    #[arg(long, allow_hyphen_values = true)]
    pub aux_command: Vec<String>,

    #[arg(short, long, env = "TK_SYNC_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[arg(short, long, default_value = "None,tk_sync=info", env = "RUST_LOG")]
    pub log_level: String,
}

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn version() -> Cow<'static, str> {
    if let (Some(git_version), Some(git_dirty)) = (built_info::GIT_VERSION, built_info::GIT_DIRTY) {
        Cow::Owned(format!("{}{}", git_version, if git_dirty { "-dirty" } else { "" }))
    } else {
        Cow::Borrowed(built_info::PKG_VERSION)
    }
}

fn detail_version() -> String {
    format!(
        "{}
Architecture: {}-{}
Built Time: {}
Rustc Version: {}",
        version(),
        built_info::CFG_OS,
        built_info::CFG_TARGET_ARCH,
        built_info::BUILT_TIME_UTC,
        built_info::RUSTC_VERSION,
    )
}
