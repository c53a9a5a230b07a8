#[macro_use]
extern crate tracing;

use anyhow::Result;
use tk_sync::config::{ARGS, load_config, version};
use tk_sync::locator::TikTokLocator;
use tk_sync::session::Session;
use tk_sync::utils::init_logger;
use tk_sync::utils::signal::terminate;

#[tokio::main]
async fn main() -> Result<()> {
    let args = &*ARGS;
    init_logger(&args.log_level);
    info!("tk-sync {} 启动", version());
    let config = load_config(args)?;
    let locator = TikTokLocator::launch(&config).await?;
    let mut session = Session::open(&config, locator)?;
    let res = tokio::select! {
        res = session.auto_main() => res.map(|_| ()),
        res = terminate() => {
            if let Err(e) = res {
                error!("监听终止信号时遇到错误：{e}");
            }
            warn!("任务被中断，保存已采集的记录..");
            session.persist().map(|_| ())
        }
    };
    if let Err(e) = session.close().await {
        error!("关闭会话时遇到错误：{:#}", e);
    }
    res
}
