use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

use crate::error::TkError;

/// 与会话同生命周期的后台进程，drop 时由 tokio 负责杀死
pub struct AuxProcess {
    program: String,
    child: Option<Child>,
}

impl AuxProcess {
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(TkError::configuration("aux_command 为空").into());
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn auxiliary process {program}"))?;
        info!("已启动辅助进程 {}（pid {:?}）", program, child.id());
        Ok(Self {
            program: program.clone(),
            child: Some(child),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// 杀死并回收进程，重复调用无副作用
    pub async fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
        info!("辅助进程 {} 已终止", self.program);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_aux_process_terminate() {
        let mut aux = AuxProcess::spawn(&["sleep".to_owned(), "30".to_owned()]).unwrap();
        assert!(aux.id().is_some());
        assert!(aux.is_running());
        aux.terminate().await.unwrap();
        assert!(!aux.is_running());
        assert!(aux.id().is_none());
        aux.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_aux_process_invalid_command() {
        assert!(AuxProcess::spawn(&[]).is_err());
        assert!(AuxProcess::spawn(&["/nonexistent/tk-sync-aux".to_owned()]).is_err());
    }
}
