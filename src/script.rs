//! Lifecycle script hooks
//!
//! Runs `mono.toml` script hooks with `sh -c` in the working copy, with the
//! mono environment and cache hints injected. Output is streamed into the
//! log; a hook that runs longer than the timeout is killed.

use crate::error::{MonoError, MonoResult};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Wall-clock limit for a single script hook
const SCRIPT_TIMEOUT_MINUTES: u64 = 10;

/// Identity of a working copy, injected into script hooks as `MONO_*`
/// variables
#[derive(Debug, Clone)]
pub struct ScriptEnv {
    pub env_name: String,
    pub env_id: i64,
    pub env_path: std::path::PathBuf,
    pub root_path: Option<std::path::PathBuf>,
}

impl ScriptEnv {
    /// The `MONO_*` variable set for script hooks
    pub fn to_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("MONO_ENV_NAME".to_string(), self.env_name.clone()),
            ("MONO_ENV_ID".to_string(), self.env_id.to_string()),
            (
                "MONO_ENV_PATH".to_string(),
                self.env_path.to_string_lossy().into_owned(),
            ),
        ];
        if let Some(root) = &self.root_path {
            vars.push((
                "MONO_ROOT_PATH".to_string(),
                root.to_string_lossy().into_owned(),
            ));
        }
        vars
    }
}

/// Run one script hook to completion, streaming its output
pub async fn run_script(
    work_dir: &Path,
    script: &str,
    env_vars: &[(String, String)],
) -> MonoResult<()> {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(script)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in env_vars {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|e| MonoError::command_failed(script, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = tokio::spawn(stream_lines(stdout, "out"));
    let err_task = tokio::spawn(stream_lines(stderr, "err"));

    let status = timeout(
        Duration::from_secs(SCRIPT_TIMEOUT_MINUTES * 60),
        child.wait(),
    )
    .await
    .map_err(|_| MonoError::ScriptTimeout {
        script: script.to_string(),
        minutes: SCRIPT_TIMEOUT_MINUTES,
    })?
    .map_err(|e| MonoError::command_failed(script, e))?;

    let _ = out_task.await;
    let _ = err_task.await;

    if !status.success() {
        return Err(MonoError::ScriptFailed {
            script: script.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }

    Ok(())
}

async fn stream_lines<R>(reader: Option<R>, stream: &'static str)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[{}] {}", stream, line);
    }
}
