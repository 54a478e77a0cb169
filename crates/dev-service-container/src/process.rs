//! 外部コマンドの実行

use crate::error::{ContainerError, Result};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 標準入出力を引き継いで実行し、終了を待つ
///
/// 0 以外で終了した場合は終了コード付きのエラーになります。
pub async fn run(program: &str, args: &[String], cwd: &Path) -> Result<()> {
    let command = command_line(program, args);
    debug!(command = %command, cwd = %cwd.display(), "Running command");

    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| ContainerError::ProcessSpawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !status.success() {
        return Err(ContainerError::ProcessFailed {
            command,
            code: status.code(),
        });
    }

    Ok(())
}

/// 出力を取得して実行する（終了コードは呼び出し側で判断）
pub async fn capture(program: &str, args: &[String]) -> Result<Output> {
    let command = command_line(program, args);
    debug!(command = %command, "Capturing command output");

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ContainerError::ProcessSpawn {
            command,
            message: e.to_string(),
        })
}
