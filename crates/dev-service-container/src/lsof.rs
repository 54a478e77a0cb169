//! `lsof` と `ps` を使うインスペクタ（macOS / BSD 向け）

use crate::error::Result;
use crate::inspector::{PortInspector, ProcessInfo};
use crate::process;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LsofInspector;

impl LsofInspector {
    pub fn new() -> Self {
        Self
    }
}

impl PortInspector for LsofInspector {
    async fn listener_pid(&self, port: &str) -> Result<Option<u32>> {
        let args = vec!["-nP".to_string(), format!("-i:{}", port)];
        let output = process::capture("lsof", &args).await?;

        // 該当するソケットがない場合も lsof は 1 で終了する
        if !output.status.success() {
            debug!(port = %port, "No socket found by lsof");
            return Ok(None);
        }

        Ok(parse_lsof_listener(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn process_info(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        let args = vec![
            "-p".to_string(),
            pid.to_string(),
            "-ww".to_string(),
            "-o".to_string(),
            "pid,ppid,uid,gid,args".to_string(),
        ];
        let output = process::capture("ps", &args).await?;

        if !output.status.success() {
            return Ok(None);
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `lsof -nP -i:PORT` の出力から待ち受け中のプロセスを探す
///
/// 列: `COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [(STATE)]`
fn parse_lsof_listener(output: &str) -> Option<u32> {
    output.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let listening = fields.get(9) == Some(&"(LISTEN)");
        let bound_udp = fields.get(7) == Some(&"UDP")
            && fields.get(8).is_some_and(|name| !name.contains("->"));

        if listening || bound_udp {
            fields.get(1)?.parse().ok()
        } else {
            None
        }
    })
}

/// `ps -o pid,ppid,uid,gid,args` の出力をパース
fn parse_ps_output(output: &str) -> Option<ProcessInfo> {
    let line = output.lines().nth(1)?;

    let mut rest = line.trim_start();
    let mut numbers = [0u32; 4];
    for number in numbers.iter_mut() {
        let (field, remaining) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        *number = field.parse().ok()?;
        rest = remaining.trim_start();
    }

    let [pid, ppid, uid, gid] = numbers;
    Some(ProcessInfo {
        pid,
        ppid,
        uid,
        gid,
        cmd: rest.trim_end().to_string(),
    })
}
