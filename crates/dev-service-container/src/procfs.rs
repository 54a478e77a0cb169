//! `/proc` を読む Linux 向けのインスペクタ
//!
//! `/proc/net/{tcp,tcp6,udp,udp6}` からポートに対応するソケットの inode を探し、
//! `/proc/<pid>/fd` のシンボリックリンク（`socket:[inode]`）から PID を求めます。

use crate::error::{ContainerError, Result};
use crate::inspector::{PortInspector, ProcessInfo, port_range};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// TCP の LISTEN 状態
const TCP_LISTEN: &str = "0A";
/// UDP の未接続（バインドのみ）状態
const UDP_UNCONNECTED: &str = "07";

const SOCKET_TABLES: [(&str, &str); 4] = [
    ("tcp", TCP_LISTEN),
    ("tcp6", TCP_LISTEN),
    ("udp", UDP_UNCONNECTED),
    ("udp6", UDP_UNCONNECTED),
];

#[derive(Debug, Clone)]
pub struct ProcNetInspector {
    root: PathBuf,
}

impl Default for ProcNetInspector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcNetInspector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PortInspector for ProcNetInspector {
    async fn listener_pid(&self, port: &str) -> Result<Option<u32>> {
        let Some(range) = port_range(port) else {
            debug!(port = %port, "Port is not numeric, skipping");
            return Ok(None);
        };

        let root = self.root.clone();
        let port = port.to_string();
        blocking(move || {
            let inodes = listening_inodes(&root, &range)?;
            if inodes.is_empty() {
                return Ok(None);
            }

            let pid = find_socket_owner(&root, &inodes)?;
            if pid.is_none() {
                warn!(port = %port, "Port is in use but the owning process is not visible");
            }
            Ok(pid)
        })
        .await
    }

    async fn process_info(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        let root = self.root.clone();
        blocking(move || read_process_info(&root, pid)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ContainerError::Io(std::io::Error::other(e)))?
        .map_err(ContainerError::Io)
}

/// ソケットテーブルから、範囲内のポートで待ち受けているソケットの inode を集める
fn listening_inodes(root: &Path, range: &RangeInclusive<u16>) -> std::io::Result<HashSet<u64>> {
    let mut inodes = HashSet::new();

    for (table, state) in SOCKET_TABLES {
        let path = root.join("net").join(table);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            // IPv6 が無効な環境では tcp6/udp6 がない
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        inodes.extend(parse_socket_table(&content, state, range));
    }

    Ok(inodes)
}

/// `/proc/net/tcp` 形式のテーブルをパース
///
/// 各行: `sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...`
fn parse_socket_table(content: &str, state: &str, range: &RangeInclusive<u16>) -> Vec<u64> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != state {
                return None;
            }

            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let port = u16::from_str_radix(port_hex, 16).ok()?;
            if !range.contains(&port) {
                return None;
            }

            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// inode のソケットを開いているプロセスを探す
fn find_socket_owner(root: &Path, inodes: &HashSet<u64>) -> std::io::Result<Option<u32>> {
    let mut pids: Vec<u32> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();

    for pid in pids {
        // 他ユーザーのプロセスは読めないことがある
        let Ok(fds) = std::fs::read_dir(root.join(pid.to_string()).join("fd")) else {
            continue;
        };

        for fd in fds.filter_map(|fd| fd.ok()) {
            let Ok(target) = std::fs::read_link(fd.path()) else {
                continue;
            };
            let inode = target
                .to_str()
                .and_then(|t| t.strip_prefix("socket:["))
                .and_then(|t| t.strip_suffix(']'))
                .and_then(|t| t.parse::<u64>().ok());

            if inode.is_some_and(|inode| inodes.contains(&inode)) {
                return Ok(Some(pid));
            }
        }
    }

    Ok(None)
}

fn read_process_info(root: &Path, pid: u32) -> std::io::Result<Option<ProcessInfo>> {
    let dir = root.join(pid.to_string());

    let status = match std::fs::read_to_string(dir.join("status")) {
        Ok(status) => status,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let first_number = |name: &str| -> u32 {
        status_field(&status, name)
            .and_then(|value| value.split_whitespace().next())
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    };

    let cmdline = std::fs::read(dir.join("cmdline")).unwrap_or_default();
    let cmd = String::from_utf8_lossy(&cmdline)
        .split('\0')
        .filter(|arg| !arg.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    // カーネルスレッドなどは cmdline が空
    let cmd = if cmd.is_empty() {
        format!("[{}]", status_field(&status, "Name").unwrap_or_default())
    } else {
        cmd
    };

    Ok(Some(ProcessInfo {
        pid,
        ppid: first_number("PPid"),
        uid: first_number("Uid"),
        gid: first_number("Gid"),
        cmd,
    }))
}

/// `/proc/<pid>/status` の `Name:\tvalue` 形式の値
fn status_field<'a>(status: &'a str, name: &str) -> Option<&'a str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(str::trim)
}
