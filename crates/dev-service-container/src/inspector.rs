//! ポートを使用しているプロセスの調査

use crate::error::Result;

/// プロセスの情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    /// 引数を含むコマンドライン
    pub cmd: String,
}

/// OS のプロセステーブルを調べるトレイト
#[allow(async_fn_in_trait)]
pub trait PortInspector {
    /// ポートで待ち受けている（UDP はバインドしている）プロセスの PID
    async fn listener_pid(&self, port: &str) -> Result<Option<u32>>;

    /// PID からプロセス情報を取得（既に終了している場合は `None`）
    async fn process_info(&self, pid: u32) -> Result<Option<ProcessInfo>>;
}

/// 実行環境に合わせたインスペクタ
#[cfg(target_os = "linux")]
pub type SystemInspector = crate::procfs::ProcNetInspector;

#[cfg(not(target_os = "linux"))]
pub type SystemInspector = crate::lsof::LsofInspector;

/// `"8080"` や `"8000-8010"` を範囲として解釈
pub(crate) fn port_range(port: &str) -> Option<std::ops::RangeInclusive<u16>> {
    match port.split_once('-') {
        Some((start, end)) => Some(start.trim().parse().ok()?..=end.trim().parse().ok()?),
        None => {
            let port = port.trim().parse().ok()?;
            Some(port..=port)
        }
    }
}
