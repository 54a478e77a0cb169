//! 他のプロジェクトで起動中の dev-service の検出

use crate::engine::ContainerEngine;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// compose ディレクトリのプロジェクトルートからの相対パス
const COMPOSE_SUFFIX: &str = "services/.compose";

/// 他のプロジェクトで起動中の dev-service のプロジェクトフォルダ
///
/// エンジンに問い合わせできない場合はログに残して空を返します。
pub async fn other_instances<E: ContainerEngine>(engine: &E, own_compose_dir: &Path) -> Vec<PathBuf> {
    let working_dirs = match engine.compose_working_dirs().await {
        Ok(dirs) => dirs,
        Err(e) => {
            warn!(error = %e, "Could not list running containers");
            return Vec::new();
        }
    };

    let mut folders: Vec<PathBuf> = Vec::new();
    for dir in working_dirs {
        let dir = PathBuf::from(dir);
        if dir == own_compose_dir {
            continue;
        }

        let Some(folder) = strip_compose_suffix(&dir) else {
            continue;
        };
        if !folders.contains(&folder) {
            folders.push(folder);
        }
    }

    debug!(folders = ?folders, "Other dev-service instances");
    folders
}

fn strip_compose_suffix(dir: &Path) -> Option<PathBuf> {
    let mut folder = dir.to_path_buf();
    for component in Path::new(COMPOSE_SUFFIX).components().rev() {
        if folder.file_name() != Some(component.as_os_str()) {
            return None;
        }
        folder.pop();
    }
    Some(folder)
}

/// 他インスタンスの警告メッセージ（なければ `None`）
pub fn other_instances_warning(folders: &[PathBuf]) -> Option<String> {
    if folders.is_empty() {
        return None;
    }

    let mut message =
        String::from("dev-service is already running, started in following folder(s):");
    for folder in folders {
        message.push_str(&format!("\n  {}", folder.display()));
    }
    Some(message)
}
