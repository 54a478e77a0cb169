//! 展開済み compose ファイルのディレクトリ（`services/.compose`）
//!
//! インストール済みかどうかの判定と、compose ファイルから
//! ポート・外部ボリューム・バインドマウント元を読み取る処理をまとめています。

use crate::error::{Result, ServiceError};
use crate::service::RenderedService;
use dev_service_config::ProjectPaths;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const GITIGNORE: &str = ".gitignore";

/// `services/.compose`
#[derive(Debug, Clone)]
pub struct ComposeDir {
    dir: PathBuf,
}

impl ComposeDir {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            dir: paths.compose_dir.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn service_file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yml", name))
    }

    /// `.gitignore` 以外のファイル（名前順）
    pub fn compose_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| ServiceError::io(&self.dir, e))? {
            let entry = entry?;
            if entry.file_name() == GITIGNORE || !entry.file_type()?.is_file() {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();

        Ok(files)
    }

    pub fn has_services(&self) -> Result<bool> {
        Ok(!self.compose_files()?.is_empty())
    }

    /// インストール済みの compose ファイル一覧。1つもなければエラー
    pub fn ensure_installed(&self) -> Result<Vec<PathBuf>> {
        let files = self.compose_files()?;
        if files.is_empty() {
            return Err(ServiceError::NoServicesInstalled);
        }
        Ok(files)
    }

    /// 対象サービスの compose ファイル
    ///
    /// サービス名を指定した場合はそのファイルだけ、指定しない場合は全ファイル。
    pub fn select(&self, service: Option<&str>) -> Result<Vec<PathBuf>> {
        let files = self.ensure_installed()?;
        match service {
            None => Ok(files),
            Some(name) => {
                let file = self.service_file(name);
                if !file.is_file() {
                    return Err(ServiceError::ServiceNotInstalled(name.to_string()));
                }
                Ok(vec![file])
            }
        }
    }

    /// ディレクトリを空にして作り直す（`.gitignore` 付き）
    pub fn reset(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| ServiceError::io(&self.dir, e))?;
        }
        ensure_ignored_dir(&self.dir)
    }

    pub fn write(&self, rendered: &RenderedService) -> Result<PathBuf> {
        let path = self.service_file(&rendered.name);
        std::fs::write(&path, &rendered.content).map_err(|e| ServiceError::io(&path, e))?;
        debug!(file = %path.display(), "Wrote compose file");
        Ok(path)
    }
}

/// ディレクトリを作成し、中身をすべて無視する `.gitignore` を置く
pub fn ensure_ignored_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ServiceError::io(dir, e))?;
    let gitignore = dir.join(GITIGNORE);
    if !gitignore.exists() {
        std::fs::write(&gitignore, "*\n").map_err(|e| ServiceError::io(&gitignore, e))?;
    }
    Ok(())
}

/// パース済みの compose ファイル
#[derive(Debug, Clone)]
pub struct ComposeDocument {
    root: Value,
}

impl ComposeDocument {
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        Ok(Self {
            root: serde_yaml::from_str(content)?,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ServiceError::io(path, e))?;
        Self::parse(&content).map_err(|e| ServiceError::InvalidComposeFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn services(&self) -> impl Iterator<Item = &Value> {
        self.root
            .get("services")
            .and_then(Value::as_mapping)
            .into_iter()
            .flat_map(|services| services.values())
    }

    /// `ports` に書かれたホスト側のポート
    ///
    /// `"HOST:CONTAINER"`, `"IP:HOST:CONTAINER"` と長い書式の `published` が対象です。
    /// コンテナ側だけの指定は公開されないので含めません。
    pub fn host_ports(&self) -> Vec<String> {
        self.services()
            .filter_map(|service| service.get("ports").and_then(Value::as_sequence))
            .flatten()
            .filter_map(host_port)
            .collect()
    }

    /// トップレベルで宣言された外部ボリュームの名前
    pub fn external_volume_names(&self) -> Vec<String> {
        let Some(volumes) = self.root.get("volumes").and_then(Value::as_mapping) else {
            return Vec::new();
        };

        volumes
            .iter()
            .filter_map(|(key, volume)| {
                let external = volume.get("external")?;
                let name = match external {
                    Value::Mapping(_) => external.get("name").and_then(Value::as_str),
                    Value::Bool(true) => volume.get("name").and_then(Value::as_str).or(key.as_str()),
                    _ => None,
                }?;
                Some(name.to_string())
            })
            .collect()
    }

    /// `./` か `../` で始まるバインドマウント元を `base` からの絶対パスにして返す
    pub fn bind_mount_sources(&self, base: &Path) -> Vec<PathBuf> {
        self.services()
            .filter_map(|service| service.get("volumes").and_then(Value::as_sequence))
            .flatten()
            .filter_map(|entry| match entry {
                Value::String(s) if s.contains(':') => s.split(':').next(),
                Value::Mapping(_) => entry.get("source").and_then(Value::as_str),
                _ => None,
            })
            .filter(|source| source.starts_with("./") || source.starts_with("../"))
            .map(|source| base.join(source))
            .collect()
    }
}

fn host_port(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => {
            let parts: Vec<&str> = s.rsplitn(3, ':').collect();
            let host = parts.get(1)?;
            (!host.is_empty()).then(|| host.to_string())
        }
        Value::Mapping(_) => match entry.get("published")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// 重複を除いて最初に現れた順に並べる
fn dedup_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// compose ファイル群が必要とするホストポート
pub fn required_ports(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut ports = Vec::new();
    for file in files {
        ports.extend(ComposeDocument::read(file)?.host_ports());
    }
    Ok(dedup_preserving_order(ports))
}
