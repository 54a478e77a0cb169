//! プロジェクトマニフェスト（package.json）の読み込み
//!
//! `name` と `services` だけを使います。`services` の各要素は
//! イメージ参照の文字列か、compose のサービス定義そのものです。

use crate::error::{Result, ServiceError};
use dev_service_config::ProjectPaths;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// イメージ参照末尾のタグ（`:latest` など）
static IMAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i):[a-z0-9_][a-z0-9_.-]{0,127}$").expect("image tag pattern is valid")
});

/// マニフェストに宣言されたサービス
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceSpec {
    /// `"mongo:latest"` のようなイメージ参照（テンプレートを使う）
    Image(String),
    /// `{ "image": "...", ... }` のようなカスタム定義
    Custom(Map<String, Value>),
}

impl ServiceSpec {
    pub fn image(&self) -> &str {
        match self {
            Self::Image(image) => image,
            Self::Custom(spec) => spec.get("image").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    /// サービス名（イメージ参照の最後のパス要素、タグなし）
    pub fn name(&self) -> String {
        image_name(self.image())
    }
}

/// 読み込み済みのマニフェスト
#[derive(Debug, Clone)]
pub struct Manifest {
    /// package.json の `name`（なければディレクトリ名）
    pub name: String,
    /// compose のプロジェクト名として使えるようにエスケープした名前
    pub project_name: String,
    pub services: Vec<ServiceSpec>,
}

impl Manifest {
    /// プロジェクトルートの package.json を読み込む
    #[tracing::instrument(skip(paths), fields(root = %paths.root.display()))]
    pub fn load(paths: &ProjectPaths) -> Result<Self> {
        let path = paths.manifest_file();
        if !path.is_file() {
            return Err(ServiceError::ManifestNotFound(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ServiceError::io(&path, e))?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| ServiceError::InvalidManifest {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Self::from_value(&value, &paths.root)
    }

    /// パース済みの JSON から組み立てる
    ///
    /// 偽値（null, false, "", 0）のエントリは無視します。
    pub fn from_value(value: &Value, root: &Path) -> Result<Self> {
        let name = manifest_name(value, root);

        let entries: Vec<&Value> = value
            .get("services")
            .and_then(Value::as_array)
            .map(|services| services.iter().filter(|s| !is_falsy(s)).collect())
            .unwrap_or_default();

        if entries.is_empty() {
            return Err(ServiceError::NoServicesDefined);
        }

        let mut services = Vec::with_capacity(entries.len());
        let mut invalid = Vec::new();

        for entry in entries {
            match entry {
                Value::String(image) => services.push(ServiceSpec::Image(image.clone())),
                Value::Object(spec) if has_image(spec) => {
                    services.push(ServiceSpec::Custom(spec.clone()))
                }
                other => invalid.push(other),
            }
        }

        if !invalid.is_empty() {
            let listed = invalid
                .iter()
                .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
                .collect::<Vec<_>>()
                .join(",\n");
            return Err(ServiceError::InvalidCustomServices(listed));
        }

        let project_name = escape_project_name(&name);
        debug!(name = %name, project_name = %project_name, services = services.len(), "Loaded manifest");

        Ok(Self {
            name,
            project_name,
            services,
        })
    }
}

/// compose のプロジェクト名だけを読む
///
/// `services` の検証は行わないので、インストール済みのサービスを操作するコマンドで使います。
pub fn load_project_name(paths: &ProjectPaths) -> Result<String> {
    let path = paths.manifest_file();
    let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ServiceError::ManifestNotFound(path.clone()),
        _ => ServiceError::io(&path, e),
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| ServiceError::InvalidManifest {
        path: path.clone(),
        message: e.to_string(),
    })?;

    Ok(escape_project_name(&manifest_name(&value, &paths.root)))
}

/// package.json の `name`（なければディレクトリ名）
fn manifest_name(value: &Value, root: &Path) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn has_image(spec: &Map<String, Value>) -> bool {
    spec.get("image")
        .and_then(Value::as_str)
        .is_some_and(|image| !image.trim().is_empty())
}

/// イメージ参照からサービス名を取り出す
///
/// 例: "mongo:latest" -> "mongo"
///     "registry.example.com:5000/team/api:1.2" -> "api"
pub fn image_name(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let without_tag = IMAGE_TAG.replace(without_digest, "");
    without_tag
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// compose のプロジェクト名・コンテナ名に使える形にエスケープ
///
/// 小文字化し、`[a-z0-9_-]` 以外は `-` に置き換え、先頭の記号を取り除きます。
pub fn escape_project_name(name: &str) -> String {
    let escaped: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = escaped.trim_start_matches(['-', '_']);
    if trimmed.is_empty() {
        "dev-service".to_string()
    } else {
        trimmed.to_string()
    }
}
