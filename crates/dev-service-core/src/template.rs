//! テンプレート展開機能
//!
//! テンプレートはプレーンテキストとして扱います。
//! - `{{key}}` は値で置換
//! - `{{section}}` ... `{{/section}}` はセクション。削除するか、マーカーだけ外す
//!
//! マーカーの書式は既存のテンプレートファイルとの互換のため固定です。

use crate::error::{Result, ServiceError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// テンプレート内のボリューム宣言セクション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSection {
    /// `{{named-volumes}}`: エンジン管理の名前付きボリューム
    NamedVolumes,
    /// `{{mapped-volumes}}`: services/volumes へのバインドマウント
    MappedVolumes,
}

impl VolumeSection {
    pub const ALL: [VolumeSection; 2] = [Self::NamedVolumes, Self::MappedVolumes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NamedVolumes => "named-volumes",
            Self::MappedVolumes => "mapped-volumes",
        }
    }

    /// このセクションを残すときに削除する兄弟セクション
    pub fn siblings(&self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| *s != self)
            .map(VolumeSection::as_str)
            .collect()
    }
}

/// テンプレートに埋め込む値
///
/// 置換できるキーはこの4つだけです。
#[derive(Debug, Clone)]
pub struct Substitutions<'a> {
    pub image: &'a str,
    pub container_name: &'a str,
    pub projectname: &'a str,
    pub volumes_prefix: Option<&'a str>,
}

impl<'a> Substitutions<'a> {
    /// (キー, 値) の組。値のないキーは含めない
    pub fn pairs(&self) -> Vec<(&'static str, &'a str)> {
        let mut pairs = vec![
            ("image", self.image),
            ("container_name", self.container_name),
            ("projectname", self.projectname),
        ];
        if let Some(prefix) = self.volumes_prefix {
            pairs.push(("volumesPrefix", prefix));
        }
        pairs
    }
}

/// テンプレートを展開
///
/// 置換を行ったあと、`remove` のセクションを中身ごと削除し、
/// `keep` のセクションはマーカー行だけを削除します。
pub fn render(
    template: &str,
    substitutions: &[(&str, &str)],
    remove: &[&str],
    keep: &[&str],
) -> String {
    let mut result = template.to_string();

    for (key, value) in substitutions {
        result = result.replace(&marker(key), value);
    }

    for name in remove {
        result = remove_section(&result, name);
    }

    for name in keep {
        result = unwrap_section(&result, name);
    }

    result
}

fn marker(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

fn closing_marker(name: &str) -> String {
    format!("{{{{/{}}}}}", name)
}

/// セクションをマーカーごと削除
///
/// 開始マーカーは次に現れる同名の終了マーカーと対になります。
/// 終了マーカー直後の改行も削除します。
fn remove_section(text: &str, name: &str) -> String {
    let open = marker(name);
    let close = closing_marker(name);

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(&close) else {
            break;
        };

        out.push_str(&rest[..start]);
        let tail = &body[end + close.len()..];
        rest = tail.strip_prefix('\n').unwrap_or(tail);
    }

    out.push_str(rest);
    out
}

/// セクションのマーカー（と直後の改行）だけを削除
fn unwrap_section(text: &str, name: &str) -> String {
    let mut result = text.to_string();
    for m in [marker(name), closing_marker(name)] {
        result = result.replace(&format!("{}\n", m), "").replace(&m, "");
    }
    result
}

/// 組み込みテンプレート
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("mongo", include_str!("../templates/mongo.yml")),
    ("mysql", include_str!("../templates/mysql.yml")),
    ("nginx", include_str!("../templates/nginx.yml")),
    ("postgres", include_str!("../templates/postgres.yml")),
    ("redis", include_str!("../templates/redis.yml")),
];

/// サービス名からテンプレートを引く
///
/// 上書きディレクトリ（`<dir>/<name>.yml`）があればそちらを優先し、
/// なければ組み込みテンプレートを使います。
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    override_dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_TEMPLATES.iter().map(|(name, _)| *name)
    }

    /// テンプレート本文を取得（なければ `None`）
    pub fn load(&self, name: &str) -> Result<Option<String>> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.yml", name));
            if path.is_file() {
                debug!(template = %path.display(), "Using template from override directory");
                let content =
                    std::fs::read_to_string(&path).map_err(|e| ServiceError::io(&path, e))?;
                return Ok(Some(content));
            }
        }

        Ok(BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, content)| content.to_string()))
    }

    /// `<override_dir>/<name>/` があれば `services/<name>/` にコピー
    ///
    /// コピー先が既に存在する場合は何もしません（利用者の編集を上書きしない）。
    pub fn copy_additional_files(&self, name: &str, services_dir: &Path) -> Result<()> {
        let Some(dir) = &self.override_dir else {
            return Ok(());
        };

        let src = dir.join(name);
        let dest = services_dir.join(name);
        if !src.is_dir() || dest.exists() {
            return Ok(());
        }

        info!(src = %src.display(), dest = %dest.display(), "Copying additional service files");
        copy_dir_recursive(&src, &dest)
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| ServiceError::io(dest, e))?;

    for entry in std::fs::read_dir(src).map_err(|e| ServiceError::io(src, e))? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| ServiceError::io(&target, e))?;
        }
    }

    Ok(())
}
