//! ボリュームの扱い（classic / volumes-id / mapped-volumes）の決定と永続化
//!
//! 決定結果は `services/.options` に保存され、次回以降のインストールで再利用されます。

use crate::error::{Result, ServiceError};
use crate::template::VolumeSection;
use dev_service_config::ProjectPaths;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// volumes-id の長さ
pub const VOLUMES_ID_LENGTH: usize = 12;

/// [`VolumeMode`] のタグとして保存される値
const KNOWN_MODES: [&str; 3] = ["classic", "volumes-id", "mapped-volumes"];

/// 保存されるボリュームモード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VolumeMode {
    /// プロジェクト名を接頭辞にした名前付きボリューム
    Classic,
    /// ランダムな id を接頭辞にした名前付きボリューム
    VolumesId { id: String },
    /// services/volumes へのバインドマウント
    MappedVolumes,
}

/// `services/.options` の内容
///
/// 知らないキーはそのまま保持して書き戻します。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<VolumeMode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `service install` に渡されたボリューム指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFlag {
    Classic,
    VolumesId,
    MappedVolumes,
}

/// テンプレート展開で使うボリュームの扱い
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    /// 残すセクション（兄弟は削除）
    pub section: VolumeSection,
    /// `{{volumesPrefix}}` に入る値
    pub prefix: Option<String>,
}

impl VolumeLayout {
    pub fn is_mapped(&self) -> bool {
        self.section == VolumeSection::MappedVolumes
    }
}

/// 決定結果
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeResolution {
    /// 次に保存するオプション
    pub options: VolumeOptions,
    pub layout: VolumeLayout,
    /// フラグが指定されたときだけ保存する
    pub persist: bool,
}

/// ランダムな volumes-id を生成（`[0-9a-zA-Z]{12}`）
pub fn generate_volumes_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VOLUMES_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// 保存済みオプションとフラグから次のボリュームの扱いを決める
pub fn resolve(
    current: VolumeOptions,
    flag: Option<VolumeFlag>,
    project_name: &str,
) -> VolumeResolution {
    resolve_with(current, flag, project_name, generate_volumes_id)
}

/// id の生成方法を差し替えられる [`resolve`]
pub fn resolve_with(
    mut current: VolumeOptions,
    flag: Option<VolumeFlag>,
    project_name: &str,
    generate_id: impl FnOnce() -> String,
) -> VolumeResolution {
    match flag {
        Some(VolumeFlag::VolumesId) => {
            let id = match current.volumes.take() {
                Some(VolumeMode::VolumesId { id }) => id,
                _ => generate_id(),
            };
            current.volumes = Some(VolumeMode::VolumesId { id });
        }
        Some(VolumeFlag::MappedVolumes) => current.volumes = Some(VolumeMode::MappedVolumes),
        Some(VolumeFlag::Classic) => current.volumes = None,
        None => {}
    }

    let layout = match &current.volumes {
        Some(VolumeMode::VolumesId { id }) => VolumeLayout {
            section: VolumeSection::NamedVolumes,
            prefix: Some(id.clone()),
        },
        Some(VolumeMode::MappedVolumes) => VolumeLayout {
            section: VolumeSection::MappedVolumes,
            prefix: None,
        },
        Some(VolumeMode::Classic) | None => VolumeLayout {
            section: VolumeSection::NamedVolumes,
            prefix: Some(project_name.to_string()),
        },
    };

    debug!(?layout, ?flag, "Resolved volume layout");

    VolumeResolution {
        options: current,
        layout,
        persist: flag.is_some(),
    }
}

/// オプションファイルの読み書き
#[derive(Debug, Clone)]
pub struct OptionsFile {
    path: PathBuf,
    legacy_path: PathBuf,
}

impl OptionsFile {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            path: paths.options_file.clone(),
            legacy_path: paths.legacy_volumes_id_file.clone(),
        }
    }

    /// 保存済みのオプションを読む
    ///
    /// `.options` がなく旧形式の `.volumesid` がある場合は、
    /// その id を volumes-id モードとして読み込みます。
    /// 知らないモードは classic として扱います。
    pub fn load(&self) -> Result<VolumeOptions> {
        if self.path.is_file() {
            let content =
                std::fs::read_to_string(&self.path).map_err(|e| ServiceError::io(&self.path, e))?;
            let invalid = |e: serde_json::Error| ServiceError::InvalidOptions {
                path: self.path.clone(),
                message: e.to_string(),
            };

            let mut value: Value = serde_json::from_str(&content).map_err(invalid)?;
            let unknown_mode = value
                .pointer("/volumes/mode")
                .and_then(Value::as_str)
                .filter(|mode| !KNOWN_MODES.contains(mode))
                .map(str::to_string);
            if let Some(mode) = unknown_mode {
                warn!(
                    path = %self.path.display(),
                    mode = %mode,
                    "Unknown volumes mode, falling back to classic volumes"
                );
                if let Some(object) = value.as_object_mut() {
                    object.remove("volumes");
                }
            }

            return serde_json::from_value(value).map_err(invalid);
        }

        if self.legacy_path.is_file() {
            let content = std::fs::read_to_string(&self.legacy_path)
                .map_err(|e| ServiceError::io(&self.legacy_path, e))?;
            let id = content.trim();
            if id.is_empty() {
                return Err(ServiceError::InvalidOptions {
                    path: self.legacy_path.clone(),
                    message: "volumes id is empty".to_string(),
                });
            }

            debug!(legacy = %self.legacy_path.display(), "Reading legacy volumes id");
            return Ok(VolumeOptions {
                volumes: Some(VolumeMode::VolumesId { id: id.to_string() }),
                extra: Map::new(),
            });
        }

        Ok(VolumeOptions::default())
    }

    /// オプションを保存し、旧形式のファイルがあれば削除
    pub fn save(&self, options: &VolumeOptions) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::io(parent, e))?;
        }

        let content =
            serde_json::to_string_pretty(options).map_err(|e| ServiceError::InvalidOptions {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        std::fs::write(&self.path, format!("{}\n", content))
            .map_err(|e| ServiceError::io(&self.path, e))?;

        if self.legacy_path.exists() {
            std::fs::remove_file(&self.legacy_path)
                .map_err(|e| ServiceError::io(&self.legacy_path, e))?;
            info!(legacy = %self.legacy_path.display(), "Migrated legacy volumes id");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_id() -> String {
        "AbCdEf123456".to_string()
    }

    #[test]
    fn test_generate_volumes_id() {
        let id = generate_volumes_id();
        assert_eq!(id.len(), VOLUMES_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_default_is_classic() {
        let resolution = resolve(VolumeOptions::default(), None, "t");

        assert_eq!(resolution.layout.section, VolumeSection::NamedVolumes);
        assert_eq!(resolution.layout.prefix.as_deref(), Some("t"));
        assert!(!resolution.persist);
    }

    #[test]
    fn test_volumes_id_is_reused() {
        let first = resolve_with(
            VolumeOptions::default(),
            Some(VolumeFlag::VolumesId),
            "t",
            fixed_id,
        );
        assert_eq!(first.layout.prefix.as_deref(), Some("AbCdEf123456"));
        assert!(first.persist);

        let second = resolve_with(first.options, Some(VolumeFlag::VolumesId), "t", || {
            panic!("id must not be regenerated")
        });
        assert_eq!(second.layout.prefix.as_deref(), Some("AbCdEf123456"));
    }

    #[test]
    fn test_classic_after_volumes_id() {
        let with_id = resolve_with(
            VolumeOptions::default(),
            Some(VolumeFlag::VolumesId),
            "t",
            fixed_id,
        );
        let classic = resolve(with_id.options, Some(VolumeFlag::Classic), "t");

        assert!(classic.options.volumes.is_none());
        assert_eq!(classic.layout.prefix.as_deref(), Some("t"));
        assert_eq!(classic.layout.section, VolumeSection::NamedVolumes);
    }

    #[test]
    fn test_mapped_volumes() {
        let resolution = resolve(VolumeOptions::default(), Some(VolumeFlag::MappedVolumes), "t");

        assert!(resolution.layout.is_mapped());
        assert!(resolution.layout.prefix.is_none());

        // フラグなしの次回インストールでも mapped のまま
        let next = resolve(resolution.options, None, "t");
        assert!(next.layout.is_mapped());
        assert!(!next.persist);
    }

    #[test]
    fn test_options_serialization() {
        let options = VolumeOptions {
            volumes: Some(VolumeMode::VolumesId {
                id: "abc".to_string(),
            }),
            extra: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({ "volumes": { "mode": "volumes-id", "id": "abc" } })
        );

        let parsed: VolumeOptions =
            serde_json::from_value(json!({ "volumes": { "mode": "mapped-volumes" }, "other": 1 }))
                .unwrap();
        assert_eq!(parsed.volumes, Some(VolumeMode::MappedVolumes));
        assert_eq!(parsed.extra.get("other"), Some(&json!(1)));

        assert_eq!(
            serde_json::to_value(VolumeOptions::default()).unwrap(),
            json!({})
        );
    }

    #[test]
    fn test_volumes_id_without_id_is_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(temp_dir.path());
        std::fs::create_dir_all(&paths.services_dir).unwrap();
        std::fs::write(&paths.options_file, r#"{"volumes":{"mode":"volumes-id"}}"#).unwrap();

        let result = OptionsFile::new(&paths).load();
        assert!(matches!(result, Err(ServiceError::InvalidOptions { .. })));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_classic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(temp_dir.path());
        std::fs::create_dir_all(&paths.services_dir).unwrap();
        std::fs::write(
            &paths.options_file,
            r#"{"volumes":{"mode":"tmpfs-volumes"},"other":true}"#,
        )
        .unwrap();

        let options = OptionsFile::new(&paths).load().unwrap();
        assert_eq!(options.volumes, None);
        assert_eq!(options.extra.get("other"), Some(&json!(true)));

        let resolution = resolve(options, None, "my-app");
        assert_eq!(
            resolution.layout,
            VolumeLayout {
                section: VolumeSection::NamedVolumes,
                prefix: Some("my-app".to_string()),
            }
        );
        assert!(!resolution.persist);
    }

    #[test]
    fn test_options_file_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(temp_dir.path());
        let file = OptionsFile::new(&paths);

        assert_eq!(file.load().unwrap(), VolumeOptions::default());

        let options = VolumeOptions {
            volumes: Some(VolumeMode::MappedVolumes),
            extra: Map::new(),
        };
        file.save(&options).unwrap();

        let content = std::fs::read_to_string(&paths.options_file).unwrap();
        assert_eq!(
            content,
            "{\n  \"volumes\": {\n    \"mode\": \"mapped-volumes\"\n  }\n}\n"
        );
        assert_eq!(file.load().unwrap(), options);
    }

    #[test]
    fn test_legacy_volumes_id_migration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(temp_dir.path());
        std::fs::create_dir_all(&paths.services_dir).unwrap();
        std::fs::write(&paths.legacy_volumes_id_file, "LegacyId0001\n").unwrap();

        let file = OptionsFile::new(&paths);
        let options = file.load().unwrap();
        assert_eq!(
            options.volumes,
            Some(VolumeMode::VolumesId {
                id: "LegacyId0001".to_string()
            })
        );

        let resolution = resolve(options, Some(VolumeFlag::VolumesId), "t");
        assert_eq!(resolution.layout.prefix.as_deref(), Some("LegacyId0001"));

        file.save(&resolution.options).unwrap();
        assert!(!paths.legacy_volumes_id_file.exists());
        assert_eq!(file.load().unwrap(), resolution.options);
    }
}
