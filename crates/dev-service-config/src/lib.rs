//! dev-service の設定
//!
//! 環境変数とカレントディレクトリを読むのはこのクレートだけです。
//! 解決したパスは [`Settings`] にまとめて各コンポーネントへ渡します。

pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// プロジェクトルートを直接指定する環境変数
pub const PROJECT_ROOT_ENV: &str = "DEV_SERVICE_PROJECT_ROOT";
/// テンプレート上書きディレクトリを指定する環境変数
pub const TEMPLATES_DIR_ENV: &str = "DEV_SERVICE_TEMPLATES_DIR";
/// compose コマンドを指定する環境変数（例: `docker-compose`）
pub const COMPOSE_COMMAND_ENV: &str = "DEV_SERVICE_COMPOSE";

pub const MANIFEST_FILE: &str = "package.json";
pub const SERVICES_DIR: &str = "services";
pub const COMPOSE_DIR: &str = ".compose";
pub const VOLUMES_DIR: &str = "volumes";
pub const OPTIONS_FILE: &str = ".options";
pub const LEGACY_VOLUMES_ID_FILE: &str = ".volumesid";

/// プロジェクト内のパス一式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    /// `services/`
    pub services_dir: PathBuf,
    /// `services/.compose/`
    pub compose_dir: PathBuf,
    /// `services/volumes/`（mapped-volumes モードのバインドマウント先）
    pub volumes_dir: PathBuf,
    /// `services/.options`
    pub options_file: PathBuf,
    /// 旧形式の `services/.volumesid`
    pub legacy_volumes_id_file: PathBuf,
    /// 組み込みテンプレートより優先されるテンプレートディレクトリ
    pub templates_dir: Option<PathBuf>,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let services_dir = root.join(SERVICES_DIR);

        Self {
            compose_dir: services_dir.join(COMPOSE_DIR),
            volumes_dir: services_dir.join(VOLUMES_DIR),
            options_file: services_dir.join(OPTIONS_FILE),
            legacy_volumes_id_file: services_dir.join(LEGACY_VOLUMES_ID_FILE),
            services_dir,
            templates_dir: None,
            root,
        }
    }

    pub fn with_templates_dir(mut self, templates_dir: Option<PathBuf>) -> Self {
        self.templates_dir = templates_dir;
        self
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }
}

/// compose CLI の呼び出し方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ComposeCommand {
    /// `"docker compose"` のような空白区切りのコマンドラインをパース
    ///
    /// 空文字列の場合は `None`。
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Default for ComposeCommand {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: vec!["compose".to_string()],
        }
    }
}

impl std::fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// プロセス起動時に一度だけ組み立てる設定
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: ProjectPaths,
    pub compose: ComposeCommand,
}

impl Settings {
    /// 環境変数とカレントディレクトリから設定を組み立てる
    pub fn load() -> Result<Self> {
        let root = find_project_root()?;
        let paths = ProjectPaths::new(root).with_templates_dir(find_templates_dir());

        Ok(Self {
            paths,
            compose: compose_command(),
        })
    }
}

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 DEV_SERVICE_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって package.json を探す
///
/// 返すパスは常に絶対パスです。
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking DEV_SERVICE_PROJECT_ROOT");
        if path.join(MANIFEST_FILE).is_file() {
            let path = std::fs::canonicalize(&path)?;
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
        return Err(ConfigError::InvalidProjectRoot(path));
    }

    let start_dir = std::env::current_dir()?;
    search_project_root(&start_dir)
}

/// `start` から親ディレクトリへ向かって package.json を含むディレクトリを探す
pub fn search_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        debug!(checking = %current.display(), "Looking for package.json");
        if current.join(MANIFEST_FILE).is_file() {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start.display(), "Project root not found");
    Err(ConfigError::ManifestNotFound(start.to_path_buf()))
}

/// テンプレート上書きディレクトリを探す
///
/// 1. 環境変数 DEV_SERVICE_TEMPLATES_DIR
/// 2. ~/.config/dev-service/templates（存在する場合のみ）
pub fn find_templates_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(TEMPLATES_DIR_ENV) {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            return Some(path);
        }
        warn!(dir = %path.display(), "DEV_SERVICE_TEMPLATES_DIR is not a directory, ignoring");
    }

    let global = dirs::config_dir()?.join("dev-service").join("templates");
    global.is_dir().then_some(global)
}

/// compose コマンドを決定（DEV_SERVICE_COMPOSE、なければ `docker compose`）
pub fn compose_command() -> ComposeCommand {
    std::env::var(COMPOSE_COMMAND_ENV)
        .ok()
        .and_then(|raw| ComposeCommand::parse(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_project_paths_layout() {
        let paths = ProjectPaths::new("/work/app");

        assert_eq!(paths.services_dir, PathBuf::from("/work/app/services"));
        assert_eq!(
            paths.compose_dir,
            PathBuf::from("/work/app/services/.compose")
        );
        assert_eq!(
            paths.volumes_dir,
            PathBuf::from("/work/app/services/volumes")
        );
        assert_eq!(
            paths.options_file,
            PathBuf::from("/work/app/services/.options")
        );
        assert_eq!(paths.manifest_file(), PathBuf::from("/work/app/package.json"));
        assert!(paths.templates_dir.is_none());
    }

    #[test]
    fn test_search_project_root_walks_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("package.json"), "{}").unwrap();
        let nested = temp_dir.path().join("src").join("lib");
        fs::create_dir_all(&nested).unwrap();

        let root = search_project_root(&nested).unwrap();
        assert_eq!(root, temp_dir.path());
    }

    #[test]
    fn test_search_project_root_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        // tempdir の親に package.json があると誤検出するので、ルートが
        // 見つかった場合はそれが tempdir 配下でないことだけ確認する
        match search_project_root(temp_dir.path()) {
            Err(ConfigError::ManifestNotFound(p)) => assert_eq!(p, temp_dir.path()),
            Ok(root) => assert!(!root.starts_with(temp_dir.path())),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    #[serial]
    fn test_find_project_root_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("package.json"), "{}").unwrap();

        temp_env::with_var(PROJECT_ROOT_ENV, Some(temp_dir.path()), || {
            let root = find_project_root().unwrap();
            assert_eq!(root, fs::canonicalize(temp_dir.path()).unwrap());
        });
    }

    #[test]
    #[serial]
    fn test_find_project_root_env_var_is_made_absolute() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("package.json"), "{}").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        let expected = fs::canonicalize(temp_dir.path()).unwrap();

        // `sub/..` のような相対要素も解決する
        let dotted = temp_dir.path().join("sub").join("..");
        temp_env::with_var(PROJECT_ROOT_ENV, Some(&dotted), || {
            assert_eq!(find_project_root().unwrap(), expected);
        });

        // カレントディレクトリからの相対パス
        let cwd = std::env::current_dir().unwrap();
        let relative = pathdiff(&expected, &cwd);
        temp_env::with_var(PROJECT_ROOT_ENV, Some(&relative), || {
            let root = find_project_root().unwrap();
            assert!(root.is_absolute());
            assert_eq!(root, expected);
        });
    }

    /// `base` から見た `path` の相対パス（テスト用の簡易版）
    fn pathdiff(path: &Path, base: &Path) -> PathBuf {
        let base = fs::canonicalize(base).unwrap();
        let common = path
            .components()
            .zip(base.components())
            .take_while(|(a, b)| a == b)
            .count();

        let mut relative = PathBuf::new();
        for _ in base.components().skip(common) {
            relative.push("..");
        }
        for component in path.components().skip(common) {
            relative.push(component);
        }
        relative
    }

    #[test]
    #[serial]
    fn test_find_project_root_env_var_without_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();

        temp_env::with_var(PROJECT_ROOT_ENV, Some(temp_dir.path()), || {
            let result = find_project_root();
            assert!(matches!(result, Err(ConfigError::InvalidProjectRoot(_))));
        });
    }

    #[test]
    #[serial]
    fn test_find_templates_dir_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();

        temp_env::with_var(TEMPLATES_DIR_ENV, Some(temp_dir.path()), || {
            assert_eq!(find_templates_dir(), Some(temp_dir.path().to_path_buf()));
        });
    }

    #[test]
    fn test_compose_command_parse() {
        let cmd = ComposeCommand::parse("docker compose").unwrap();
        assert_eq!(cmd.program, "docker");
        assert_eq!(cmd.args, vec!["compose".to_string()]);

        let cmd = ComposeCommand::parse("  docker-compose ").unwrap();
        assert_eq!(cmd.program, "docker-compose");
        assert!(cmd.args.is_empty());

        assert!(ComposeCommand::parse("   ").is_none());
    }

    #[test]
    #[serial]
    fn test_compose_command_env_override() {
        temp_env::with_var(COMPOSE_COMMAND_ENV, Some("podman-compose"), || {
            let cmd = compose_command();
            assert_eq!(cmd.to_string(), "podman-compose");
        });

        temp_env::with_var_unset(COMPOSE_COMMAND_ENV, || {
            assert_eq!(compose_command(), ComposeCommand::default());
        });
    }
}
