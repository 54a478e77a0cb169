use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
    /// 空のテンプレート上書きディレクトリ（ホームの設定を拾わないように）
    templates: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            templates: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_package_json(&self, manifest: serde_json::Value) {
        let path = self.root.path().join("package.json");
        fs::write(path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    }

    pub fn services_dir(&self) -> PathBuf {
        self.root.path().join("services")
    }

    pub fn compose_file(&self, name: &str) -> PathBuf {
        self.services_dir()
            .join(".compose")
            .join(format!("{}.yml", name))
    }

    /// このプロジェクトをルートとして `service` を実行するコマンド
    #[allow(deprecated)]
    pub fn service(&self) -> Command {
        let mut cmd = Command::cargo_bin("service").unwrap();
        cmd.current_dir(self.root.path())
            .env("DEV_SERVICE_PROJECT_ROOT", self.root.path())
            .env("DEV_SERVICE_TEMPLATES_DIR", self.templates.path())
            .env_remove("DEV_SERVICE_COMPOSE");
        cmd
    }

    /// 終了コードを返すだけの compose コマンドを作る
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn fake_compose(&self, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("fake-compose");
        fs::write(&path, format!("#!/bin/sh\nexit {}\n", exit_code)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// 渡された `-f` のファイルがすべて存在する場合だけ成功する compose コマンド
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn strict_compose(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("strict-compose");
        fs::write(
            &path,
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
             \x20 if [ \"$1\" = \"-f\" ] && [ ! -f \"$2\" ]; then exit 9; fi\n\
             \x20 shift\n\
             done\n\
             exit 0\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
