pub mod check;
pub mod install;
pub mod list;
pub mod logs;
pub mod pull;
pub mod restart;
pub mod start;
pub mod stop;

use colored::Colorize;
use dev_service_config::Settings;
use dev_service_container::{
    Compose, DockerEngine, PortChecker, SystemInspector, other_instances,
    other_instances_warning,
};
use dev_service_core::{ComposeDir, load_project_name, required_ports};
use std::path::PathBuf;

/// インストール済みのサービスを操作するコマンドの共通コンテキスト
pub struct Project {
    pub settings: Settings,
    pub project_name: String,
    pub compose_dir: ComposeDir,
}

impl Project {
    pub fn load() -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        let project_name = load_project_name(&settings.paths)?;
        let compose_dir = ComposeDir::new(&settings.paths);

        Ok(Self {
            settings,
            project_name,
            compose_dir,
        })
    }

    pub fn compose(&self) -> Compose {
        Compose::new(
            self.settings.compose.clone(),
            self.project_name.clone(),
            self.compose_dir.path(),
        )
    }

    /// 全 compose ファイル。サービス指定時はそのサービスがインストール済みか確認する
    pub fn compose_files(&self, service: Option<&str>) -> anyhow::Result<Vec<PathBuf>> {
        self.compose_dir.select(service)?;
        Ok(self.compose_dir.ensure_installed()?)
    }
}

/// 他インスタンスの警告とポートの確認（check と start で共通）
pub async fn check_ports(project: &Project, service: Option<&str>) -> anyhow::Result<()> {
    let files = project.compose_dir.select(service)?;
    let engine = DockerEngine::new();

    let folders = other_instances(&engine, project.compose_dir.path()).await;
    if let Some(warning) = other_instances_warning(&folders) {
        eprintln!("{}", warning.yellow());
    }

    let required = required_ports(&files)?;
    let inspector = SystemInspector::default();
    PortChecker::new(&engine, &inspector)
        .check(&project.project_name, &required)
        .await?;

    Ok(())
}
