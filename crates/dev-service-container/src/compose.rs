//! compose CLI のラッパー
//!
//! すべてのサブコマンドを `<compose> -p <project> -f <file>... <args>` の形で
//! compose ディレクトリから実行します。

use crate::error::Result;
use crate::process;
use dev_service_config::ComposeCommand;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Compose {
    command: ComposeCommand,
    project: String,
    dir: PathBuf,
}

impl Compose {
    pub fn new(command: ComposeCommand, project: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            project: project.into(),
            dir: dir.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// compose CLI に渡す引数
    pub fn args(&self, files: &[PathBuf], args: &[&str]) -> Vec<String> {
        let mut all = self.command.args.clone();
        all.push("-p".to_string());
        all.push(self.project.clone());
        for file in files {
            all.push("-f".to_string());
            all.push(file.display().to_string());
        }
        all.extend(args.iter().map(|arg| arg.to_string()));
        all
    }

    pub async fn run(&self, files: &[PathBuf], args: &[&str]) -> Result<()> {
        process::run(&self.command.program, &self.args(files, args), &self.dir).await
    }

    pub async fn up(&self, files: &[PathBuf], service: Option<&str>) -> Result<()> {
        self.run(files, &with_service(&["up", "-d"], service)).await
    }

    /// 停止してからコンテナと匿名ボリュームを削除
    pub async fn stop(&self, files: &[PathBuf], service: Option<&str>) -> Result<()> {
        self.run(files, &with_service(&["stop"], service)).await?;
        self.run(files, &with_service(&["rm", "-fv"], service)).await
    }

    pub async fn restart(&self, files: &[PathBuf], service: Option<&str>) -> Result<()> {
        self.run(files, &with_service(&["restart"], service)).await
    }

    pub async fn ps(&self, files: &[PathBuf]) -> Result<()> {
        self.run(files, &["ps"]).await
    }

    pub async fn logs(&self, files: &[PathBuf], service: Option<&str>) -> Result<()> {
        self.run(files, &with_service(&["logs", "-f"], service)).await
    }

    pub async fn pull(&self, files: &[PathBuf], service: Option<&str>) -> Result<()> {
        self.run(files, &with_service(&["pull"], service)).await
    }
}

fn with_service<'a>(args: &[&'a str], service: Option<&'a str>) -> Vec<&'a str> {
    args.iter().copied().chain(service).collect()
}
