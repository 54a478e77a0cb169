//! `service install` の本体
//!
//! マニフェストの検証とテンプレートの解決が済むまではファイルシステムに触れません。

use crate::compose::{ComposeDir, ComposeDocument, ensure_ignored_dir};
use crate::error::{Result, ServiceError};
use crate::manifest::Manifest;
use crate::service::{RenderedService, ServiceTemplate};
use crate::template::TemplateStore;
use crate::volumes::{self, OptionsFile, VolumeFlag, VolumeLayout};
use dev_service_config::ProjectPaths;
use futures_util::future::try_join_all;
use std::path::PathBuf;
use tracing::{debug, info};

/// 名前付きボリュームを作成する側（コンテナエンジン）
#[allow(async_fn_in_trait)]
pub trait VolumeProvisioner {
    /// 外部ボリュームを作成する。既に存在する場合も成功扱い
    async fn create_volume(&self, name: &str) -> Result<()>;
}

/// インストールしたサービス
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledService {
    pub name: String,
    pub file: PathBuf,
    pub volumes: Vec<String>,
}

/// インストール結果
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub project_name: String,
    pub layout: VolumeLayout,
    pub services: Vec<InstalledService>,
}

pub struct Installer<'a, P> {
    paths: &'a ProjectPaths,
    store: TemplateStore,
    provisioner: &'a P,
}

impl<'a, P: VolumeProvisioner> Installer<'a, P> {
    pub fn new(paths: &'a ProjectPaths, provisioner: &'a P) -> Self {
        Self {
            paths,
            store: TemplateStore::new(paths.templates_dir.clone()),
            provisioner,
        }
    }

    #[tracing::instrument(skip(self), fields(root = %self.paths.root.display()))]
    pub async fn install(&self, flag: Option<VolumeFlag>) -> Result<InstallReport> {
        let manifest = Manifest::load(self.paths)?;
        let templates = ServiceTemplate::resolve_all(&manifest.services, &self.store)?;

        let options_file = OptionsFile::new(self.paths);
        let current = options_file.load()?;

        let compose = ComposeDir::new(self.paths);
        compose.reset()?;

        let resolution = volumes::resolve(current, flag, &manifest.project_name);
        if resolution.persist {
            options_file.save(&resolution.options)?;
        }

        if resolution.layout.is_mapped() {
            ensure_ignored_dir(&self.paths.volumes_dir)?;
        }

        let installs = templates.iter().map(|template| {
            let rendered = template.render(&manifest.project_name, &resolution.layout);
            self.install_service(&compose, rendered)
        });
        let services = try_join_all(installs).await?;

        info!(
            project = %manifest.project_name,
            services = services.len(),
            "Installed services"
        );

        Ok(InstallReport {
            project_name: manifest.project_name,
            layout: resolution.layout,
            services,
        })
    }

    async fn install_service(
        &self,
        compose: &ComposeDir,
        rendered: RenderedService,
    ) -> Result<InstalledService> {
        let document =
            ComposeDocument::parse(&rendered.content).map_err(|e| ServiceError::TemplateRender {
                service: rendered.name.clone(),
                message: e.to_string(),
            })?;

        let volumes = document.external_volume_names();
        for volume in &volumes {
            debug!(service = %rendered.name, volume = %volume, "Creating external volume");
            self.provisioner.create_volume(volume).await?;
        }

        let file = compose.write(&rendered)?;
        self.store
            .copy_additional_files(&rendered.name, &self.paths.services_dir)?;

        Ok(InstalledService {
            name: rendered.name,
            file,
            volumes,
        })
    }
}
