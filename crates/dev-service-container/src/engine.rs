//! コンテナエンジン（Docker）との連携

use crate::error::{ContainerError, Result};
use bollard::Docker;
use dev_service_core::{ServiceError, VolumeProvisioner};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// compose がコンテナに付けるプロジェクト名のラベル
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// compose がコンテナに付ける作業ディレクトリのラベル
pub const COMPOSE_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";
/// 作成した外部ボリュームに付けるラベル
pub const KEEP_VOLUME_LABEL: &str = "keep";

/// 起動中のコンテナについて必要な情報を取得するトレイト
#[allow(async_fn_in_trait)]
pub trait ContainerEngine {
    /// 指定プロジェクトの起動中コンテナが公開しているホストポート
    async fn published_ports(&self, project: &str) -> Result<Vec<String>>;

    /// 起動中の全コンテナの compose 作業ディレクトリ
    async fn compose_working_dirs(&self) -> Result<Vec<String>>;
}

/// bollard による Docker エンジン
///
/// クライアントは最初のリクエスト時に作ります。
#[derive(Debug, Default)]
pub struct DockerEngine {
    docker: OnceCell<Docker>,
}

impl DockerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// ローカルのデフォルト設定（DOCKER_HOST など）で接続したクライアント
    async fn docker(&self) -> Result<&Docker> {
        self.docker
            .get_or_try_init(|| async {
                let docker = Docker::connect_with_local_defaults()?;
                debug!("Connected to Docker");
                Ok::<_, ContainerError>(docker)
            })
            .await
    }

    #[allow(deprecated)]
    async fn running_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<bollard::models::ContainerSummary>> {
        let mut filters = filters;
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let options = bollard::container::ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        Ok(self.docker().await?.list_containers(Some(options)).await?)
    }
}

impl ContainerEngine for DockerEngine {
    async fn published_ports(&self, project: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", COMPOSE_PROJECT_LABEL, project)],
        );

        let containers = self.running_containers(filters).await?;
        let ports: Vec<String> = containers
            .iter()
            .filter_map(|container| container.ports.as_ref())
            .flatten()
            .filter_map(|port| port.public_port)
            .map(|port| port.to_string())
            .collect();

        debug!(project = %project, ports = ?ports, "Published ports of own containers");
        Ok(ports)
    }

    async fn compose_working_dirs(&self) -> Result<Vec<String>> {
        let containers = self.running_containers(HashMap::new()).await?;

        Ok(containers
            .into_iter()
            .filter_map(|container| container.labels)
            .filter_map(|mut labels| labels.remove(COMPOSE_WORKING_DIR_LABEL))
            .collect())
    }
}

impl VolumeProvisioner for DockerEngine {
    async fn create_volume(&self, name: &str) -> dev_service_core::Result<()> {
        let options = bollard::models::VolumeCreateOptions {
            name: Some(name.to_string()),
            labels: Some(HashMap::from([(
                KEEP_VOLUME_LABEL.to_string(),
                String::new(),
            )])),
            ..Default::default()
        };

        let volume_error = |message: String| ServiceError::VolumeCreation {
            name: name.to_string(),
            message,
        };
        let docker = self
            .docker()
            .await
            .map_err(|e| volume_error(e.to_string()))?;

        // 既存のボリュームと同名の場合もエラーにはならない
        docker
            .create_volume(options)
            .await
            .map_err(|e| volume_error(e.to_string()))?;

        info!(volume = %name, "Ensured external volume");
        Ok(())
    }
}
