use super::{Project, check_ports};
use dev_service_core::ComposeDocument;
use tracing::debug;

pub async fn handle(service: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load()?;
    let files = project.compose_files(service)?;

    check_ports(&project, service).await?;

    // compose が root 所有で作らないよう、相対パスのバインドマウント元を先に作る
    for file in &files {
        let document = ComposeDocument::read(file)?;
        for source in document.bind_mount_sources(project.compose_dir.path()) {
            if !source.exists() {
                debug!(dir = %source.display(), "Creating bind mount source");
                std::fs::create_dir_all(&source)?;
            }
        }
    }

    project.compose().up(&files, service).await?;
    Ok(())
}
