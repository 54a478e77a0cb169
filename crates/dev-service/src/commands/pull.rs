use super::Project;

pub async fn handle(service: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load()?;
    let files = project.compose_files(service)?;

    project.compose().pull(&files, service).await?;
    Ok(())
}
