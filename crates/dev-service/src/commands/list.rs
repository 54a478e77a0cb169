use super::Project;

pub async fn handle() -> anyhow::Result<()> {
    let project = Project::load()?;
    let files = project.compose_files(None)?;

    project.compose().ps(&files).await?;
    Ok(())
}
