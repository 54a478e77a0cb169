use super::{Project, check_ports};
use colored::Colorize;

pub async fn handle(service: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load()?;
    check_ports(&project, service).await?;

    println!("{}", "All required ports are available.".green());
    Ok(())
}
