use colored::Colorize;
use dev_service_config::Settings;
use dev_service_container::DockerEngine;
use dev_service_core::{Installer, VolumeFlag};

pub async fn handle(flag: Option<VolumeFlag>) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let engine = DockerEngine::new();

    let report = Installer::new(&settings.paths, &engine).install(flag).await?;

    for service in &report.services {
        println!("  ✓ {}", service.name.cyan());
    }
    println!(
        "{}",
        format!("Done ({} services installed).", report.services.len()).green()
    );

    Ok(())
}
