use driverman_config::config::Config;
use driverman_core::{pipeline::Pipeline, ErrorContext, Result};
use driverman_dl::http_client::HttpClient;
use driverman_registry::{CatalogEntry, HostEnvironment};
use nu_ansi_term::Color::{Cyan, Green};
use tabled::{
    builder::Builder,
    settings::{themes::BorderCorrection, Panel, Style},
};
use tracing::info;

use crate::utils::Colored;

pub fn list_drivers(
    config: &Config,
    env: &dyn HostEnvironment,
    client: &HttpClient,
    json: bool,
) -> Result<()> {
    let repository = Pipeline::new(config, env, client).load_repository()?;
    let entries = repository.latest_for_platform(env);

    if json {
        let output = serde_json::to_string_pretty(&entries)
            .map_err(std::io::Error::from)
            .with_context(|| "serializing driver list".into())?;
        println!("{output}");
        return Ok(());
    }

    if entries.is_empty() {
        info!(
            "No drivers available for {} {}bit",
            env.platform(),
            env.bit()
        );
        return Ok(());
    }

    info!("\n{}", render_table(&entries));
    Ok(())
}

fn render_table(entries: &[CatalogEntry]) -> String {
    let mut builder = Builder::new();
    builder.push_record(["Driver", "Version", "Architecture", "URL"]);
    for entry in entries {
        builder.push_record([
            Colored(Cyan, entry.id()).to_string(),
            Colored(Green, entry.version.as_deref().unwrap_or("-")).to_string(),
            entry.architecture.to_string(),
            entry.url.clone(),
        ]);
    }

    builder
        .build()
        .with(Panel::header(format!("{} drivers", entries.len())))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string()
}
