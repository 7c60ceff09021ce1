use driverman_config::{config::Config, driver::DriverSpec};
use driverman_core::{
    pipeline::{InstallReport, Pipeline},
    Result,
};
use driverman_dl::http_client::HttpClient;
use driverman_registry::HostEnvironment;
use nu_ansi_term::Color::{Cyan, Green};
use tracing::info;

use crate::{
    progress::{download_handler, stop},
    utils::{progress_enabled, Colored},
};

/// Overrides given next to driver names on the command line.
#[derive(Debug, Default)]
pub struct RequestOverrides {
    pub platform: Option<String>,
    pub bit: Option<String>,
    pub arch: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub file_match_inside: Option<String>,
}

/// Request rows for `names`, each carrying the same overrides. No names means the
/// configured rows.
pub fn requests_from_args(names: &[String], overrides: &RequestOverrides) -> Vec<DriverSpec> {
    names
        .iter()
        .map(|name| {
            DriverSpec {
                name: name.clone(),
                platform: overrides.platform.clone(),
                bit: overrides.bit.clone(),
                arch: overrides.arch.clone(),
                version: overrides.version.clone(),
                url: overrides.url.clone(),
                file_match_inside: overrides.file_match_inside.clone(),
                custom_file_name: None,
            }
        })
        .collect()
}

pub fn install_drivers(
    config: &Config,
    env: &dyn HostEnvironment,
    client: &HttpClient,
) -> Result<()> {
    let mut pipeline = Pipeline::new(config, env, client);
    if progress_enabled() {
        pipeline = pipeline.progress(download_handler());
    }

    let reports = pipeline.run();
    stop();

    for report in reports? {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    let id = report.entry.id();
    let version = report.entry.version.as_deref().unwrap_or("-");
    let path = report.path.display();

    if report.installed {
        info!(
            driver = %id,
            version,
            path = %path,
            installed = true,
            "Installed {} {} to {}",
            Colored(Cyan, &id),
            Colored(Green, version),
            path
        );
    } else {
        info!(
            driver = %id,
            version,
            path = %path,
            installed = false,
            "{} {} is up to date",
            Colored(Cyan, &id),
            version
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_to_every_name() {
        let overrides = RequestOverrides {
            platform: Some("linux".into()),
            bit: Some("64".into()),
            ..Default::default()
        };

        let specs = requests_from_args(&["chromedriver".into(), "geckodriver".into()], &overrides);

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name, "geckodriver");
        assert!(specs
            .iter()
            .all(|s| s.platform.as_deref() == Some("linux") && s.bit.as_deref() == Some("64")));
        assert!(specs.iter().all(|s| s.version.is_none()));
    }

    #[test]
    fn test_no_names_no_requests() {
        assert!(requests_from_args(&[], &RequestOverrides::default()).is_empty());
    }
}
