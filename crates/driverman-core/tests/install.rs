use std::{
    fs,
    io::{Cursor, Write},
    path::Path,
    thread::sleep,
    time::Duration,
};

use driverman_config::{
    config::{Config, DownloadConfig},
    driver::DriverSpec,
};
use driverman_core::{
    pipeline::{build_client, run, Pipeline},
    DrivermanError, Stage,
};
use driverman_registry::{Bit, Platform, StaticEnvironment};
use tempfile::{tempdir, TempDir};
use zip::write::SimpleFileOptions;

const DRIVER: &[u8] = b"MZ pretend chromedriver";

fn zip_with(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn catalog(base: &str) -> String {
    serde_json::json!({
        "drivers": [
            {"name": "chromedriver", "platform": "windows", "bit": "32", "version": "2.9", "url": format!("{base}/2.9/chromedriver_win32.zip")},
            {"name": "chromedriver", "platform": "mac", "bit": "32", "version": "2.9", "url": format!("{base}/2.9/chromedriver_mac32.zip")},
            {"name": "chromedriver", "platform": "linux", "bit": "64", "version": "2.9", "url": format!("{base}/2.9/chromedriver_linux64.zip")},
            {"name": "chromedriver", "platform": "windows", "bit": "32", "version": "70.0.3538.16", "url": format!("{base}/70.0.3538.16/chromedriver_win32.zip")},
            {"name": "chromedriver", "platform": "mac", "bit": "64", "version": "70.0.3538.16", "url": format!("{base}/70.0.3538.16/chromedriver_mac64.zip")},
            {"name": "chromedriver", "platform": "linux", "bit": "64", "version": "70.0.3538.16", "url": format!("{base}/70.0.3538.16/chromedriver_linux64.zip")},
            {"name": "geckodriver", "platform": "windows", "bit": "64", "version": "0.30.0", "url": format!("{base}/gecko/missing.zip")}
        ]
    })
    .to_string()
}

fn config(server: &mockito::Server, dir: &TempDir, drivers: Vec<DriverSpec>) -> Config {
    Config {
        repository_url: Some(format!("{}/repository.json", server.url())),
        install_dir: Some(dir.path().join("drivers").to_string_lossy().into_owned()),
        temp_dir: Some(dir.path().join("tmp").to_string_lossy().into_owned()),
        download: Some(DownloadConfig {
            attempts: Some(2),
            retry_delay_secs: Some(0),
            ..Default::default()
        }),
        drivers,
        ..Config::default_config()
    }
}

fn windows32() -> StaticEnvironment {
    StaticEnvironment::new(Platform::Windows, Bit::B32)
}

fn installed(dir: &TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join("drivers").join(name)
}

#[test]
fn installs_latest_windows_build_once() {
    let mut server = mockito::Server::new();
    let catalog_mock = server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .expect(2)
        .create();
    let zip_mock = server
        .mock("GET", "/70.0.3538.16/chromedriver_win32.zip")
        .with_status(200)
        .with_body(zip_with(&[("chromedriver.exe", DRIVER)]))
        .expect(1)
        .create();
    let dir = tempdir().unwrap();
    let config = config(&server, &dir, vec![DriverSpec::new("chromedriver")]);
    let client = build_client(&config).unwrap();

    let reports = run(&config, &windows32(), &client).unwrap();

    let exe = installed(&dir, "chromedriver-windows-32bit.exe");
    let marker = installed(&dir, "chromedriver-windows-32bit.version");
    assert_eq!(reports.len(), 1);
    assert!(reports[0].installed);
    assert_eq!(reports[0].path, exe);
    assert_eq!(fs::read(&exe).unwrap(), DRIVER);
    assert!(fs::read_to_string(&marker)
        .unwrap()
        .contains("\"version\": \"70.0.3538.16\""));

    let modified = fs::metadata(&exe).unwrap().modified().unwrap();
    sleep(Duration::from_millis(20));

    let reports = run(&config, &windows32(), &client).unwrap();

    assert!(!reports[0].installed);
    assert_eq!(fs::metadata(&exe).unwrap().modified().unwrap(), modified);
    catalog_mock.assert();
    zip_mock.assert();
}

#[test]
fn downloads_are_removed_unless_kept() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .create();
    server
        .mock("GET", "/70.0.3538.16/chromedriver_linux64.zip")
        .with_status(200)
        .with_body(zip_with(&[("chromedriver", DRIVER)]))
        .create();
    let host = StaticEnvironment::new(Platform::Linux, Bit::B64);

    let dir = tempdir().unwrap();
    let config = config(&server, &dir, vec![DriverSpec::new("chromedriver")]);
    let client = build_client(&config).unwrap();
    run(&config, &host, &client).unwrap();
    assert!(is_empty_or_missing(&dir.path().join("tmp").join("downloads")));
    assert!(is_empty_or_missing(&dir.path().join("tmp").join("extract")));

    let dir = tempdir().unwrap();
    let mut config = self::config(&server, &dir, vec![DriverSpec::new("chromedriver")]);
    config.keep_downloaded = Some(true);
    run(&config, &host, &client).unwrap();
    assert!(dir
        .path()
        .join("tmp")
        .join("downloads")
        .join("chromedriver-linux-64-70.0.3538.16")
        .join("chromedriver_linux64.zip")
        .is_file());
}

fn is_empty_or_missing(path: &Path) -> bool {
    fs::read_dir(path).map_or(true, |mut d| d.next().is_none())
}

#[test]
fn explicit_version_missing_from_catalog_fails_to_resolve() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .create();
    let dir = tempdir().unwrap();
    let mut spec = DriverSpec::new("chromedriver");
    spec.platform = Some("linux".into());
    spec.bit = Some("64".into());
    spec.version = Some("2.45".into());
    let config = config(&server, &dir, vec![spec]);
    let client = build_client(&config).unwrap();

    let err = run(&config, &windows32(), &client).unwrap_err();

    assert!(matches!(err, DrivermanError::NotFound { .. }));
    assert_eq!(err.stage(), Some(Stage::Resolve));
}

#[test]
fn earlier_request_is_installed_before_later_one_fails() {
    let mut server = mockito::Server::new();
    let catalog_mock = server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .expect(1)
        .create();
    let zip_mock = server
        .mock("GET", "/70.0.3538.16/chromedriver_linux64.zip")
        .with_status(200)
        .with_body(zip_with(&[("chromedriver", DRIVER)]))
        .expect(1)
        .create();
    let dir = tempdir().unwrap();
    let config = config(
        &server,
        &dir,
        vec![DriverSpec::new("chromedriver"), DriverSpec::new("nosuchdriver")],
    );
    let client = build_client(&config).unwrap();
    let host = StaticEnvironment::new(Platform::Linux, Bit::B64);

    let err = run(&config, &host, &client).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Resolve));
    assert_eq!(err.driver(), Some("nosuchdriver"));
    assert_eq!(
        fs::read(installed(&dir, "chromedriver-linux-64bit")).unwrap(),
        DRIVER
    );
    assert!(installed(&dir, "chromedriver-linux-64bit.version").is_file());
    catalog_mock.assert();
    zip_mock.assert();
}

#[test]
fn failed_download_reports_stage_and_driver() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .create();
    let missing = server
        .mock("GET", "/gecko/missing.zip")
        .with_status(404)
        .expect(2)
        .create();
    let dir = tempdir().unwrap();
    let config = config(&server, &dir, vec![DriverSpec::new("geckodriver")]);
    let client = build_client(&config).unwrap();
    let host = StaticEnvironment::new(Platform::Windows, Bit::B64);

    let err = run(&config, &host, &client).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Download));
    assert_eq!(err.driver(), Some("geckodriver-windows-64bit"));
    match err {
        DrivermanError::DownloadFailed { source, .. } => assert_eq!(source.status(), Some(404)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!installed(&dir, "geckodriver-windows-64bit.exe").exists());
    missing.assert();
}

#[test]
fn url_request_skips_catalog() {
    let mut server = mockito::Server::new();
    let catalog_mock = server.mock("GET", "/repository.json").expect(0).create();
    server
        .mock("GET", "/custom/tool.zip")
        .with_status(200)
        .with_body(zip_with(&[("bin/tool", DRIVER), ("bin/README.txt", b"docs")]))
        .create();
    let dir = tempdir().unwrap();
    let mut spec = DriverSpec::new("tool");
    spec.url = Some(format!("{}/custom/tool.zip", server.url()));
    spec.file_match_inside = Some(r"bin/tool".into());
    let config = config(&server, &dir, vec![spec]);
    let client = build_client(&config).unwrap();

    run(&config, &windows32(), &client).unwrap();

    assert_eq!(fs::read(installed(&dir, "tool")).unwrap(), DRIVER);
    assert!(installed(&dir, "tool.version").is_file());
    catalog_mock.assert();
}

#[test]
fn unsafe_archive_is_rejected() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/evil.zip")
        .with_status(200)
        .with_body(zip_with(&[("../../evil", DRIVER)]))
        .create();
    let dir = tempdir().unwrap();
    let mut spec = DriverSpec::new("evil");
    spec.url = Some(format!("{}/evil.zip", server.url()));
    let config = config(&server, &dir, vec![spec]);
    let client = build_client(&config).unwrap();

    let err = run(&config, &windows32(), &client).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Extract));
    assert!(!dir.path().join("evil").exists());
    assert!(!dir.path().join("tmp").join("evil").exists());
}

#[test]
fn latest_of_every_driver_when_none_configured() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repository.json")
        .with_status(200)
        .with_body(catalog(&server.url()))
        .create();
    server
        .mock("GET", "/70.0.3538.16/chromedriver_mac64.zip")
        .with_status(200)
        .with_body(zip_with(&[("chromedriver", DRIVER)]))
        .create();
    let dir = tempdir().unwrap();
    let config = config(&server, &dir, Vec::new());
    let client = build_client(&config).unwrap();
    let host = StaticEnvironment::new(Platform::Mac, Bit::B64);

    let reports = run(&config, &host, &client).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].entry.id(), "chromedriver-mac-64bit");
    assert!(installed(&dir, "chromedriver-mac-64bit").is_file());
}

#[test]
fn skip_does_nothing() {
    let mut server = mockito::Server::new();
    let catalog_mock = server.mock("GET", "/repository.json").expect(0).create();
    let dir = tempdir().unwrap();
    let mut config = config(&server, &dir, vec![DriverSpec::new("chromedriver")]);
    config.skip = Some(true);
    let client = build_client(&config).unwrap();

    let reports = Pipeline::new(&config, &windows32(), &client).run().unwrap();

    assert!(reports.is_empty());
    assert!(!dir.path().join("drivers").exists());
    catalog_mock.assert();
}
