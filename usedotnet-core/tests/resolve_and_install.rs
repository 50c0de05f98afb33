// End to end: resolve against a served release feed, download, install, hit the cache.

use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use sha2::{Digest, Sha512};
use tempfile::TempDir;
use usedotnet_core::{Config, DotNetSetup, InstallOptions, PackageType, UseDotNetError};
use usedotnet_net::{Arch, FixedPlatformDetector, Os, Platform, ReqwestHttpClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sdk_archive() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let files: [(&str, &[u8]); 5] = [
        ("dotnet", b"launcher"),
        ("LICENSE.txt", b"license"),
        ("sdk/8.0.100/dotnet.dll", b"sdk"),
        ("host/fxr/8.0.0/libhostfxr.so", b"fxr"),
        ("shared/Microsoft.NETCore.App/8.0.0/System.Runtime.dll", b"runtime"),
    ];
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

async fn serve_feed(server: &MockServer, archive: &[u8], hash: &str) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/releases-index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releases-index": [
                { "channel-version": "9.0", "releases.json": format!("{base}/9.0/releases.json"), "support-phase": "preview" },
                { "channel-version": "8.0", "releases.json": format!("{base}/8.0/releases.json"), "support-phase": "active" }
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/9.0/releases.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releases": [{ "sdk": { "version": "9.0.100-preview.1", "files": [
                { "name": "dotnet-sdk-linux-x64.tar.gz", "rid": "linux-x64", "url": format!("{base}/missing.tar.gz") }
            ]}}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/8.0/releases.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releases": [
                { "sdk": { "version": "8.0.100", "runtime-version": "8.0.0", "files": [
                    { "name": "dotnet-sdk-linux-x64.tar.gz", "rid": "linux-x64", "url": format!("{base}/sdk/dotnet-sdk-8.0.100-linux-x64.tar.gz"), "hash": hash },
                    { "name": "dotnet-sdk-win-x64.zip", "rid": "win-x64", "url": format!("{base}/sdk/dotnet-sdk-8.0.100-win-x64.zip") }
                ]}},
                { "sdk": { "version": "8.0.99", "files": [] } }
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sdk/dotnet-sdk-8.0.100-linux-x64.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

fn setup(server: &MockServer, root: &TempDir) -> DotNetSetup {
    let mut config = Config::new(root.path().join("tools"));
    config.releases_index_url = format!("{}/releases-index.json", server.uri());
    config.temp_dir = root.path().join("tmp");
    DotNetSetup::new(
        config,
        Arc::new(ReqwestHttpClient::new().unwrap()),
        Arc::new(FixedPlatformDetector(Platform::new(Os::Linux, Arch::X64))),
    )
}

#[tokio::test]
async fn resolves_installs_and_reuses_an_sdk() {
    let server = MockServer::start().await;
    let archive = sdk_archive();
    let hash = hex::encode(Sha512::digest(&archive));
    serve_feed(&server, &archive, &hash).await;

    let root = TempDir::new().unwrap();
    let setup = setup(&server, &root);
    let dotnet = root.path().join("tools").join("dotnet");

    let installed = setup
        .resolve_and_install("8.x", &InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(installed.version, "8.0.100");
    assert_eq!(installed.package_type, PackageType::Sdk);
    assert_eq!(installed.install_root, dotnet);
    assert!(!installed.cache_hit);
    assert!(installed.warnings.is_empty());
    assert!(dotnet.join("sdk/8.0.100/dotnet.dll").is_file());
    assert!(dotnet.join("sdk/8.0.100.complete").is_file());
    assert!(dotnet.join("host/fxr/8.0.0.complete").is_file());
    assert_eq!(std::fs::read(dotnet.join("dotnet")).unwrap(), b"launcher");

    let again = setup
        .resolve_and_install("8.0.100", &InstallOptions::default())
        .await
        .unwrap();
    assert!(again.cache_hit);
    assert_eq!(again.version_path, dotnet.join("sdk/8.0.100"));
}

#[tokio::test]
async fn tampered_downloads_are_not_installed() {
    let server = MockServer::start().await;
    let archive = sdk_archive();
    let wrong_hash = hex::encode(Sha512::digest(b"another archive"));
    serve_feed(&server, &archive, &wrong_hash).await;

    let root = TempDir::new().unwrap();
    let setup = setup(&server, &root);

    let err = setup
        .resolve_and_install("8.0.100", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UseDotNetError::CouldNotDownload { .. }));
    assert!(!setup.config().sdk_dir().join("8.0.100.complete").exists());
}

#[tokio::test]
async fn unknown_versions_are_reported_without_downloading() {
    let server = MockServer::start().await;
    let archive = sdk_archive();
    Mock::given(method("GET"))
        .and(path("/releases-index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "channel-version": "8.0", "releases.json": format!("{}/8.0/releases.json", server.uri()) }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/8.0/releases.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sdk/dotnet-sdk-8.0.100-linux-x64.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(0)
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let setup = setup(&server, &root);
    let err = setup
        .resolve_and_install("8.0.x", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UseDotNetError::VersionNotFound { .. }));
    assert!(err.to_string().contains("No sdk version matching '8.0.x'"));
}
