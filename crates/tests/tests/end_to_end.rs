use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use vpm_index_core::error::IntegrityError;
use vpm_index_core::{
    BuildConfig, BuildError, DigestPolicy, HttpUrl, RepositoryInfo, Sha256Digest,
};
use vpm_index_tests::{Route, StaticServer, write_manifest, zip_archive};

fn config(root: &Path, server: Option<&StaticServer>) -> Result<BuildConfig> {
    let mut cfg = BuildConfig::new(RepositoryInfo::defaults()?);
    cfg.packages_dir = root.join("packages");
    cfg.output = root.join("index.json");
    cfg.release.host = "127.0.0.1".into();
    if let Some(server) = server {
        cfg.release.api_base = Some(HttpUrl::parse(&server.url("/"))?);
    }
    cfg.fetch_timeout = Duration::from_secs(10);
    Ok(cfg)
}

fn offline(root: &Path) -> Result<BuildConfig> {
    let mut cfg = config(root, None)?;
    cfg.release.enabled = false;
    cfg.digest_policy = DigestPolicy::AllowMissing;
    Ok(cfg)
}

fn manifest(name: &str, version: &str, url: &str) -> Value {
    json!({
        "name": name,
        "displayName": name.to_uppercase(),
        "version": version,
        "url": url,
        "author": { "name": "Example Dev", "url": "https://example.com" },
        "unity": "2022.3",
        "vpmDependencies": { "com.vrchat.base": ">=3.5.0" }
    })
}

fn read_output(path: &Path) -> Result<Value> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

#[tokio::test]
async fn two_versions_of_one_package() -> Result<()> {
    let first = zip_archive(&[("package.json", r#"{"version": "1.0.0"}"#)])?;
    let second = zip_archive(&[("package.json", r#"{"version": "1.1.0"}"#)])?;
    let declared = Sha256Digest::of(&second);
    let routes = HashMap::from([
        ("/files/a-1.0.0.zip".to_string(), Route::zip(first.clone())),
        ("/files/a-1.1.0.zip".to_string(), Route::zip(second)),
    ]);
    let Some(server) = StaticServer::start(routes)? else {
        return Ok(());
    };

    let temp = tempfile::tempdir()?;
    let cfg = config(temp.path(), Some(&server))?;
    write_manifest(
        &cfg.packages_dir,
        "a-1.0.0.json",
        &manifest("a", "1.0.0", &server.url("/files/a-1.0.0.zip")),
    )?;
    let mut with_digest = manifest("a", "1.1.0", &server.url("/files/a-1.1.0.zip"));
    with_digest["zipSHA256"] = json!(declared.as_str());
    write_manifest(&cfg.packages_dir, "a-1.1.0.json", &with_digest)?;

    let summary = vpm_index_core::run(&cfg).await?;
    assert_eq!(summary.packages, 1);
    assert_eq!(summary.versions, 2);
    assert_eq!(summary.computed, 1);
    assert_eq!(summary.verified, 1);

    let output = read_output(&cfg.output)?;
    assert_eq!(output["id"], "com.example.vpm");
    assert_eq!(output["author"], "VPM Index Maintainers");
    let versions = &output["packages"]["a"]["versions"];
    assert_eq!(versions.as_object().map(|v| v.len()), Some(2));
    assert_eq!(
        versions["1.0.0"]["zipSHA256"],
        json!(Sha256Digest::of(&first).as_str())
    );
    assert_eq!(versions["1.1.0"]["zipSHA256"], json!(declared.as_str()));
    assert_eq!(versions["1.0.0"]["author"]["url"], "https://example.com");
    assert_eq!(versions["1.1.0"]["unity"], "2022.3");
    Ok(())
}

#[tokio::test]
async fn duplicate_version_writes_nothing() -> Result<()> {
    let Some(server) = StaticServer::start(HashMap::new())? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let cfg = config(temp.path(), Some(&server))?;
    assert_eq!(cfg.digest_policy, DigestPolicy::Fallback);
    let url = server.url("/files/b-2.0.0.zip");
    write_manifest(&cfg.packages_dir, "b.json", &manifest("b", "2.0.0", &url))?;
    let mut copy = manifest("b", "2.0.0", &url);
    copy["description"] = json!("same version, different file");
    copy["zipSHA256"] = json!(Sha256Digest::of(b"another build").as_str());
    write_manifest(&cfg.packages_dir, "b-copy.json", &copy)?;

    let err = vpm_index_core::run(&cfg).await.unwrap_err();
    match err {
        BuildError::DuplicateVersion { package, version } => {
            assert_eq!(package, "b");
            assert_eq!(version, "2.0.0");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(server.hits().is_empty());
    assert!(!cfg.output.exists());
    Ok(())
}

#[tokio::test]
async fn release_without_digest_falls_back_to_download() -> Result<()> {
    let archive = zip_archive(&[("package.json", "{}"), ("Runtime/Tool.cs", "// tool")])?;
    let download_path = "/octo/tool/releases/download/v1.0.0/tool.zip";
    let api_path = "/repos/octo/tool/releases/tags/v1.0.0";
    let Some(server) = start_release_server(&archive, download_path, api_path, None)? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let cfg = config(temp.path(), Some(&server))?;
    write_manifest(
        &cfg.packages_dir,
        "tool.json",
        &manifest("com.octo.tool", "1.0.0", &server.url(download_path)),
    )?;

    let summary = vpm_index_core::run(&cfg).await?;
    assert_eq!(summary.computed, 1);
    assert_eq!(summary.from_release, 0);

    let hits = server.hits();
    let api = hits.iter().position(|p| p == api_path);
    let download = hits.iter().position(|p| p == download_path);
    assert!(api.is_some() && download.is_some() && api < download);

    let output = read_output(&cfg.output)?;
    assert_eq!(
        output["packages"]["com.octo.tool"]["versions"]["1.0.0"]["zipSHA256"],
        json!(Sha256Digest::of(&archive).as_str())
    );
    Ok(())
}

#[tokio::test]
async fn release_digest_skips_download() -> Result<()> {
    let archive = zip_archive(&[("package.json", "{}")])?;
    let published = Sha256Digest::of(&archive);
    let download_path = "/octo/tool/releases/download/v2.0.0/tool.zip";
    let api_path = "/repos/octo/tool/releases/tags/v2.0.0";
    let Some(server) =
        start_release_server(&archive, download_path, api_path, Some(&published))?
    else {
        return Ok(());
    };

    let temp = tempfile::tempdir()?;
    let mut cfg = config(temp.path(), Some(&server))?;
    cfg.digest_policy = DigestPolicy::Strict;
    write_manifest(
        &cfg.packages_dir,
        "tool.json",
        &manifest("com.octo.tool", "2.0.0", &server.url(download_path)),
    )?;

    let summary = vpm_index_core::run(&cfg).await?;
    assert_eq!(summary.from_release, 1);
    assert!(!server.hits().iter().any(|p| p == download_path));

    let output = read_output(&cfg.output)?;
    assert_eq!(
        output["packages"]["com.octo.tool"]["versions"]["2.0.0"]["zipSHA256"],
        json!(published.as_str())
    );
    Ok(())
}

/// Release API and artifact host on one server. The asset's download URL
/// must point back at the server itself, so the routes are installed after
/// the port is known.
fn start_release_server(
    archive: &[u8],
    download_path: &str,
    api_path: &str,
    digest: Option<&Sha256Digest>,
) -> Result<Option<StaticServer>> {
    StaticServer::start_with(|addr| {
        let download_url = format!("http://{addr}{download_path}");
        let mut asset = json!({ "name": "tool.zip", "browser_download_url": download_url });
        if let Some(digest) = digest {
            asset["digest"] = json!(format!("sha256:{digest}"));
        }
        Ok(HashMap::from([
            (
                api_path.to_string(),
                Route::json(&json!({ "tag_name": "v", "assets": [asset] }))?,
            ),
            (download_path.to_string(), Route::zip(archive.to_vec())),
        ]))
    })
}

#[tokio::test]
async fn declared_digest_mismatch_writes_nothing() -> Result<()> {
    let archive = zip_archive(&[("package.json", "{}")])?;
    let routes = HashMap::from([("/c.zip".to_string(), Route::zip(archive))]);
    let Some(server) = StaticServer::start(routes)? else {
        return Ok(());
    };

    let temp = tempfile::tempdir()?;
    let cfg = config(temp.path(), Some(&server))?;
    let mut tampered = manifest("c", "1.0.0", &server.url("/c.zip"));
    tampered["zipSHA256"] = json!(Sha256Digest::of(b"something else").as_str());
    write_manifest(&cfg.packages_dir, "c.json", &tampered)?;

    let err = vpm_index_core::run(&cfg).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::Integrity {
            reason: IntegrityError::DigestMismatch { .. },
            ..
        }
    ));
    assert!(!cfg.output.exists());
    Ok(())
}

#[tokio::test]
async fn strict_policy_without_release_digest_fails() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let mut cfg = offline(temp.path())?;
    cfg.digest_policy = DigestPolicy::Strict;
    write_manifest(
        &cfg.packages_dir,
        "d.json",
        &manifest("d", "0.1.0", "https://cdn.example.com/d.zip"),
    )?;
    let err = vpm_index_core::run(&cfg).await.unwrap_err();
    assert!(matches!(err, BuildError::UnresolvedDigest { .. }));
    assert!(!cfg.output.exists());
    Ok(())
}

#[tokio::test]
async fn update_mode_extends_and_rebuilds_idempotently() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let mut cfg = offline(temp.path())?;
    cfg.update_existing = true;
    write_manifest(
        &cfg.packages_dir,
        "b.json",
        &manifest("b", "1.0.0", "https://cdn.example.com/b-1.0.0.zip"),
    )?;
    let first = vpm_index_core::run(&cfg).await?;
    assert_eq!(first.missing, 1);
    let initial = fs::read(&cfg.output)?;

    let rebuilt = vpm_index_core::run(&cfg).await?;
    assert_eq!(rebuilt.versions, 1);
    assert_eq!(fs::read(&cfg.output)?, initial);

    write_manifest(
        &cfg.packages_dir,
        "a.json",
        &manifest("a", "0.1.0", "https://cdn.example.com/a-0.1.0.zip"),
    )?;
    let extended = vpm_index_core::run(&cfg).await?;
    assert_eq!(extended.packages, 2);
    let output = read_output(&cfg.output)?;
    assert!(output["packages"]["a"]["versions"]["0.1.0"].is_object());
    assert!(output["packages"]["b"]["versions"]["1.0.0"].is_object());
    Ok(())
}

#[tokio::test]
async fn invalid_manifest_aborts_build() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let cfg = offline(temp.path())?;
    let mut broken = manifest("e", "1.0.0", "https://cdn.example.com/e.zip");
    broken["displayName"] = Value::Null;
    write_manifest(&cfg.packages_dir, "e.json", &broken)?;
    fs::write(cfg.packages_dir.join("notes.txt"), "ignored")?;

    let err = vpm_index_core::run(&cfg).await.unwrap_err();
    match err {
        BuildError::Schema { path, .. } => assert!(path.ends_with("e.json")),
        other => panic!("unexpected error {other}"),
    }
    assert!(!cfg.output.exists());
    Ok(())
}
