//! Unit tests for the fetcher

use super::*;

use crate::tarball::tests::build_archive;
use camino::Utf8PathBuf;
use grove_core::types::Package;
use grove_core::utils::sha256_hex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    _dir: tempfile::TempDir,
    server: MockServer,
    remote: Remote,
    fetcher: Fetcher,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    let server = MockServer::start().await;
    let remote = Remote::new("origin", server.uri())
        .with_primary_source(format!("{}/primary/{{hash}}/{{archive}}", server.uri()));
    let fetcher = Fetcher::new(PackageStore::new(root), RegistryClient::new().unwrap(), 2);
    Fixture {
        _dir: dir,
        server,
        remote,
        fetcher,
    }
}

fn entry(id: PackageVersionId, path: &str, archive: &[u8]) -> CatalogEntry {
    let package = Package::new(path.parse().unwrap(), "1.0.0".parse().unwrap());
    CatalogEntry::new(id, package, sha256_hex(archive))
}

/// Request path of a full URL served by the mock server
fn local_path(server: &MockServer, url: &str) -> String {
    url.trim_start_matches(&server.uri()).to_string()
}

async fn serve(fx: &Fixture, url: &str, body: Vec<u8>, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(local_path(&fx.server, url)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(expected_hits)
        .mount(&fx.server)
        .await;
}

#[test]
fn test_worker_count_bounds() {
    assert!(worker_count(1) >= 1);
    assert_eq!(worker_count(64), MAX_DOWNLOAD_THREADS);
    assert!(worker_count(0) <= MAX_DOWNLOAD_THREADS);
}

#[tokio::test]
async fn test_fetch_unpacks_and_is_idempotent() {
    let fx = fixture().await;
    let archive = build_archive(&[("lib.c", "int lib;")]);
    let entry = entry(1, "org.x.lib", &archive);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], archive, 1).await;

    let report = fx
        .fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap();
    assert_eq!(report.outcome(1), Some(FetchOutcome::Downloaded));
    assert_eq!(report.downloaded(), vec![1]);

    let store = fx.fetcher.store();
    assert!(store.src_dir(&entry.package).join("lib.c").exists());
    assert_eq!(store.read_stamp(&entry.package).unwrap(), Some(entry.hash.clone()));
    assert!(!store.archive_path(&entry.package).exists());

    // Second call is served from the stamp; the mock allows only one hit
    let report = fx
        .fetcher
        .fetch_all(&[entry], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap();
    assert_eq!(report.outcome(1), Some(FetchOutcome::Satisfied));
    assert!(report.downloaded().is_empty());
}

#[tokio::test]
async fn test_remote_mismatch_is_fatal_and_rolled_back() {
    let fx = fixture().await;
    let good = build_archive(&[("a.c", "good")]);
    let entry = entry(1, "org.x.lib", &good);
    serve(
        &fx,
        &fx.remote.primary_urls(&entry.package)[0],
        build_archive(&[("a.c", "tampered")]),
        1,
    )
    .await;
    // never consulted under authoritative hashes
    serve(&fx, &fx.remote.secondary_url(&entry.package), good, 0).await;

    let err = fx
        .fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap_err();

    match err {
        GroveError::FetchFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(*failures[0].error, GroveError::HashMismatch { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let store = fx.fetcher.store();
    assert!(!store.src_dir(&entry.package).exists());
    assert_eq!(store.read_stamp(&entry.package).unwrap(), None);
    assert!(!store.archive_path(&entry.package).exists());
}

#[tokio::test]
async fn test_local_mismatch_falls_back_to_secondary() {
    let fx = fixture().await;
    let good = build_archive(&[("a.c", "good")]);
    let entry = entry(1, "org.x.lib", &good);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], b"stale".to_vec(), 1).await;
    serve(&fx, &fx.remote.secondary_url(&entry.package), good, 1).await;

    let report = fx
        .fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Local)
        .await
        .unwrap();
    assert_eq!(report.outcome(1), Some(FetchOutcome::Downloaded));
    assert!(fx.fetcher.store().src_dir(&entry.package).join("a.c").exists());
}

#[tokio::test]
async fn test_local_mismatch_everywhere_is_stale_catalog() {
    let fx = fixture().await;
    let entry = entry(1, "org.baz.lib", b"what the mirror believes");
    let actual = build_archive(&[("a.c", "newer")]);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], actual.clone(), 1).await;
    serve(&fx, &fx.remote.secondary_url(&entry.package), actual, 1).await;

    let err = fx
        .fetcher
        .fetch_all(&[entry], &fx.remote, CatalogSource::Local)
        .await
        .unwrap_err();
    assert!(matches!(err, GroveError::StaleLocalCatalog { .. }));
}

#[tokio::test]
async fn test_failures_are_isolated_per_package() {
    let fx = fixture().await;
    let archive = build_archive(&[("ok.c", "ok")]);
    let ok = entry(1, "org.x.ok", &archive);
    let missing = entry(2, "org.x.missing", b"never served");
    serve(&fx, &fx.remote.secondary_url(&ok.package), archive, 1).await;

    let err = fx
        .fetcher
        .fetch_all(&[ok.clone(), missing.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap_err();

    match err {
        GroveError::FetchFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].package, missing.package.to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fx.fetcher.store().src_dir(&ok.package).join("ok.c").exists());
    assert!(!fx.fetcher.store().src_dir(&missing.package).exists());
}

#[tokio::test]
async fn test_unpack_directory_relocation() {
    let fx = fixture().await;
    let archive = build_archive(&[
        ("grove.toml", "unpack_directory = \"src\""),
        ("a.c", "a"),
        ("include/a.h", "h"),
    ]);
    let entry = entry(1, "org.x.lib", &archive);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], archive, 1).await;

    fx.fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap();

    let dir = fx.fetcher.store().src_dir(&entry.package);
    assert!(dir.join("grove.toml").exists());
    assert!(dir.join("src/a.c").exists());
    assert!(dir.join("src/include/a.h").exists());
    assert!(!dir.join("a.c").exists());
}

#[tokio::test]
async fn test_concurrent_fetch_downloads_once() {
    let fx = fixture().await;
    let archive = build_archive(&[("lib.c", "shared")]);
    let entry = entry(1, "org.x.lib", &archive);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], archive, 1).await;

    let other = fx.fetcher.clone();
    let (a, b) = tokio::join!(
        fx.fetcher.fetch_one(&entry, &fx.remote, CatalogSource::Remote),
        other.fetch_one(&entry, &fx.remote, CatalogSource::Remote),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(
        outcomes.iter().filter(|o| **o == FetchOutcome::Downloaded).count(),
        1
    );
    assert!(fx.fetcher.store().src_dir(&entry.package).join("lib.c").exists());
}

#[tokio::test]
async fn test_unreadable_archive_leaves_nothing_behind() {
    let fx = fixture().await;
    // hash matches what is served, but the payload is not a tarball
    let corrupt = b"not a gzip stream".to_vec();
    let entry = entry(1, "org.x.lib", &corrupt);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], corrupt, 1).await;

    let err = fx
        .fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap_err();
    assert!(matches!(err, GroveError::FetchFailed { .. }));

    let store = fx.fetcher.store();
    assert_eq!(store.read_stamp(&entry.package).unwrap(), None);
    assert!(!store.src_dir(&entry.package).exists());
    assert!(!store.staging_dir(&entry.package).exists());
    assert!(!store.archive_path(&entry.package).exists());
}

#[tokio::test]
async fn test_interrupted_unpack_is_redone() {
    let fx = fixture().await;
    let archive = build_archive(&[("lib.c", "int lib;"), ("lib.h", "int lib();")]);
    let entry = entry(1, "org.x.lib", &archive);
    serve(&fx, &fx.remote.primary_urls(&entry.package)[0], archive, 1).await;

    // a run killed mid-unpack: half-filled staging, no sources
    let store = fx.fetcher.store();
    let staging = store.staging_dir(&entry.package);
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("lib.c"), "int li").unwrap();
    assert!(!store.is_satisfied(&entry).unwrap());

    let report = fx
        .fetcher
        .fetch_all(&[entry.clone()], &fx.remote, CatalogSource::Remote)
        .await
        .unwrap();
    assert_eq!(report.outcome(1), Some(FetchOutcome::Downloaded));

    let dir = store.src_dir(&entry.package);
    assert_eq!(std::fs::read_to_string(dir.join("lib.c")).unwrap(), "int lib;");
    assert!(dir.join("lib.h").exists());
    assert!(!staging.exists());
    assert_eq!(store.read_stamp(&entry.package).unwrap(), Some(entry.hash.clone()));
}
