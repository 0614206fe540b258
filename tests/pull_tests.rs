//! End-to-end pull tests against a local registry fixture.
//!
//! A minimal HTTP listener plays the token, manifest, and blob
//! endpoints, so the whole wire path runs for real: token fetch, index
//! dispatch, platform selection, manifest re-fetch by digest, blob
//! streaming, and the gzip/tar unpack stages. Requires `gzip` and `tar`
//! on PATH, like the pipeline itself.

use boxrun::constants::{MANIFEST_V2_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use boxrun::{ensure_image, Config, ImageStore, Platform};
use std::collections::HashMap;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const IMAGE_ID: &str = "sha256:image-config";
const MANIFEST_DIGEST: &str = "sha256:target-manifest";
const LAYER_ONE: &str = "sha256:layer-one";
const LAYER_TWO: &str = "sha256:layer-two";

// =============================================================================
// Fixtures
// =============================================================================

/// Builds a gzip-compressed tarball holding one file.
fn gzipped_layer(name: &str, body: &str) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(name), body).unwrap();

    let out = dir.path().join("layer.tgz");
    let status = Command::new("tar")
        .arg("-czf")
        .arg(&out)
        .arg("-C")
        .arg(dir.path())
        .arg(name)
        .status()
        .unwrap();
    assert!(status.success());
    fs::read(out).unwrap()
}

fn token_body() -> String {
    format!(
        r#"{{"access_token":"fixture-token","issued_at":"{}","expires_in":300}}"#,
        chrono::Utc::now().to_rfc3339()
    )
}

/// Index with a single entry for the host platform.
fn index_body(host: &Platform) -> String {
    format!(
        r#"{{"schemaVersion":2,"mediaType":"{}","manifests":[{{"mediaType":"{}","size":1,"digest":"{}","platform":{{"os":"{}","architecture":"{}"}}}}]}}"#,
        OCI_INDEX_MEDIA_TYPE,
        OCI_MANIFEST_MEDIA_TYPE,
        MANIFEST_DIGEST,
        host.os_str(),
        host.arch_str()
    )
}

fn manifest_body() -> String {
    format!(
        r#"{{"schemaVersion":2,"mediaType":"{}","config":{{"mediaType":"application/vnd.oci.image.config.v1+json","size":1,"digest":"{}"}},"layers":[{{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","size":1,"digest":"{}"}},{{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","size":1,"digest":"{}"}}]}}"#,
        MANIFEST_V2_MEDIA_TYPE,
        IMAGE_ID,
        LAYER_ONE,
        LAYER_TWO
    )
}

// =============================================================================
// Fixture Registry
// =============================================================================

type Routes = Arc<HashMap<String, (String, Vec<u8>)>>;

/// Serves GET requests from a fixed path -> (content type, body) table.
/// One response per connection; unknown paths get a 404.
async fn serve(listener: TcpListener, routes: Routes) {
    loop {
        let accepted = listener.accept().await;
        let (mut socket, _) = match accepted {
            Ok(pair) => pair,
            Err(_) => return,
        };

        let routes = routes.clone();
        tokio::spawn(async move {
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let request = String::from_utf8_lossy(&request);
            let path = request
                .split_whitespace()
                .nth(1)
                .unwrap_or("")
                .split('?')
                .next()
                .unwrap_or("")
                .to_string();

            let response = match routes.get(&path) {
                Some((content_type, body)) => {
                    let mut bytes = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        content_type,
                        body.len()
                    )
                    .into_bytes();
                    bytes.extend_from_slice(body);
                    bytes
                }
                None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_vec(),
            };

            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
    }
}

/// Starts the fixture registry and returns its base URL.
async fn start_fixture_registry() -> String {
    let host = Platform::detect();

    let mut routes: HashMap<String, (String, Vec<u8>)> = HashMap::new();
    routes.insert(
        "/token".to_string(),
        ("application/json".to_string(), token_body().into_bytes()),
    );
    routes.insert(
        "/v2/library/twolayer/manifests/latest".to_string(),
        (
            OCI_INDEX_MEDIA_TYPE.to_string(),
            index_body(&host).into_bytes(),
        ),
    );
    routes.insert(
        format!("/v2/library/twolayer/manifests/{}", MANIFEST_DIGEST),
        (
            MANIFEST_V2_MEDIA_TYPE.to_string(),
            manifest_body().into_bytes(),
        ),
    );
    routes.insert(
        format!("/v2/library/twolayer/blobs/{}", LAYER_ONE),
        (
            "application/octet-stream".to_string(),
            gzipped_layer("base-file", "from base layer"),
        ),
    );
    routes.insert(
        format!("/v2/library/twolayer/blobs/{}", LAYER_TWO),
        (
            "application/octet-stream".to_string(),
            gzipped_layer("top-file", "from top layer"),
        ),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, Arc::new(routes)));
    base
}

// =============================================================================
// Pull Pipeline
// =============================================================================

#[tokio::test]
async fn test_two_layer_pull_populates_both_rootfs_trees() {
    let base = start_fixture_registry().await;
    let root = TempDir::new().unwrap();
    let config = Config::with_root(root.path().to_path_buf()).with_endpoints(&base, &base);

    let image_id = ensure_image(&config, "twolayer:latest").await.unwrap();
    assert_eq!(image_id, IMAGE_ID);

    let store = ImageStore::new(&config);
    assert!(store.is_cached(IMAGE_ID));

    let base_file = store.layer_rootfs(IMAGE_ID, LAYER_ONE).join("base-file");
    let top_file = store.layer_rootfs(IMAGE_ID, LAYER_TWO).join("top-file");
    assert_eq!(fs::read(base_file).unwrap(), b"from base layer");
    assert_eq!(fs::read(top_file).unwrap(), b"from top layer");

    // Packed and decompressed intermediates are gone; only the layer
    // directories and the order file remain.
    for entry in fs::read_dir(store.image_dir(IMAGE_ID)).unwrap() {
        let name = entry.unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(
            name == "layers.json" || name == LAYER_ONE || name == LAYER_TWO,
            "unexpected entry {}",
            name
        );
    }
}

#[tokio::test]
async fn test_pulled_image_reruns_without_network() {
    let base = start_fixture_registry().await;
    let root = TempDir::new().unwrap();
    let config = Config::with_root(root.path().to_path_buf()).with_endpoints(&base, &base);

    let image_id = ensure_image(&config, "twolayer:latest").await.unwrap();

    // Same store, endpoints that refuse every connection: success means
    // the second resolution made no network call.
    let offline = Config::with_root(root.path().to_path_buf())
        .with_endpoints("http://127.0.0.1:1", "http://127.0.0.1:1");
    let cached_id = ensure_image(&offline, "twolayer:latest").await.unwrap();
    assert_eq!(cached_id, image_id);
}
