use crate::error::{Error, Result};
use hf_hub::api::sync::Api;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

const HUB_SCHEME: &str = "hf://";

/// Where the model artifact comes from and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub url: String,
    pub path: PathBuf,
}

/// A blocking source of artifact bytes.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP(S) GET. The agent is only built once a download is actually needed.
pub struct HttpTransport {
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.timeout)
            .timeout_read(self.timeout)
            .build();

        let resp = agent
            .get(url)
            .set("User-Agent", concat!("classy/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    Error::DownloadFailed(format!("HTTP {} for {}", code, url))
                }
                ureq::Error::Transport(t) => {
                    Error::DownloadFailed(format!("Request to {} failed: {}", url, t))
                }
            })?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::DownloadFailed(format!("Failed to read body from {}: {}", url, e)))?;

        Ok(bytes)
    }
}

/// Resolves `hf://owner/repo/path/to/file` through the HuggingFace Hub cache.
pub struct HubTransport;

impl HubTransport {
    fn parse(url: &str) -> Result<(String, String)> {
        let rest = url
            .strip_prefix(HUB_SCHEME)
            .ok_or_else(|| Error::DownloadFailed(format!("Not a hub URL: {}", url)))?;

        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), Some(file))
                if !owner.is_empty() && !repo.is_empty() && !file.is_empty() =>
            {
                Ok((format!("{}/{}", owner, repo), file.to_string()))
            }
            _ => Err(Error::DownloadFailed(format!(
                "Expected hf://<owner>/<repo>/<file>, got {}",
                url
            ))),
        }
    }
}

impl Transport for HubTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let (repo_id, file) = Self::parse(url)?;

        tracing::info!("Resolving {} from HuggingFace repo {}", file, repo_id);

        let api = Api::new().map_err(|e| Error::DownloadFailed(e.to_string()))?;
        let cached = api
            .model(repo_id)
            .get(&file)
            .map_err(|e| Error::DownloadFailed(format!("Could not fetch {}: {}", file, e)))?;

        Ok(std::fs::read(cached)?)
    }
}

/// Picks the hub or the HTTP transport from the URL scheme.
pub struct DefaultTransport {
    http: HttpTransport,
    hub: HubTransport,
}

impl DefaultTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpTransport::new(timeout),
            hub: HubTransport,
        }
    }
}

impl Transport for DefaultTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with(HUB_SCHEME) {
            self.hub.fetch(url)
        } else {
            self.http.fetch(url)
        }
    }
}

pub struct ArtifactFetcher<T> {
    transport: T,
}

impl<T: Transport> ArtifactFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Makes sure `destination` exists, downloading it from `url` if it does not.
    ///
    /// An existing file is trusted as-is: there is no size or checksum check, so a
    /// corrupt file left behind by an earlier crash is never re-fetched.
    pub fn ensure_downloaded(&self, url: &str, destination: &Path) -> Result<()> {
        if destination.exists() {
            tracing::debug!("Artifact already present at {:?}, skipping download", destination);
            return Ok(());
        }

        if url.is_empty() {
            return Err(Error::DownloadFailed(format!(
                "{:?} is missing and no model URL is configured",
                destination
            )));
        }

        tracing::info!("Downloading model artifact from {}", url);

        let bytes = self.transport.fetch(url)?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Readers only ever see the final name once the bytes are all on disk.
        let part = part_path(destination);
        std::fs::write(&part, &bytes)?;
        std::fs::rename(&part, destination)?;

        tracing::info!("Saved {} bytes to {:?}", bytes.len(), destination);

        Ok(())
    }
}

pub(crate) fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Transport double that counts calls and appends to a shared event log.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        pub body: Option<Vec<u8>>,
        pub calls: Arc<AtomicUsize>,
        pub events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakeTransport {
        pub fn serving(body: &[u8]) -> Self {
            Self {
                body: Some(body.to_vec()),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self::default()
        }
    }

    impl Transport for FakeTransport {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push("fetch");
            self.body
                .clone()
                .ok_or_else(|| Error::DownloadFailed(format!("connection refused: {}", url)))
        }
    }

    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "classy-{}-{}-{}",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn downloads_missing_file() {
        let dir = scratch_dir("fresh");
        let dest = dir.join("test.pkl");
        let transport = FakeTransport::serving(b"test data");
        let calls = transport.calls.clone();

        ArtifactFetcher::new(transport)
            .ensure_downloaded("http://test.com/file", &dest)
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"test data");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn skips_existing_file() {
        let dir = scratch_dir("existing");
        let dest = dir.join("existing.pkl");
        std::fs::write(&dest, b"existing data").unwrap();
        let transport = FakeTransport::serving(b"new data");
        let calls = transport.calls.clone();

        ArtifactFetcher::new(transport)
            .ensure_downloaded("http://test.com/file", &dest)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"existing data");
    }

    #[test]
    fn second_call_is_a_no_op() {
        let dir = scratch_dir("twice");
        let dest = dir.join("model.safetensors");
        let transport = FakeTransport::serving(b"weights");
        let calls = transport.calls.clone();
        let fetcher = ArtifactFetcher::new(transport);

        fetcher.ensure_downloaded("http://test.com/file", &dest).unwrap();
        fetcher.ensure_downloaded("http://test.com/file", &dest).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), b"weights");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = scratch_dir("nested");
        let dest = dir.join("a").join("b").join("model.safetensors");

        ArtifactFetcher::new(FakeTransport::serving(b"x"))
            .ensure_downloaded("http://test.com/file", &dest)
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"x");
    }

    #[test]
    fn transport_failure_leaves_nothing_behind() {
        let dir = scratch_dir("failing");
        let dest = dir.join("model.safetensors");

        let err = ArtifactFetcher::new(FakeTransport::failing())
            .ensure_downloaded("http://test.com/file", &dest)
            .unwrap_err();

        assert!(matches!(err, Error::DownloadFailed(_)));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn missing_url_fails_without_network() {
        let dir = scratch_dir("no-url");
        let dest = dir.join("model.safetensors");
        let transport = FakeTransport::serving(b"x");
        let calls = transport.calls.clone();

        let err = ArtifactFetcher::new(transport)
            .ensure_downloaded("", &dest)
            .unwrap_err();

        assert!(matches!(err, Error::DownloadFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parses_hub_urls() {
        let (repo, file) = HubTransport::parse("hf://acme/pokedex/weights/model.safetensors").unwrap();
        assert_eq!(repo, "acme/pokedex");
        assert_eq!(file, "weights/model.safetensors");

        assert!(HubTransport::parse("hf://acme/pokedex").is_err());
        assert!(HubTransport::parse("hf://acme//model.safetensors").is_err());
        assert!(HubTransport::parse("https://acme/pokedex/model").is_err());
    }

    async fn spawn_artifact_server() -> String {
        use axum::{http::StatusCode, routing::get, Router};

        let app = Router::new()
            .route("/model.safetensors", get(|| async { "test data" }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn http_transport_reads_full_body() {
        let base = spawn_artifact_server().await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let body = tokio::task::spawn_blocking(move || {
            transport.fetch(&format!("{}/model.safetensors", base))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(body, b"test data");
    }

    #[tokio::test]
    async fn http_transport_rejects_error_status() {
        let base = spawn_artifact_server().await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let err = tokio::task::spawn_blocking(move || transport.fetch(&format!("{}/gone", base)))
            .await
            .unwrap()
            .unwrap_err();

        match err {
            Error::DownloadFailed(msg) => assert!(msg.contains("404"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
