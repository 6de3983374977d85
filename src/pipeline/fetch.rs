//! Fetch stage: stream a remote file into the staging directory.
//!
//! The body is written chunk by chunk as it arrives, so memory use stays flat
//! no matter how large the payload is. The first bytes are kept on the side
//! as the file's signature; the extract stage uses them to tell a real gzip
//! stream from a plain-text file that merely ends in `.gz`.

use crate::config::ConversionConfig;
use crate::error::Url2XlsxError;
use crate::pipeline::guard;
use futures::StreamExt;
use reqwest::Url;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Number of leading bytes remembered as the content signature.
pub const SIGNATURE_LEN: usize = 4;

/// Gzip magic number.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// A file sitting in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Up to [`SIGNATURE_LEN`] leading bytes of the content.
    pub signature: Vec<u8>,
    /// Total bytes on disk.
    pub bytes: u64,
}

impl StagedFile {
    /// Build a `StagedFile` for a file already on disk by reading its head.
    pub fn inspect(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = std::fs::File::open(&path)?;
        let bytes = file.metadata()?.len();
        let mut signature = Vec::with_capacity(SIGNATURE_LEN);
        file.take(SIGNATURE_LEN as u64).read_to_end(&mut signature)?;
        Ok(Self {
            path,
            signature,
            bytes,
        })
    }

    /// True when the content starts with `1F 8B`.
    pub fn has_gzip_magic(&self) -> bool {
        self.signature.starts_with(&GZIP_MAGIC)
    }
}

/// Check that `input` is an absolute HTTP/HTTPS URL.
///
/// The pipeline itself does not call this; it is the request-validation step
/// front ends run before handing a URL over.
pub fn validate_url(input: &str) -> Result<Url, Url2XlsxError> {
    let invalid = |reason: String| Url2XlsxError::InvalidUrl {
        input: input.to_string(),
        reason,
    };

    let url = Url::parse(input.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// The staging file name for `url`: its last non-empty path segment, sanitised.
pub fn filename_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("");
    guard::sanitize_filename(last)
}

/// Download `url` into `dest_dir`, creating the directory if needed.
///
/// Fails with [`Url2XlsxError::Fetch`] on an unparsable URL, a network error,
/// a non-2xx status, or a local write error. Nothing is retried.
pub async fn download(
    url: &str,
    dest_dir: &Path,
    config: &ConversionConfig,
) -> Result<StagedFile, Url2XlsxError> {
    let fetch_err = |reason: String| Url2XlsxError::Fetch {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| fetch_err(format!("invalid URL: {e}")))?;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| fetch_err(format!("cannot create '{}': {e}", dest_dir.display())))?;

    let filename = filename_from_url(&parsed);
    let dest = guard::resolve(dest_dir, &filename)?;

    info!("Downloading file: {}", url);

    let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
    if let Some(secs) = config.download_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build().map_err(|e| fetch_err(e.to_string()))?;

    let response = client.get(parsed).send().await.map_err(|e| {
        if e.is_timeout() {
            fetch_err(format!(
                "timed out after {}s",
                config.download_timeout_secs.unwrap_or_default()
            ))
        } else {
            fetch_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let mut file = tokio::fs::File::create(&dest)
        .await
        .map_err(|e| fetch_err(format!("cannot create '{}': {e}", dest.display())))?;

    let mut signature = Vec::with_capacity(SIGNATURE_LEN);
    let mut written = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fetch_err(e.to_string()))?;
        if signature.len() < SIGNATURE_LEN {
            let take = (SIGNATURE_LEN - signature.len()).min(chunk.len());
            signature.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| fetch_err(format!("write to '{}' failed: {e}", dest.display())))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| fetch_err(format!("write to '{}' failed: {e}", dest.display())))?;

    debug!("Signature of {}: {:02x?}", dest.display(), signature);
    info!("Downloaded {} bytes to {}", written, dest.display());

    Ok(StagedFile {
        path: dest,
        signature,
        bytes: written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/data.csv").is_ok());
        assert!(validate_url("http://example.com/a/b/c.tsv.gz").is_ok());
        assert!(validate_url("  https://example.com/x.csv  ").is_ok());

        for bad in ["", "data.csv", "/tmp/data.csv", "ftp://example.com/a.csv", "file:///etc/passwd"] {
            assert!(
                matches!(validate_url(bad), Err(Url2XlsxError::InvalidUrl { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_filename_from_url() {
        let name = |s: &str| filename_from_url(&Url::parse(s).unwrap());
        assert_eq!(name("https://example.com/exports/data.csv"), "data.csv");
        assert_eq!(name("https://example.com/exports/data.csv?x=1#frag"), "data.csv");
        assert_eq!(name("https://example.com/exports/"), "exports");
        assert_eq!(name("https://example.com/"), "download");
        assert_eq!(name("https://example.com/a/..%2F..%2Fevil.csv"), "_2F.._2Fevil.csv");
    }

    #[test]
    fn test_inspect_reads_signature() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("x.gz");
        std::fs::write(&p, [0x1F, 0x8B, 0x08, 0x00, 0xFF, 0xFF]).unwrap();
        let staged = StagedFile::inspect(&p).unwrap();
        assert_eq!(staged.signature, vec![0x1F, 0x8B, 0x08, 0x00]);
        assert_eq!(staged.bytes, 6);
        assert!(staged.has_gzip_magic());

        let short = dir.path().join("short.gz");
        std::fs::write(&short, b"a").unwrap();
        let staged = StagedFile::inspect(&short).unwrap();
        assert_eq!(staged.signature, b"a".to_vec());
        assert!(!staged.has_gzip_magic());
    }

    #[tokio::test]
    async fn test_download_streams_body_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("name,age\nA,1\n"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested/staging");
        let url = format!("{}/exports/data.csv", server.uri());

        let staged = download(&url, &dest, &ConversionConfig::default())
            .await
            .expect("download should succeed");

        assert!(staged.path.starts_with(std::path::absolute(&dest).unwrap()));
        assert_eq!(staged.path.file_name().unwrap(), "data.csv");
        assert_eq!(staged.bytes, 13);
        assert_eq!(staged.signature, b"name".to_vec());
        assert_eq!(
            std::fs::read_to_string(&staged.path).unwrap(),
            "name,age\nA,1\n"
        );
    }

    #[tokio::test]
    async fn test_download_non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.csv"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/missing.csv", server.uri());
        let err = download(&url, dir.path(), &ConversionConfig::default())
            .await
            .unwrap_err();

        match err {
            Url2XlsxError::Fetch { reason, .. } => assert!(reason.contains("404"), "got: {reason}"),
            other => panic!("expected Fetch, got {other:?}"),
        }
        assert!(!dir.path().join("missing.csv").exists());
    }

    #[tokio::test]
    async fn test_download_connection_refused_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        // Port 9 (discard) on localhost is essentially never listening.
        let err = download(
            "http://127.0.0.1:9/data.csv",
            dir.path(),
            &ConversionConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "fetch");
    }
}
