//! Raw feed readers.
//!
//! The live data always comes over HTTP. The region metadata is fetched
//! from the CDN URL, falling back to a local copy when the fetch fails.

use common::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest slice of an error body kept in `Error::Feed` messages.
const ERROR_BODY_CHARS: usize = 500;

/// Source of one raw feed document.
#[derive(Debug, Clone)]
pub enum DataReader {
    Web {
        client: reqwest::Client,
        url: String,
        fallback: Option<PathBuf>,
    },
    File {
        path: PathBuf,
    },
}

/// A fully fetched document, consumed line by line.
#[derive(Debug, Clone)]
pub struct Buffered {
    body: String,
}

impl Buffered {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines()
    }
}

impl DataReader {
    pub fn web(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self::Web {
            client,
            url: url.into(),
            fallback: None,
        }
    }

    /// Web reader that reads `fallback` when the URL cannot be fetched.
    pub fn web_with_fallback(
        client: reqwest::Client,
        url: impl Into<String>,
        fallback: impl Into<PathBuf>,
    ) -> Self {
        Self::Web {
            client,
            url: url.into(),
            fallback: Some(fallback.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Fetch the whole document into memory.
    pub async fn fetch(&self) -> Result<Buffered, Error> {
        match self {
            Self::Web {
                client,
                url,
                fallback,
            } => match (fetch_url(client, url).await, fallback) {
                (Ok(buffered), _) => Ok(buffered),
                (Err(e), Some(path)) => {
                    warn!("{}; reading {} instead", e, path.display());
                    read_file(path).await
                }
                (Err(e), None) => Err(e),
            },
            Self::File { path } => read_file(path).await,
        }
    }

    pub fn locator(&self) -> String {
        match self {
            Self::Web { url, .. } => url.clone(),
            Self::File { path } => path.display().to_string(),
        }
    }
}

async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Buffered, Error> {
    debug!("Fetching feed: {}", url);

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Http(format!("GET {} failed: {}", url, e)))?;

    let status = resp.status().as_u16();
    if status != 200 {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Feed(format!(
            "{} returned {}: {}",
            url,
            status,
            body.chars().take(ERROR_BODY_CHARS).collect::<String>()
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading body of {} failed: {}", url, e)))?;
    info!("req={} res_code={} bytes={}", url, status, body.len());
    Ok(Buffered::new(body))
}

async fn read_file(path: &Path) -> Result<Buffered, Error> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Feed(format!("reading {} failed: {}", path.display(), e)))?;
    let buffered = Buffered::new(body);
    info!(
        "read file {}, {} lines",
        path.display(),
        buffered.lines().count()
    );
    Ok(buffered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/feed", addr)
    }

    #[tokio::test]
    async fn test_file_reader_buffers_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();

        let reader = DataReader::file(file.path());
        let buffered = reader.fetch().await.expect("file should read");

        assert_eq!(buffered.lines().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_feed_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = DataReader::file(dir.path().join("absent.js"));

        let err = reader.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[tokio::test]
    async fn test_error_body_truncated_on_char_boundary() {
        // 'é' straddles byte 500.
        let body = format!("{}é tail", "a".repeat(499));
        let url = serve_once("503 Service Unavailable", body).await;

        let reader = DataReader::web(reqwest::Client::new(), url);
        let err = reader.fetch().await.unwrap_err();

        let Error::Feed(message) = err else {
            panic!("expected feed error, got {:?}", err);
        };
        assert!(message.contains("503"));
        assert!(message.ends_with(&format!("{}é", "a".repeat(499))));
    }

    #[tokio::test]
    async fn test_web_error_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"R.SensorNames=["", "Ralston"];"#).unwrap();
        let url = serve_once("404 Not Found", "gone".into()).await;

        let reader = DataReader::web_with_fallback(reqwest::Client::new(), url, file.path());
        let buffered = reader.fetch().await.expect("fallback should read");

        assert_eq!(
            buffered.lines().collect::<Vec<_>>(),
            vec![r#"R.SensorNames=["", "Ralston"];"#]
        );
    }

    #[tokio::test]
    async fn test_web_success_ignores_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", "live".into()).await;

        let reader =
            DataReader::web_with_fallback(reqwest::Client::new(), url, dir.path().join("absent.js"));
        let buffered = reader.fetch().await.expect("web should read");

        assert_eq!(buffered.lines().collect::<Vec<_>>(), vec!["live"]);
    }
}
