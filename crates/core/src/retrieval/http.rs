//! HTTP retriever for OB.DAAC granule downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::RetrievalConfig;

use super::{RetrievalError, RetrievalOutcome, Retriever};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Marker of the HTML login page served instead of data when credentials are missing.
const LOGIN_PAGE_TITLE: &str = "<title>Earthdata Login</title>";

/// Downloads granules over HTTP(S).
///
/// Bodies are streamed into a `.part` sibling of the destination and renamed
/// into place once complete, so a crash never leaves a truncated granule under
/// its final name.
pub struct HttpRetriever {
    client: Client,
    config: RetrievalConfig,
}

impl HttpRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| RetrievalError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Append the application key to OB.DAAC `getfile` URLs.
    fn request_url(&self, url: &str) -> String {
        match &self.config.appkey {
            Some(key) if url.contains("/getfile/") => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{}{}appkey={}", url, separator, urlencoding::encode(key))
            }
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, url: &str, dest: &Path) -> Result<RetrievalOutcome, RetrievalError> {
        let request_url = self.request_url(url);
        let local_mtime = local_modified(dest).await;

        let mut request = self.client.get(&request_url);
        if let Some(mtime) = local_mtime {
            request = request.header(IF_MODIFIED_SINCE, mtime.format(HTTP_DATE_FORMAT).to_string());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout
            } else if e.is_connect() {
                RetrievalError::ConnectionFailed(e.to_string())
            } else {
                RetrievalError::Transfer(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "Remote file not modified");
            return Ok(RetrievalOutcome::NotModified {
                path: dest.to_path_buf(),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RetrievalError::Unauthorized {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RetrievalError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Some servers ignore If-Modified-Since; compare Last-Modified ourselves.
        let remote_mtime = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        if let (Some(local), Some(remote)) = (local_mtime, remote_mtime) {
            if remote < local {
                debug!(url, "Local copy is newer than remote, skipping");
                return Ok(RetrievalOutcome::NotModified {
                    path: dest.to_path_buf(),
                });
            }
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));

        let payload = if is_html {
            let body = response
                .text()
                .await
                .map_err(|e| RetrievalError::Transfer(e.to_string()))?;
            if body.contains(LOGIN_PAGE_TITLE) {
                return Err(RetrievalError::Unauthorized {
                    url: url.to_string(),
                });
            }
            Payload::Page(body)
        } else {
            Payload::Stream(response)
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);

        let bytes = match write_part(payload, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&part, dest).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }
        debug!(url, bytes, path = %dest.display(), "Downloaded file");

        Ok(RetrievalOutcome::Downloaded {
            path: dest.to_path_buf(),
            bytes,
        })
    }
}

/// Response body still to be written.
enum Payload {
    /// Non-data page already read to check for the login form.
    Page(String),
    Stream(reqwest::Response),
}

/// Write the body into `part`, returning the number of bytes written.
async fn write_part(payload: Payload, part: &Path) -> Result<u64, RetrievalError> {
    match payload {
        Payload::Page(body) => {
            tokio::fs::write(part, body.as_bytes()).await?;
            Ok(body.len() as u64)
        }
        Payload::Stream(mut response) => {
            let mut file = tokio::fs::File::create(part).await?;
            let mut written = 0u64;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| RetrievalError::Transfer(e.to_string()))?
            {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(written)
        }
    }
}

async fn local_modified(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GRANULE: &str = "AQUA_MODIS.20230101T003001.L2.OC.nc";

    fn retriever(appkey: Option<&str>) -> HttpRetriever {
        HttpRetriever::new(RetrievalConfig {
            appkey: appkey.map(String::from),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_request_url_appkey() {
        let r = retriever(Some("k3y"));
        assert_eq!(
            r.request_url("https://oceandata.sci.gsfc.nasa.gov/ob/getfile/X.nc"),
            "https://oceandata.sci.gsfc.nasa.gov/ob/getfile/X.nc?appkey=k3y"
        );
        assert_eq!(
            r.request_url("https://host/ob/getfile/X.nc?a=1"),
            "https://host/ob/getfile/X.nc?a=1&appkey=k3y"
        );
        assert_eq!(r.request_url("https://host/other/X.nc"), "https://host/other/X.nc");
        assert_eq!(
            retriever(None).request_url("https://host/ob/getfile/X.nc"),
            "https://host/ob/getfile/X.nc"
        );
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Sun, 01 Jan 2023 10:20:30 GMT").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-01-01T10:20:30+00:00");
        assert!(parse_http_date("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_download_new_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/ob/getfile/{}", GRANULE)))
            .and(query_param("appkey", "KEY"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"granule-bytes".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("L2/AQUA_MODIS/OC").join(GRANULE);
        let url = format!("{}/ob/getfile/{}", server.uri(), GRANULE);

        let outcome = retriever(Some("KEY")).retrieve(&url, &dest).await.unwrap();
        assert_eq!(
            outcome,
            RetrievalOutcome::Downloaded {
                path: dest.clone(),
                bytes: 13
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"granule-bytes");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("if-modified-since"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(GRANULE);
        std::fs::write(&dest, b"local").unwrap();
        let url = format!("{}/ob/getfile/{}", server.uri(), GRANULE);

        let outcome = retriever(None).retrieve(&url, &dest).await.unwrap();
        assert_eq!(outcome, RetrievalOutcome::NotModified { path: dest.clone() });
        assert_eq!(std::fs::read(&dest).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_remote_older_than_local_copy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("last-modified", "Mon, 01 Jan 2001 00:00:00 GMT")
                    .set_body_bytes(b"stale".to_vec()),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(GRANULE);
        std::fs::write(&dest, b"fresh").unwrap();
        let url = format!("{}/{}", server.uri(), GRANULE);

        let outcome = retriever(None).retrieve(&url, &dest).await.unwrap();
        assert!(matches!(outcome, RetrievalOutcome::NotModified { .. }));
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_login_page_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html><head><title>Earthdata Login</title></head></html>"),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(GRANULE);
        let url = format!("{}/{}", server.uri(), GRANULE);

        let result = retriever(None).retrieve(&url, &dest).await;
        assert!(matches!(result, Err(RetrievalError::Unauthorized { .. })));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_part_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"granule-bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        let dest = temp.path().join(GRANULE);
        std::fs::create_dir_all(dest.join("occupied")).unwrap();
        let url = format!("{}/{}", server.uri(), GRANULE);

        let result = retriever(None).retrieve(&url, &dest).await;
        assert!(matches!(result, Err(RetrievalError::Io(_))));
        assert!(!part_path(&dest).exists());
        assert!(dest.join("occupied").is_dir());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(GRANULE);
        let url = format!("{}/{}", server.uri(), GRANULE);

        let result = retriever(None).retrieve(&url, &dest).await;
        assert!(matches!(
            result,
            Err(RetrievalError::HttpStatus { status: 404, .. })
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(GRANULE);

        let result = retriever(None)
            .retrieve("http://127.0.0.1:1/x.nc", &dest)
            .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
    }
}
