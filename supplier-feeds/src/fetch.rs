use async_zip::base::read::mem::ZipFileReader;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::time::Duration;
use sync_types::supplier::HttpMethod;

pub const DEFAULT_RETRIES: usize = 10;
const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// HTTP access shared by every adapter. Transient failures (connection
/// errors, timeouts, 5xx, 429) are retried up to the configured budget.
#[derive(Clone)]
pub struct Fetcher {
    client: ClientWithMiddleware,
}

impl Fetcher {
    /// `attempts` counts the first request, so `1` disables retrying.
    pub fn new(client: Client, attempts: usize) -> Self {
        let retries = u32::try_from(attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        // Equal bounds keep the wait between attempts constant.
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(RETRY_INTERVAL, RETRY_INTERVAL)
            .build_with_max_retries(retries);
        Self {
            client: ClientBuilder::new(client)
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build(),
        }
    }

    /// Downloads `url`. Zip payloads are unpacked to their first file.
    pub async fn text(&self, url: &str) -> Result<String, anyhow::Error> {
        self.request(url, HttpMethod::Get, None).await
    }

    pub async fn request(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<String, anyhow::Error> {
        let req = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let req = match body {
            Some(body) => req
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(serde_json::to_vec(body)?),
            None => req,
        };
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("HTTP {status} for {url}"));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow::anyhow!("Empty response for {url}"));
        }
        if looks_like_zip(&bytes) {
            unzip_first_text(bytes.to_vec()).await
        } else {
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes.starts_with(b"PK\x03\x04")
}

pub async fn unzip_first_text(bytes: Vec<u8>) -> Result<String, anyhow::Error> {
    let zip = ZipFileReader::new(bytes).await?;
    let entry_index = zip
        .file()
        .entries()
        .iter()
        .position(|entry| entry.dir().is_ok_and(|is_dir| !is_dir))
        .ok_or_else(|| anyhow::anyhow!("ZIP archive has no files"))?;
    let mut reader = zip.reader_with_entry(entry_index).await?;
    let mut output = String::new();
    reader.read_to_string_checked(&mut output).await?;
    Ok(output)
}
