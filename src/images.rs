use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

const IMAGE_FETCH_CONCURRENCY: usize = 4;

/// Fetches a remote image and returns the reference it is stored under.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, anyhow::Error>;
}

/// Downloads images into a local directory.
pub struct HttpImageFetcher {
    client: Client,
    dir: PathBuf,
}

impl HttpImageFetcher {
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }
}

fn extension(content_type: Option<&str>) -> Result<&'static str, anyhow::Error> {
    let Some(ty) = content_type else {
        return Ok("jpg");
    };
    let m = mime::Mime::from_str(ty).context("Unable to parse mime type")?;
    match (m.type_(), m.subtype()) {
        (mime::IMAGE, mime::JPEG) => Ok("jpg"),
        (mime::IMAGE, mime::PNG) => Ok("png"),
        (mime::IMAGE, mime::GIF) => Ok("gif"),
        (mime::IMAGE, s) if s == "webp" => Ok("webp"),
        _ => Err(anyhow!("Mime type {m} not supported")),
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, anyhow::Error> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("Unable to get image")?;
        if res.status() != StatusCode::OK {
            return Err(anyhow!("{url}: {}", res.status()));
        }
        let ext = extension(
            res.headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|t| t.to_str().ok()),
        )?;
        let bytes = res.bytes().await.context("Unable to get response bytes")?;
        if bytes.is_empty() {
            return Err(anyhow!("{url}: empty image"));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{}.{ext}", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&name), &bytes).await?;
        Ok(name)
    }
}

/// Fetches every distinct url, skipping the ones that fail.
pub async fn resolve_images(fetcher: &dyn ImageFetcher, urls: &[String]) -> Vec<String> {
    let urls = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .unique()
        .collect::<Vec<_>>();
    futures::stream::iter(urls)
        .map(|url| async move { (url, fetcher.fetch(url).await) })
        .buffered(IMAGE_FETCH_CONCURRENCY)
        .filter_map(|(url, res)| async move {
            match res {
                Ok(r) => Some(r),
                Err(err) => {
                    log::warn!("Unable to fetch image {url}: {err}");
                    None
                }
            }
        })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ImageFetcher for Echo {
        async fn fetch(&self, url: &str) -> Result<String, anyhow::Error> {
            match url.ends_with(".jpg") {
                true => Ok(format!("stored/{url}")),
                false => Err(anyhow!("bad image")),
            }
        }
    }

    #[tokio::test]
    async fn skips_failed_and_duplicate_urls() {
        let urls = vec![
            "a.jpg".to_string(),
            " a.jpg".to_string(),
            "b.txt".to_string(),
            "".to_string(),
            "c.jpg".to_string(),
        ];
        assert_eq!(resolve_images(&Echo, &urls).await, vec!["stored/a.jpg", "stored/c.jpg"]);
    }

    #[test]
    fn maps_content_type_to_extension() {
        assert_eq!(extension(Some("image/png")).unwrap(), "png");
        assert_eq!(extension(None).unwrap(), "jpg");
        assert!(extension(Some("text/html; charset=utf-8")).is_err());
    }
}
