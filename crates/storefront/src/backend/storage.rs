//! Object storage: upload, remove, and public URLs.

use reqwest::Method;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use super::{BackendClient, BackendError};

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

/// Percent-encode each segment of an object path, keeping the `/` separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl BackendClient {
    /// Upload an object and return its public URL.
    ///
    /// Fails if an object already exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the upload is rejected or fails in transit.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Url, BackendError> {
        let url = self.endpoint(&format!(
            "storage/v1/object/{}/{}",
            urlencoding::encode(bucket),
            encode_path(path)
        ))?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.execute(request).await?;

        tracing::info!(bucket = %bucket, path = %path, "Uploaded object");
        self.public_url(bucket, path)
    }

    /// Delete objects by path.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the removal is rejected or fails in transit.
    #[instrument(skip(self))]
    pub async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&format!(
            "storage/v1/object/{}",
            urlencoding::encode(bucket)
        ))?;
        let request = self
            .request(Method::DELETE, url)
            .await
            .json(&RemoveRequest { prefixes: paths });
        self.execute(request).await.map(drop)
    }

    /// Public URL of an object in a public bucket.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidUrl` if the URL cannot be built.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!(
            "storage/v1/object/public/{}/{}",
            urlencoding::encode(bucket),
            encode_path(path)
        ))
    }

    /// Object path inside `bucket` for one of its public URLs.
    ///
    /// Returns `None` for URLs that don't point into the bucket.
    #[must_use]
    pub fn object_path_from_url(&self, bucket: &str, public_url: &str) -> Option<String> {
        let url = Url::parse(public_url).ok()?;
        if url.origin() != self.inner.base_url.origin() {
            return None;
        }
        let prefix = format!(
            "{}storage/v1/object/public/{}/",
            self.inner.base_url.path(),
            urlencoding::encode(bucket)
        );
        let encoded = url.path().strip_prefix(&prefix)?;
        let decoded = encoded
            .split('/')
            .map(|segment| urlencoding::decode(segment).map(std::borrow::Cow::into_owned))
            .collect::<Result<Vec<_>, _>>()
            .ok()?
            .join("/");
        (!decoded.is_empty()).then_some(decoded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::config::BackendConfig;
    use crate::local_store::MemoryStore;

    fn client(base: &str) -> BackendClient {
        let config = BackendConfig {
            url: Url::parse(base).unwrap(),
            anon_key: SecretString::from("k3y-f0r-t3sts"),
            storage_bucket: "part-images".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        BackendClient::new(&config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("p-1/front view.jpg"), "p-1/front%20view.jpg");
        assert_eq!(encode_path("/temp//a.png"), "temp/a.png");
    }

    #[test]
    fn test_public_url() {
        let client = client("https://parts.backend.test");
        let url = client.public_url("part-images", "p-1/a b.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://parts.backend.test/storage/v1/object/public/part-images/p-1/a%20b.jpg"
        );
    }

    #[test]
    fn test_public_url_under_base_path() {
        let client = client("https://gateway.test/project");
        let url = client.public_url("part-images", "temp/x.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://gateway.test/project/storage/v1/object/public/part-images/temp/x.png"
        );
    }

    #[test]
    fn test_object_path_from_url() {
        let client = client("https://parts.backend.test");
        let url = client.public_url("part-images", "p-1/a b.jpg").unwrap();
        assert_eq!(
            client.object_path_from_url("part-images", url.as_str()).as_deref(),
            Some("p-1/a b.jpg")
        );
        assert_eq!(
            client.object_path_from_url("other-bucket", url.as_str()),
            None
        );
        assert_eq!(
            client.object_path_from_url("part-images", "https://elsewhere.test/storage/v1/object/public/part-images/a.jpg"),
            None
        );
    }
}
