//! Part image uploads to object storage.
//!
//! Images are stored under a path namespaced by the owning part,
//! `<part id>/<random>.<ext>`, or under `temp/` when the part doesn't exist
//! yet. The returned public URL is what goes into the part's image list.

use std::path::Path;

use fiat_parts_core::PartId;
use tracing::instrument;

use crate::error::AdminError;
use crate::guard::Admin;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const TEMP_PREFIX: &str = "temp";

/// Namespace an uploaded image is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOwner {
    Part(PartId),
    /// Not yet attached to a saved part.
    Temp,
}

impl UploadOwner {
    fn prefix(&self) -> &str {
        match self {
            Self::Part(id) => id.as_str(),
            Self::Temp => TEMP_PREFIX,
        }
    }
}

/// Lowercased extension and MIME type for an image file name.
fn image_type(file_name: &str) -> Result<(String, &'static str), AdminError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => {
            return Err(AdminError::BadRequest(format!(
                "unsupported image type: {file_name}"
            )));
        }
    };
    Ok((ext, mime))
}

fn object_path(owner: &UploadOwner, ext: &str) -> String {
    format!("{}/{}.{ext}", owner.prefix(), uuid::Uuid::new_v4())
}

impl Admin {
    /// Upload an image and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for an empty, oversized, or
    /// non-image file, or `AdminError::Backend` if the upload fails.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_image(
        &self,
        owner: &UploadOwner,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AdminError> {
        let (ext, mime) = image_type(file_name)?;
        if bytes.is_empty() {
            return Err(AdminError::BadRequest("image file is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AdminError::BadRequest(format!(
                "image exceeds {} MB",
                MAX_IMAGE_BYTES / (1024 * 1024)
            )));
        }

        let path = object_path(owner, &ext);
        let url = self
            .client
            .upload(self.client.storage_bucket(), &path, bytes, mime)
            .await?;
        Ok(url.to_string())
    }

    /// Read an image from disk and upload it.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Io` if the file can't be read, or any error from
    /// [`Admin::upload_image`].
    pub async fn upload_image_file(
        &self,
        owner: &UploadOwner,
        path: &Path,
    ) -> Result<String, AdminError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AdminError::BadRequest(format!("not a file: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        self.upload_image(owner, file_name, bytes).await
    }

    /// Remove an uploaded image by its public URL.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for a URL outside the image bucket, or
    /// `AdminError::Backend` if the removal fails.
    #[instrument(skip(self))]
    pub async fn remove_image(&self, public_url: &str) -> Result<(), AdminError> {
        let bucket = self.client.storage_bucket();
        let path = self
            .client
            .object_path_from_url(bucket, public_url)
            .ok_or_else(|| {
                AdminError::BadRequest(format!("not an image in bucket {bucket}: {public_url}"))
            })?;
        self.client.remove_objects(bucket, &[path]).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_image_type() {
        assert_eq!(image_type("Front.JPG").unwrap(), ("jpg".to_string(), "image/jpeg"));
        assert_eq!(image_type("a.webp").unwrap().1, "image/webp");
        assert!(matches!(image_type("notes.pdf"), Err(AdminError::BadRequest(_))));
        assert!(image_type("no-extension").is_err());
    }

    #[test]
    fn test_object_path_is_namespaced() {
        let part = object_path(&UploadOwner::Part(PartId::new("p-9")), "png");
        assert!(part.starts_with("p-9/"));
        assert!(part.ends_with(".png"));

        let temp = object_path(&UploadOwner::Temp, "jpg");
        assert!(temp.starts_with("temp/"));
        assert_ne!(temp, object_path(&UploadOwner::Temp, "jpg"));
    }
}
