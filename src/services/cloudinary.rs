use log::{error, info};
use reqwest::multipart;
use rocket::fs::TempFile;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::utils::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    /// PDFs and other non-media files.
    Raw,
}

impl ResourceType {
    fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Raw => "raw",
        }
    }
}

pub struct CloudinaryService {
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryService {
    pub fn from_config() -> Result<Self, ApiError> {
        match (
            Config::cloudinary_cloud_name(),
            Config::cloudinary_api_key(),
            Config::cloudinary_api_secret(),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Ok(Self {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => Err(ApiError::internal("Cloudinary", "credentials are not configured")),
        }
    }

    /// Folder below the configured root, e.g. `driveeasy/cars`.
    pub fn folder(child: &str) -> String {
        format!("{}/{}", Config::cloudinary_folder(), child)
    }

    /// Signature over the alphabetically sorted upload params followed by the secret.
    pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        hex::encode(Sha256::digest(format!("{}{}", joined, api_secret).as_bytes()))
    }

    /// Signed upload; returns the secure URL.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        file_name: &str,
        resource_type: ResourceType,
        folder: &str,
        public_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params = vec![("folder", folder), ("timestamp", timestamp.as_str())];
        if let Some(pid) = public_id {
            params.push(("public_id", pid));
        }
        let signature = Self::sign(&params, &self.api_secret);

        let mut form = multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .text("folder", folder.to_string())
            .part("file", multipart::Part::bytes(data).file_name(file_name.to_string()));

        if let Some(pid) = public_id {
            form = form.text("public_id", pid.to_string());
        }

        let upload_url = format!(
            "https://api.cloudinary.com/v1_1/{}/{}/upload",
            self.cloud_name,
            resource_type.as_str()
        );

        let response = reqwest::Client::new()
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::internal("Cloudinary upload failed", e))?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| ApiError::internal("Cloudinary response", e))?;

        if let Some(err) = result.get("error") {
            error!("Cloudinary rejected {}: {}", file_name, err["message"]);
            return Err(ApiError::internal_error("File upload failed"));
        }

        let secure_url = result["secure_url"]
            .as_str()
            .ok_or_else(|| ApiError::internal("Cloudinary response", "no secure_url"))?
            .to_string();

        info!("Uploaded {} to {}", file_name, secure_url);
        Ok(secure_url)
    }

    /// Uploads a multipart image field into `folder`.
    pub async fn upload_temp_file(&self, file: &TempFile<'_>, folder: &str) -> Result<String, ApiError> {
        let file_name = file
            .raw_name()
            .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
            .unwrap_or_else(|| "upload".to_string());

        if let Some(content_type) = file.content_type() {
            if !content_type.top().as_str().eq_ignore_ascii_case("image") {
                return Err(ApiError::bad_request(format!("{} is not an image", file_name)));
            }
        }

        let mut data = Vec::with_capacity(file.len() as usize);
        let mut reader = Box::pin(
            file.open()
                .await
                .map_err(|e| ApiError::internal("Reading upload", e))?,
        );
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| ApiError::internal("Reading upload", e))?;

        self.upload(data, &file_name, ResourceType::Image, folder, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_params() {
        let a = CloudinaryService::sign(&[("timestamp", "1700000000"), ("folder", "x/invoices")], "sec");
        let b = CloudinaryService::sign(&[("folder", "x/invoices"), ("timestamp", "1700000000")], "sec");
        assert_eq!(a, b);
        assert_eq!(
            a,
            hex::encode(Sha256::digest(b"folder=x/invoices&timestamp=1700000000sec"))
        );
    }
}
