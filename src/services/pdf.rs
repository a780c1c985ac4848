use log::{error, info};
use tokio::process::Command;
use uuid::Uuid;

use crate::config::Config;
use crate::utils::ApiError;

/// Prints `html` to an A4 PDF with headless Chrome / Chromium.
pub async fn html_to_pdf(html: &str) -> Result<Vec<u8>, ApiError> {
    let work_dir = std::env::temp_dir();
    let stem = Uuid::new_v4();
    let html_path = work_dir.join(format!("{}.html", stem));
    let pdf_path = work_dir.join(format!("{}.pdf", stem));

    tokio::fs::write(&html_path, html)
        .await
        .map_err(|e| ApiError::internal("Writing invoice html", e))?;

    let output = Command::new(Config::chrome_path())
        .arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--no-pdf-header-footer")
        .arg(format!("--print-to-pdf={}", pdf_path.display()))
        .arg(format!("file://{}", html_path.display()))
        .output()
        .await;

    let result = match output {
        Ok(out) if out.status.success() => tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| ApiError::internal("Reading rendered pdf", e)),
        Ok(out) => {
            error!(
                "Chrome exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr)
            );
            Err(ApiError::internal_error("Could not generate PDF"))
        }
        Err(e) => Err(ApiError::internal("Launching chrome", e)),
    };

    let _ = tokio::fs::remove_file(&html_path).await;
    let _ = tokio::fs::remove_file(&pdf_path).await;

    if let Ok(bytes) = &result {
        info!("Rendered pdf ({} bytes)", bytes.len());
    }
    result
}
