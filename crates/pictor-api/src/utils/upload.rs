//! Multipart helpers for the upload handler

use axum::extract::Multipart;
use pictor_core::AppError;

/// Name of the multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

const MAX_FILENAME_LENGTH: usize = 255;

/// Extract the file bytes and client file name from the `image` field.
/// Other fields are ignored; a second `image` field is rejected.
pub async fn extract_image_field(mut multipart: Multipart) -> Result<(Vec<u8>, String), AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if file_data.is_some() {
            return Err(AppError::InvalidInput(
                "Multiple image fields are not allowed; send exactly one field named 'image'"
                    .to_string(),
            ));
        }
        filename = field.file_name().map(|s: &str| s.to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?;
        file_data = Some(data.to_vec());
    }

    let file_data = file_data.ok_or_else(|| {
        AppError::InvalidImage("No file provided in the 'image' field".to_string())
    })?;
    let filename = sanitize_filename(filename.as_deref().unwrap_or("upload"))?;

    Ok((file_data, filename))
}

/// Strip directories and unusual characters from a client file name.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    let filename_only = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if filename_only.contains("..") {
        return Err(AppError::InvalidInput(
            "Filename contains invalid path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim().is_empty() {
        return Ok("upload".to_string());
    }
    Ok(sanitized)
}
