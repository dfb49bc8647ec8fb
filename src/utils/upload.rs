use std::{collections::HashMap, env, path::PathBuf};

use axum::body::Bytes;
use axum_extra::extract::Multipart;
use tokio::fs;
use uuid::Uuid;

use crate::error::AppError;

const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

pub struct ImageData {
    pub filename: String,
    pub data: Bytes,
}

fn upload_root() -> String {
    env::var("UPLOAD_DIR").unwrap_or_else(|_| "static/uploads".to_string())
}

/// Reads a multipart form into its text fields plus the optional `image`
/// file part.
pub async fn parse_image_multipart(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Option<ImageData>), AppError> {
    let mut fields = HashMap::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("malformed multipart body".to_string()))?
    {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        if name == "image" {
            let filename = field.file_name().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|_| AppError::Validation("could not read uploaded file".to_string()))?;
            if let Some(filename) = filename {
                if !data.is_empty() {
                    image = Some(ImageData { filename, data });
                }
            }
        } else {
            let data = field
                .bytes()
                .await
                .map_err(|_| AppError::Validation("could not read form field".to_string()))?;
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| AppError::Validation(format!("field '{name}' is not text")))?;
            if !text.is_empty() {
                fields.insert(name, text);
            }
        }
    }

    Ok((fields, image))
}

/// Writes an uploaded image under the uploads directory and returns the
/// URL path it will be served from.
pub async fn save_image(kind: &str, image: ImageData) -> Result<String, AppError> {
    let extension = PathBuf::from(&image.filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !ALLOWED_EXTENSIONS.iter().any(|e| *e == extension) {
        return Err(AppError::Validation(format!(
            "unsupported image type '.{extension}'"
        )));
    }

    let dir = PathBuf::from(upload_root()).join(kind);
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("could not create upload dir: {e}")))?;
    }

    let file_name = format!("{}.{}", Uuid::new_v4(), extension);
    let file_path = dir.join(&file_name);
    fs::write(&file_path, &image.data)
        .await
        .map_err(|e| AppError::Internal(format!("could not store upload: {e}")))?;

    Ok(format!("/{}/{}/{}", upload_root(), kind, file_name))
}

/// Best-effort removal of a stored image. Failure is logged, never
/// surfaced: the owning row is already gone.
pub async fn delete_image(url: &str) {
    let Some(path) = url.strip_prefix('/') else {
        return;
    };
    if !path.starts_with(&upload_root()) {
        return;
    }
    if let Err(e) = fs::remove_file(path).await {
        log::warn!("could not delete image file {path}: {e}");
    }
}
