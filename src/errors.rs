use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file type: {path}. Expected a .{expected} file.")]
    InvalidFileType { path: String, expected: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Input listings are not aligned: {point_clouds} point clouds, {images} images, {camera_infos} camera-info files"
    )]
    MismatchedListings {
        point_clouds: usize,
        images: usize,
        camera_infos: usize,
    },

    #[error("Camera-info sidecar {} is not valid JSON: {}", .path.display(), .source)]
    SidecarParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Platform API error {status} in {method}: {message}")]
    Api {
        method: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from {method}: {message}")]
    UnexpectedResponse { method: String, message: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self::FileNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn invalid_file_type(path: &Path, expected: &str) -> Self {
        Self::InvalidFileType {
            path: path.display().to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn sidecar_parse(path: &Path, source: serde_json::Error) -> Self {
        Self::SidecarParse {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn not_found(kind: &str, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn unexpected_response(method: &str, message: String) -> Self {
        Self::UnexpectedResponse {
            method: method.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_listings_message() {
        let err = AppError::MismatchedListings {
            point_clouds: 3,
            images: 2,
            camera_infos: 2,
        };
        assert_eq!(
            err.to_string(),
            "Input listings are not aligned: 3 point clouds, 2 images, 2 camera-info files"
        );
    }

    #[test]
    fn test_api_error_names_method() {
        let err = AppError::Api {
            method: "datasets.add".to_string(),
            status: 409,
            message: "name already exists".to_string(),
        };
        assert!(err.to_string().contains("datasets.add"));
    }
}
