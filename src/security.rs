use regex::Regex;
use std::path::Path;

use crate::errors::{AppError, AppResult};

/// Kinds of local input files the workflow consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PointCloud,
    Image,
    CameraInfo,
}

impl InputKind {
    /// Extension used when globbing the input directory.
    pub fn extension(&self) -> &'static str {
        match self {
            InputKind::PointCloud => "pcd",
            InputKind::Image => "png",
            InputKind::CameraInfo => "json",
        }
    }

    fn accepts(&self, ext: &str) -> bool {
        match self {
            InputKind::PointCloud => ext == "pcd",
            InputKind::Image => matches!(ext, "png" | "jpg" | "jpeg"),
            InputKind::CameraInfo => ext == "json",
        }
    }
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_entity_name(name: &str) -> AppResult<()> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("name", "Name cannot be empty"));
        }

        if trimmed.chars().count() > 255 {
            return Err(AppError::validation(
                "name",
                "Name too long (max 255 characters)",
            ));
        }

        if trimmed.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
            return Err(AppError::validation(
                "name",
                "Name contains control or path separator characters",
            ));
        }

        Ok(())
    }

    pub fn validate_input_file(path: &Path, kind: InputKind) -> AppResult<()> {
        match path.extension() {
            Some(extension) => {
                let ext = extension.to_string_lossy().to_lowercase();
                if !kind.accepts(&ext) {
                    return Err(AppError::invalid_file_type(path, kind.extension()));
                }
            }
            None => {
                return Err(AppError::validation(
                    "file_path",
                    "File must have an extension",
                ))
            }
        }

        if !path.exists() {
            return Err(AppError::file_not_found(path));
        }

        if !path.is_file() {
            return Err(AppError::validation("file_path", "Path is not a file"));
        }

        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let unsafe_chars = Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap();
        let sanitized = unsafe_chars.replace_all(filename.trim(), "_");

        if sanitized.chars().count() > 255 {
            sanitized.chars().take(255).collect()
        } else {
            sanitized.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_entity_names() {
        assert!(InputValidator::validate_entity_name("000001.pcd").is_ok());
        assert!(InputValidator::validate_entity_name("Point Clouds Tutorial").is_ok());
        assert!(InputValidator::validate_entity_name("   ").is_err());
        assert!(InputValidator::validate_entity_name("a/b").is_err());
        assert!(InputValidator::validate_entity_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_input_file_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let pcd = temp_dir.path().join("000000.pcd");
        let img = temp_dir.path().join("000000.JPG");
        fs::write(&pcd, b"VERSION .7").unwrap();
        fs::write(&img, b"fake").unwrap();

        assert!(InputValidator::validate_input_file(&pcd, InputKind::PointCloud).is_ok());
        assert!(InputValidator::validate_input_file(&img, InputKind::Image).is_ok());
        assert!(matches!(
            InputValidator::validate_input_file(&pcd, InputKind::Image),
            Err(AppError::InvalidFileType { .. })
        ));
    }

    #[test]
    fn test_missing_input_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");
        assert!(matches!(
            InputValidator::validate_input_file(&missing, InputKind::CameraInfo),
            Err(AppError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_sanitize_filename() {
        let safe = InputValidator::sanitize_filename(" img:0?.png ");
        assert_eq!(safe, "img_0_.png");
    }
}
