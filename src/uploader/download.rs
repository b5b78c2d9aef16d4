use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::platform::{PointCloudApi, RelatedImageInfo};
use crate::security::InputValidator;

/// A directory target gets the entity's own (sanitized) name appended.
fn resolve_target(target: &Path, entity_name: &str) -> PathBuf {
    if target.is_dir() {
        target.join(InputValidator::sanitize_filename(entity_name))
    } else {
        target.to_path_buf()
    }
}

pub async fn download_point_cloud(
    api: &dyn PointCloudApi,
    point_cloud_id: u64,
    target: &Path,
) -> AppResult<PathBuf> {
    let save_path = if target.is_dir() {
        let info = api.get_point_cloud_by_id(point_cloud_id).await?;
        resolve_target(target, &info.name)
    } else {
        target.to_path_buf()
    };

    api.download_point_cloud(point_cloud_id, &save_path).await?;
    log::info!(
        "Point cloud {} downloaded to {}",
        point_cloud_id,
        save_path.display()
    );
    Ok(save_path)
}

/// Download the first context image attached to a point cloud.
pub async fn download_first_related_image(
    api: &dyn PointCloudApi,
    point_cloud_id: u64,
    target: &Path,
) -> AppResult<(RelatedImageInfo, PathBuf)> {
    let image = api
        .list_related_images(point_cloud_id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("related image for point cloud", point_cloud_id))?;

    let save_path = resolve_target(target, &image.name);
    api.download_related_image(image.id, &save_path).await?;
    log::info!(
        "Context image {} ({}) downloaded to {}",
        image.name,
        image.id,
        save_path.display()
    );
    Ok((image, save_path))
}
