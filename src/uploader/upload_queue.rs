use serde_json::json;

use crate::composer::{PointCloudUploadRecord, RelatedImageRecord, UploadBatch};
use crate::errors::{AppError, AppResult};
use crate::platform::{PointCloudApi, PointCloudInfo, PointCloudUpload, RelatedImageLink};
use crate::security::{InputKind, InputValidator};

use super::progress_tracker::{UploadPhase, UploadProgress};

/// What a finished batch upload created on the platform
#[derive(Debug, Clone, Default)]
pub struct BatchUploadResult {
    pub point_clouds: Vec<PointCloudInfo>,
    pub related_images: Vec<RelatedImageLink>,
}

/// Upload a composed batch, tracking progress for the whole run
pub async fn process_upload_batch(
    api: &dyn PointCloudApi,
    dataset_id: u64,
    batch: &UploadBatch,
) -> AppResult<BatchUploadResult> {
    let mut progress = UploadProgress::new(batch.len() + batch.image_count());

    match upload_batch(api, dataset_id, batch, &mut progress).await {
        Ok(result) => {
            progress.mark_completed();
            Ok(result)
        }
        Err(e) => {
            progress.mark_failed(&e.to_string());
            Err(e)
        }
    }
}

/// Point clouds first, then image content, then the links between them.
/// The first failure aborts the run; nothing already uploaded is rolled back.
pub async fn upload_batch(
    api: &dyn PointCloudApi,
    dataset_id: u64,
    batch: &UploadBatch,
    progress: &mut UploadProgress,
) -> AppResult<BatchUploadResult> {
    if batch.is_empty() {
        log::warn!("Nothing to upload for dataset {}", dataset_id);
        return Ok(BatchUploadResult::default());
    }

    validate_batch(batch)?;

    progress.update_phase(UploadPhase::PointClouds, batch.len());
    let items: Vec<PointCloudUpload> = batch.iter().map(|(pcd, _)| to_upload(pcd)).collect();
    if let Some((first, _)) = batch.pairs.first() {
        progress.update_current(&first.source_path);
    }
    let point_clouds = api.upload_point_clouds(dataset_id, &items).await?;

    if point_clouds.len() != items.len() {
        return Err(AppError::unexpected_response(
            "upload_point_clouds",
            format!(
                "expected {} point clouds back, got {}",
                items.len(),
                point_clouds.len()
            ),
        ));
    }
    progress.update_success(point_clouds.len());

    // Images keep the index of the point cloud they belong to.
    let images: Vec<(usize, &RelatedImageRecord)> = batch
        .iter()
        .enumerate()
        .filter_map(|(i, (_, img))| img.as_ref().map(|img| (i, img)))
        .collect();

    if images.is_empty() {
        return Ok(BatchUploadResult {
            point_clouds,
            related_images: Vec::new(),
        });
    }

    progress.update_phase(UploadPhase::RelatedImages, images.len());
    let paths: Vec<_> = images
        .iter()
        .map(|(_, img)| img.source_path.clone())
        .collect();
    let hashes = api.upload_related_images(&paths).await?;

    if hashes.len() != images.len() {
        return Err(AppError::unexpected_response(
            "upload_related_images",
            format!("expected {} hashes, got {}", images.len(), hashes.len()),
        ));
    }

    progress.update_phase(UploadPhase::Linking, images.len());
    let links: Vec<RelatedImageLink> = images
        .iter()
        .zip(hashes)
        .map(|((i, img), hash)| link_for(point_clouds[*i].id, img, hash))
        .collect();

    api.add_related_images(&links).await?;
    progress.update_success(links.len());

    log::info!(
        "Uploaded {} point clouds and {} related images to dataset {}",
        point_clouds.len(),
        links.len(),
        dataset_id
    );

    Ok(BatchUploadResult {
        point_clouds,
        related_images: links,
    })
}

/// Upload one point cloud and its optional context image with single-item
/// calls
pub async fn upload_pair(
    api: &dyn PointCloudApi,
    dataset_id: u64,
    pcd: &PointCloudUploadRecord,
    image: Option<&RelatedImageRecord>,
) -> AppResult<(PointCloudInfo, Option<RelatedImageLink>)> {
    InputValidator::validate_entity_name(&pcd.name)?;
    InputValidator::validate_input_file(&pcd.source_path, InputKind::PointCloud)?;

    let info = api.upload_point_cloud(dataset_id, to_upload(pcd)).await?;
    log::info!(
        "Point cloud \"{}\" uploaded with ID: {}",
        info.name,
        info.id
    );

    let Some(image) = image else {
        return Ok((info, None));
    };

    InputValidator::validate_input_file(&image.source_path, InputKind::Image)?;
    let hash = api.upload_related_image(&image.source_path).await?;
    let link = link_for(info.id, image, hash);
    api.add_related_images(std::slice::from_ref(&link)).await?;
    log::info!("Context image {} attached to {}", image.image_name, info.id);

    Ok((info, Some(link)))
}

fn validate_batch(batch: &UploadBatch) -> AppResult<()> {
    for (pcd, image) in batch.iter() {
        InputValidator::validate_entity_name(&pcd.name)?;
        InputValidator::validate_input_file(&pcd.source_path, InputKind::PointCloud)?;

        if let Some(image) = image {
            InputValidator::validate_entity_name(&image.image_name)?;
            InputValidator::validate_input_file(&image.source_path, InputKind::Image)?;
        }
    }
    Ok(())
}

fn to_upload(pcd: &PointCloudUploadRecord) -> PointCloudUpload {
    PointCloudUpload {
        name: pcd.name.clone(),
        path: pcd.source_path.clone(),
        meta: pcd.frame_index.map(|frame| json!({ "frame": frame })),
    }
}

fn link_for(entity_id: u64, image: &RelatedImageRecord, hash: String) -> RelatedImageLink {
    RelatedImageLink {
        entity_id,
        name: image.image_name.clone(),
        hash,
        meta: image.metadata.clone(),
    }
}

