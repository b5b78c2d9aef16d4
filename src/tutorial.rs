//! End-to-end walkthrough: create a project and dataset, upload point clouds
//! with their context images, read them back, and download the first frame.

use std::path::PathBuf;

use crate::composer::{
    compose_from_layout, CollectionMode, ComposeOptions, InputLayout, UploadBatch,
};
use crate::errors::{AppError, AppResult};
use crate::platform::{DatasetInfo, PointCloudApi, ProjectInfo, ProjectType};
use crate::uploader::{
    download_first_related_image, download_point_cloud, process_upload_batch, upload_pair,
};

pub const DEFAULT_PROJECT_NAME: &str = "Point Clouds Tutorial";
pub const DEFAULT_EPISODES_PROJECT_NAME: &str = "Point Cloud Episodes Tutorial";
pub const DEFAULT_DATASET_NAME: &str = "dataset_1";

#[derive(Debug, Clone)]
pub struct TutorialOptions {
    pub workspace_id: u64,
    pub project_name: String,
    pub dataset_name: String,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub compose: ComposeOptions,
    /// Also remove the uploaded point clouds at the end
    pub cleanup: bool,
}

impl TutorialOptions {
    pub fn new(
        workspace_id: u64,
        input_root: PathBuf,
        output_root: PathBuf,
        mode: CollectionMode,
    ) -> Self {
        let project_name = match mode {
            CollectionMode::Plain => DEFAULT_PROJECT_NAME,
            CollectionMode::Episode => DEFAULT_EPISODES_PROJECT_NAME,
        };

        Self {
            workspace_id,
            project_name: project_name.to_string(),
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            input_root,
            output_root,
            compose: ComposeOptions {
                mode,
                ..Default::default()
            },
            cleanup: false,
        }
    }

    pub fn point_cloud_output(&self) -> PathBuf {
        self.output_root.join("pcd_0.pcd")
    }

    pub fn image_output(&self) -> PathBuf {
        self.output_root.join("img_0.png")
    }
}

#[derive(Debug, Clone)]
pub struct TutorialReport {
    pub project: ProjectInfo,
    pub dataset: DatasetInfo,
    pub uploaded_point_clouds: usize,
    pub uploaded_images: usize,
    pub dataset_point_clouds: usize,
    pub first_point_cloud_id: u64,
    pub related_images_of_first: usize,
    pub point_cloud_path: PathBuf,
    pub image_path: Option<PathBuf>,
    pub removed: usize,
}

pub fn project_type_for(mode: CollectionMode) -> ProjectType {
    match mode {
        CollectionMode::Plain => ProjectType::PointClouds,
        CollectionMode::Episode => ProjectType::PointCloudEpisodes,
    }
}

pub async fn run_tutorial(
    api: &dyn PointCloudApi,
    options: &TutorialOptions,
) -> AppResult<TutorialReport> {
    // Compose first so bad input fails before anything is created remotely.
    let layout = InputLayout::from_root(&options.input_root);
    let batch = compose_from_layout(&layout, &options.compose)?;
    if batch.is_empty() {
        return Err(AppError::validation(
            "input",
            &format!("No point clouds found in {}", layout.point_cloud_dir.display()),
        ));
    }

    let project = api
        .create_project_checked(
            options.workspace_id,
            &options.project_name,
            project_type_for(options.compose.mode),
            true,
        )
        .await?;
    log::info!("Project ID: {}", project.id);

    let dataset = api.create_dataset(project.id, &options.dataset_name).await?;
    log::info!("Dataset ID: {}", dataset.id);

    // First frame on its own, the rest as one batch.
    let mut pairs = batch.pairs.into_iter();
    let (first_pcd, first_image) = pairs
        .next()
        .ok_or_else(|| AppError::validation("input", "empty batch"))?;
    let (first_info, first_link) =
        upload_pair(api, dataset.id, &first_pcd, first_image.as_ref()).await?;

    let rest = UploadBatch {
        pairs: pairs.collect(),
    };
    let rest_result = process_upload_batch(api, dataset.id, &rest).await?;
    log::info!(
        "Batch uploading has finished: {} point clouds",
        rest_result.point_clouds.len()
    );

    let by_name = api
        .get_point_cloud_by_name(dataset.id, &first_pcd.name)
        .await?
        .ok_or_else(|| AppError::not_found("point cloud", &first_pcd.name))?;
    let by_id = api.get_point_cloud_by_id(by_name.id).await?;
    log::info!("Point cloud name: {}", by_id.name);

    let related = api.list_related_images(by_id.id).await?;
    if let Some(image) = related.first() {
        log::info!("First context image: {} ({})", image.name, image.id);
    }

    let listed = api.list_point_clouds(dataset.id).await?;
    log::info!("Dataset contains {} point clouds", listed.len());

    let point_cloud_path =
        download_point_cloud(api, by_id.id, &options.point_cloud_output()).await?;

    let downloaded_image = if related.is_empty() {
        None
    } else {
        Some(download_first_related_image(api, by_id.id, &options.image_output()).await?)
    };

    let mut removed = 0;
    if let Some((image, _)) = &downloaded_image {
        api.remove(image.id).await?;
        removed += 1;
        log::info!("Context image {} removed", image.id);
    }
    if options.cleanup {
        let mut ids = vec![first_info.id];
        ids.extend(rest_result.point_clouds.iter().map(|info| info.id));
        api.remove_batch(&ids).await?;
        removed += ids.len();
        log::info!("Removed {} point clouds", ids.len());
    }

    Ok(TutorialReport {
        project,
        dataset,
        uploaded_point_clouds: 1 + rest_result.point_clouds.len(),
        uploaded_images: usize::from(first_link.is_some()) + rest_result.related_images.len(),
        dataset_point_clouds: listed.len(),
        first_point_cloud_id: by_id.id,
        related_images_of_first: related.len(),
        point_cloud_path,
        image_path: downloaded_image.map(|(_, path)| path),
        removed,
    })
}
