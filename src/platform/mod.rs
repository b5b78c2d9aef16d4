// Remote platform access
//
// `PointCloudApi` is the seam between the workflow and the platform. The HTTP
// implementation lives in `client`; tests drive the workflow with an in-memory
// implementation instead.

pub mod client;
pub mod hashing;
pub mod types;

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

pub use client::PlatformClient;
pub use types::{
    DatasetInfo, PointCloudInfo, PointCloudUpload, ProjectInfo, ProjectType, RelatedImageInfo,
    RelatedImageLink,
};

#[async_trait]
pub trait PointCloudApi: Send + Sync {
    async fn list_projects(&self, workspace_id: u64) -> AppResult<Vec<ProjectInfo>>;

    async fn create_project(
        &self,
        workspace_id: u64,
        name: &str,
        project_type: ProjectType,
    ) -> AppResult<ProjectInfo>;

    async fn create_dataset(&self, project_id: u64, name: &str) -> AppResult<DatasetInfo>;

    /// Uploads the files and registers them in the dataset, in input order.
    async fn upload_point_clouds(
        &self,
        dataset_id: u64,
        items: &[PointCloudUpload],
    ) -> AppResult<Vec<PointCloudInfo>>;

    /// Uploads image content and returns one content hash per path.
    async fn upload_related_images(&self, paths: &[PathBuf]) -> AppResult<Vec<String>>;

    async fn add_related_images(&self, links: &[RelatedImageLink]) -> AppResult<()>;

    async fn get_point_cloud_by_id(&self, id: u64) -> AppResult<PointCloudInfo>;

    async fn list_point_clouds(&self, dataset_id: u64) -> AppResult<Vec<PointCloudInfo>>;

    async fn list_related_images(&self, point_cloud_id: u64) -> AppResult<Vec<RelatedImageInfo>>;

    async fn download_point_cloud(&self, id: u64, path: &Path) -> AppResult<()>;

    async fn download_related_image(&self, id: u64, path: &Path) -> AppResult<()>;

    async fn remove(&self, id: u64) -> AppResult<()>;

    async fn remove_batch(&self, ids: &[u64]) -> AppResult<()>;

    /// Creates a project, optionally picking a free name when `name` is taken.
    async fn create_project_checked(
        &self,
        workspace_id: u64,
        name: &str,
        project_type: ProjectType,
        change_name_if_conflict: bool,
    ) -> AppResult<ProjectInfo> {
        let name = if change_name_if_conflict {
            let existing: HashSet<String> = self
                .list_projects(workspace_id)
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect();
            let free = free_name(&existing, name);
            if free != name {
                log::info!("Project name '{}' is taken, using '{}'", name, free);
            }
            free
        } else {
            name.to_string()
        };

        self.create_project(workspace_id, &name, project_type).await
    }

    async fn upload_point_cloud(
        &self,
        dataset_id: u64,
        item: PointCloudUpload,
    ) -> AppResult<PointCloudInfo> {
        let name = item.name.clone();
        self.upload_point_clouds(dataset_id, std::slice::from_ref(&item))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("point cloud", name))
    }

    async fn upload_related_image(&self, path: &Path) -> AppResult<String> {
        self.upload_related_images(&[path.to_path_buf()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("image hash", path.display()))
    }

    async fn get_point_cloud_by_name(
        &self,
        dataset_id: u64,
        name: &str,
    ) -> AppResult<Option<PointCloudInfo>> {
        Ok(self
            .list_point_clouds(dataset_id)
            .await?
            .into_iter()
            .find(|info| info.name == name))
    }
}

/// First of `name`, `name_001`, `name_002`, ... not present in `existing`.
pub fn free_name(existing: &HashSet<String>, name: &str) -> String {
    if !existing.contains(name) {
        return name.to_string();
    }

    (1..)
        .map(|i| format!("{}_{:03}", name, i))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
