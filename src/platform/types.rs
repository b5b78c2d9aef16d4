use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    PointClouds,
    PointCloudEpisodes,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectType::PointClouds => write!(f, "point_clouds"),
            ProjectType::PointCloudEpisodes => write!(f, "point_cloud_episodes"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub workspace_id: Option<u64>,
    #[serde(default, rename = "type")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCloudInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub dataset_id: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PointCloudInfo {
    /// Episode frame number stored in the entity meta, if any.
    pub fn frame(&self) -> Option<u64> {
        self.meta.as_ref()?.get("frame")?.as_u64()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedImageInfo {
    pub id: u64,
    pub entity_id: u64,
    pub name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// One point cloud file to upload into a dataset.
#[derive(Debug, Clone)]
pub struct PointCloudUpload {
    pub name: String,
    pub path: PathBuf,
    pub meta: Option<Value>,
}

/// Links already-uploaded image content to a point cloud entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedImageLink {
    pub entity_id: u64,
    pub name: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

/// Paginated list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    #[serde(default)]
    pub pages_count: Option<u32>,
    pub entities: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_cloud_info_from_api() {
        let info: PointCloudInfo = serde_json::from_value(json!({
            "id": 17,
            "name": "000000.pcd",
            "datasetId": 3,
            "hash": "abc=",
            "meta": {"frame": 4},
            "createdAt": "2024-02-01T10:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(info.id, 17);
        assert_eq!(info.dataset_id, Some(3));
        assert_eq!(info.frame(), Some(4));
        assert!(info.created_at.is_some());
    }

    #[test]
    fn test_related_image_link_wire_format() {
        let link = RelatedImageLink {
            entity_id: 9,
            name: "000000.png".to_string(),
            hash: "h".to_string(),
            meta: json!({"deviceId": "CAM_2"}),
        };
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            json!({"entityId": 9, "name": "000000.png", "hash": "h", "meta": {"deviceId": "CAM_2"}})
        );
    }

    #[test]
    fn test_project_type_names() {
        assert_eq!(ProjectType::PointClouds.to_string(), "point_clouds");
        assert_eq!(
            serde_json::to_value(ProjectType::PointCloudEpisodes).unwrap(),
            json!("point_cloud_episodes")
        );
    }
}
