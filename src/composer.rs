//! Builds upload batches from the local input layout.
//!
//! Three sibling directories are listed independently (`pcd/*.pcd`,
//! `img/*.png`, `cam_info/*.json`), each sorted by file name, and then paired
//! by position: the i-th point cloud goes with the i-th image and the i-th
//! camera-info sidecar.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::security::InputKind;

pub const DEFAULT_DEVICE_ID: &str = "CAM_2";

/// Whether the target collection is an unordered set or an ordered episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionMode {
    #[default]
    Plain,
    Episode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudUploadRecord {
    pub name: String,
    pub source_path: PathBuf,
    pub frame_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedImageRecord {
    pub owning_entity_name: String,
    pub image_name: String,
    pub source_path: PathBuf,
    pub metadata: Value,
}

pub type UploadPair = (PointCloudUploadRecord, Option<RelatedImageRecord>);

/// Ordered upload plan. Consumed once by the upload driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadBatch {
    pub pairs: Vec<UploadPair>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn image_count(&self) -> usize {
        self.pairs.iter().filter(|(_, img)| img.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadPair> {
        self.pairs.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub mode: CollectionMode,
    pub device_id: String,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            mode: CollectionMode::Plain,
            device_id: DEFAULT_DEVICE_ID.to_string(),
        }
    }
}

/// The three sibling input directories under one root.
#[derive(Debug, Clone)]
pub struct InputLayout {
    pub point_cloud_dir: PathBuf,
    pub image_dir: PathBuf,
    pub camera_info_dir: PathBuf,
}

/// File listings produced from an [`InputLayout`].
#[derive(Debug, Clone, Default)]
pub struct InputListings {
    pub point_clouds: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    pub camera_infos: Vec<PathBuf>,
}

impl InputLayout {
    pub fn from_root(root: &Path) -> Self {
        Self {
            point_cloud_dir: root.join("pcd"),
            image_dir: root.join("img"),
            camera_info_dir: root.join("cam_info"),
        }
    }

    pub fn list(&self) -> AppResult<InputListings> {
        Ok(InputListings {
            point_clouds: list_input_files(&self.point_cloud_dir, InputKind::PointCloud)?,
            images: list_input_files(&self.image_dir, InputKind::Image)?,
            camera_infos: list_input_files(&self.camera_info_dir, InputKind::CameraInfo)?,
        })
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Lists regular files in `dir` whose extension matches `kind`, sorted by
/// file name. A missing directory is an empty listing.
pub fn list_input_files(dir: &Path, kind: InputKind) -> AppResult<Vec<PathBuf>> {
    if !dir.exists() {
        log::debug!("Input directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let extension = kind.extension();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    log::debug!(
        "Found {} *.{} files in {}",
        files.len(),
        extension,
        dir.display()
    );
    Ok(files)
}

/// Wraps parsed camera-info JSON in the related image metadata payload.
pub fn camera_metadata(device_id: &str, sensors: Value) -> Value {
    json!({
        "deviceId": device_id,
        "sensorsData": sensors,
    })
}

pub fn compose_batch(
    point_clouds: &[PathBuf],
    images: &[PathBuf],
    camera_infos: &[PathBuf],
    options: &ComposeOptions,
) -> AppResult<UploadBatch> {
    let with_images = !(images.is_empty() && camera_infos.is_empty());

    if with_images
        && (images.len() != point_clouds.len() || camera_infos.len() != point_clouds.len())
    {
        return Err(AppError::MismatchedListings {
            point_clouds: point_clouds.len(),
            images: images.len(),
            camera_infos: camera_infos.len(),
        });
    }

    // Parse every sidecar before emitting anything so a bad file yields no batch.
    let sensors = if with_images {
        camera_infos
            .iter()
            .map(|path| read_camera_info(path))
            .collect::<AppResult<Vec<Value>>>()?
    } else {
        Vec::new()
    };

    let mut pairs = Vec::with_capacity(point_clouds.len());
    let mut sensors = sensors.into_iter();

    for (i, pcd_path) in point_clouds.iter().enumerate() {
        let record = PointCloudUploadRecord {
            name: file_name(pcd_path),
            source_path: pcd_path.clone(),
            frame_index: match options.mode {
                CollectionMode::Episode => Some(i),
                CollectionMode::Plain => None,
            },
        };

        let image = match (images.get(i), sensors.next()) {
            (Some(img_path), Some(sensor_data)) if with_images => Some(RelatedImageRecord {
                owning_entity_name: record.name.clone(),
                image_name: file_name(img_path),
                source_path: img_path.clone(),
                metadata: camera_metadata(&options.device_id, sensor_data),
            }),
            _ => None,
        };

        pairs.push((record, image));
    }

    log::info!(
        "Composed upload batch: {} point clouds, {} related images ({:?} mode)",
        pairs.len(),
        pairs.iter().filter(|(_, img)| img.is_some()).count(),
        options.mode
    );

    Ok(UploadBatch { pairs })
}

/// Lists the layout and composes in one step.
pub fn compose_from_layout(
    layout: &InputLayout,
    options: &ComposeOptions,
) -> AppResult<UploadBatch> {
    let listings = layout.list()?;
    compose_batch(
        &listings.point_clouds,
        &listings.images,
        &listings.camera_infos,
        options,
    )
}

fn read_camera_info(path: &Path) -> AppResult<Value> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| AppError::sidecar_parse(path, e))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_frames(root: &Path, count: usize) -> InputLayout {
        let layout = InputLayout::from_root(root);
        fs::create_dir_all(&layout.point_cloud_dir).unwrap();
        fs::create_dir_all(&layout.image_dir).unwrap();
        fs::create_dir_all(&layout.camera_info_dir).unwrap();

        for i in 0..count {
            fs::write(
                layout.point_cloud_dir.join(format!("{:06}.pcd", i)),
                b"VERSION .7",
            )
            .unwrap();
            fs::write(layout.image_dir.join(format!("{:06}.png", i)), b"png").unwrap();
            fs::write(
                layout.camera_info_dir.join(format!("{:06}.json", i)),
                format!(r#"{{"frame": {}}}"#, i),
            )
            .unwrap();
        }
        layout
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_alignment() {
        let temp_dir = TempDir::new().unwrap();
        let layout = write_frames(temp_dir.path(), 3);

        let batch = compose_from_layout(&layout, &ComposeOptions::default()).unwrap();

        assert_eq!(batch.len(), 3);
        for (i, (pcd, img)) in batch.iter().enumerate() {
            assert_eq!(pcd.name, format!("{:06}.pcd", i));
            let img = img.as_ref().unwrap();
            assert_eq!(img.image_name, format!("{:06}.png", i));
            assert_eq!(img.owning_entity_name, pcd.name);
            assert_eq!(img.metadata["sensorsData"]["frame"], i);
        }
    }

    #[test]
    fn test_frame_indexing() {
        let temp_dir = TempDir::new().unwrap();
        let layout = write_frames(temp_dir.path(), 4);

        let episode = ComposeOptions {
            mode: CollectionMode::Episode,
            ..Default::default()
        };
        let batch = compose_from_layout(&layout, &episode).unwrap();
        for (i, (pcd, _)) in batch.iter().enumerate() {
            assert_eq!(pcd.frame_index, Some(i));
        }

        let plain = compose_from_layout(&layout, &ComposeOptions::default()).unwrap();
        assert!(plain.iter().all(|(pcd, _)| pcd.frame_index.is_none()));
    }

    #[test]
    fn test_metadata_shape() {
        let temp_dir = TempDir::new().unwrap();
        let layout = write_frames(temp_dir.path(), 1);
        fs::write(layout.camera_info_dir.join("000000.json"), r#"{"k": "v"}"#).unwrap();

        let batch = compose_from_layout(&layout, &ComposeOptions::default()).unwrap();
        let metadata = &batch.pairs[0].1.as_ref().unwrap().metadata;

        assert_eq!(
            serde_json::to_string(metadata).unwrap(),
            r#"{"deviceId":"CAM_2","sensorsData":{"k":"v"}}"#
        );
    }

    #[test]
    fn test_empty_input() {
        let batch = compose_batch(&[], &[], &[], &ComposeOptions::default()).unwrap();
        assert!(batch.is_empty());

        let temp_dir = TempDir::new().unwrap();
        let layout = InputLayout::from_root(temp_dir.path());
        assert!(compose_from_layout(&layout, &ComposeOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mismatched_lengths_fail_fast() {
        let result = compose_batch(
            &paths(&["a.pcd", "b.pcd"]),
            &paths(&["a.png"]),
            &paths(&["a.json"]),
            &ComposeOptions::default(),
        );
        assert!(matches!(
            result,
            Err(AppError::MismatchedListings {
                point_clouds: 2,
                images: 1,
                camera_infos: 1
            })
        ));

        let result = compose_batch(
            &paths(&["a.pcd"]),
            &paths(&["a.png"]),
            &[],
            &ComposeOptions::default(),
        );
        assert!(matches!(result, Err(AppError::MismatchedListings { .. })));
    }

    #[test]
    fn test_point_clouds_without_images() {
        let batch = compose_batch(
            &paths(&["a.pcd", "b.pcd"]),
            &[],
            &[],
            &ComposeOptions::default(),
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.image_count(), 0);
    }

    #[test]
    fn test_malformed_sidecar_yields_no_batch() {
        let temp_dir = TempDir::new().unwrap();
        let layout = write_frames(temp_dir.path(), 3);
        fs::write(layout.camera_info_dir.join("000002.json"), "{not json").unwrap();

        let result = compose_from_layout(&layout, &ComposeOptions::default());
        assert!(matches!(result, Err(AppError::SidecarParse { .. })));
    }

    #[test]
    fn test_listing_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in ["000002.pcd", "000000.pcd", "000001.PCD", "notes.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::create_dir(dir.join("nested.pcd")).unwrap();

        let files = list_input_files(dir, InputKind::PointCloud).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["000000.pcd", "000001.PCD", "000002.pcd"]);
    }

    #[test]
    fn test_unreadable_listing_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let layout = write_frames(temp_dir.path(), 2);

        // A file where the image directory should be cannot be listed.
        fs::remove_dir_all(&layout.image_dir).unwrap();
        fs::write(&layout.image_dir, b"not a directory").unwrap();

        assert!(matches!(
            list_input_files(&layout.image_dir, InputKind::Image),
            Err(AppError::Io(_))
        ));
        assert!(matches!(
            compose_from_layout(&layout, &ComposeOptions::default()),
            Err(AppError::Io(_))
        ));
    }
}
