//! Upload point clouds, their related context images and per-frame sensor
//! metadata to a point cloud annotation platform.
//!
//! The crate is a thin workflow around the platform's REST API:
//! - [`composer`] pairs local point cloud, image and camera-info files into an upload plan
//! - [`platform`] is the remote client, behind the [`platform::PointCloudApi`] trait
//! - [`uploader`] sequences a plan into platform calls and downloads files back
//! - [`tutorial`] runs the complete create/upload/read/download walkthrough

pub mod cli;
pub mod composer;
pub mod config;
pub mod errors;
pub mod platform;
pub mod security;
pub mod tutorial;
pub mod uploader;

pub use composer::{
    compose_batch, CollectionMode, ComposeOptions, PointCloudUploadRecord, RelatedImageRecord,
    UploadBatch,
};
pub use errors::{AppError, AppResult};
