// Upload/download driver
//
// Turns composed batches into platform calls, one step after another.

pub mod download;
pub mod progress_tracker;
pub mod upload_queue;

pub use download::{download_first_related_image, download_point_cloud};
pub use progress_tracker::UploadProgress;
pub use upload_queue::{process_upload_batch, upload_pair, BatchUploadResult};
