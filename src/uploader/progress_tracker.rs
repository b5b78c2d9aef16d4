use std::path::Path;
use std::time::{Duration, Instant};

/// Phase of an upload run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    PointClouds,
    RelatedImages,
    Linking,
}

#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub session_id: String,
    pub total_items: usize,
    pub completed: usize,
    pub current_item: Option<String>,
    pub phase: Option<UploadPhase>,
    pub session_status: String, // "active", "completed", "failed"
    pub estimated_time_remaining: Option<u64>, // seconds
    started_at: Instant,
}

impl UploadProgress {
    pub fn new(total_items: usize) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            total_items,
            completed: 0,
            current_item: None,
            phase: None,
            session_status: "active".to_string(),
            estimated_time_remaining: None,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Switch to a new phase of the run
    pub fn update_phase(&mut self, phase: UploadPhase, items_in_phase: usize) {
        self.phase = Some(phase);
        log::info!(
            "[{}] {:?}: {} item(s)",
            short_id(&self.session_id),
            phase,
            items_in_phase
        );
    }

    /// Record the file currently being sent
    pub fn update_current(&mut self, file_path: &Path) {
        let filename = file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        log::debug!("Progress: currently uploading {}", filename);
        self.current_item = Some(filename);
    }

    /// Mark `count` items as done and refresh the ETA
    pub fn update_success(&mut self, count: usize) {
        self.completed = (self.completed + count).min(self.total_items);
        self.current_item = None;
        self.update_time_estimate();

        log::info!(
            "Progress: {}/{} uploaded",
            self.completed,
            self.total_items
        );
    }

    fn update_time_estimate(&mut self) {
        if self.completed == 0 {
            return;
        }

        let elapsed = self.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        let rate = self.completed as f64 / elapsed;
        let remaining = self.total_items - self.completed;
        let estimated_seconds = if rate > 0.0 {
            (remaining as f64 / rate) as u64
        } else {
            0
        };
        self.estimated_time_remaining = Some(estimated_seconds);

        if estimated_seconds > 0 {
            log::debug!(
                "ETA updated: {}m {}s (rate: {:.2} items/sec, remaining: {})",
                estimated_seconds / 60,
                estimated_seconds % 60,
                rate,
                remaining
            );
        }
    }

    pub fn mark_completed(&mut self) {
        self.session_status = "completed".to_string();
        self.estimated_time_remaining = Some(0);
        self.phase = None;

        log::info!(
            "Session {} completed: {}/{} items in {:.1}s",
            short_id(&self.session_id),
            self.completed,
            self.total_items,
            self.elapsed().as_secs_f64()
        );
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.session_status = "failed".to_string();
        self.estimated_time_remaining = Some(0);

        log::error!(
            "Session {} failed after {}/{} items: {}",
            short_id(&self.session_id),
            self.completed,
            self.total_items,
            error
        );
    }
}

fn short_id(session_id: &str) -> &str {
    &session_id[..8.min(session_id.len())]
}
