use crate::JobConfiguration;

/// Weight contributed by one enabled fetch category.
pub const CATEGORY_SHARE: f64 = 15.0;
/// Weight contributed by archive generation itself.
pub const ARCHIVE_SHARE: f64 = 10.0;

/// Weighted progress for one job. Mutated only by the job orchestrator.
///
/// Each enabled category owns a fixed share of the total; a category's share
/// is earned as its retrievals complete, so the percentage is monotonic and
/// deterministic regardless of task completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    completed_weight: f64,
    total_weight: f64,
    errors: Vec<String>,
    done: bool,
}

impl ProgressState {
    /// Total weight derived from the enabled categories plus the final
    /// archive-generation share.
    pub fn for_config(config: &JobConfiguration) -> Self {
        let categories = [
            config.capture_styles,
            config.capture_scripts,
            config.capture_images,
            config.capture_fonts,
            config.capture_video,
            config.capture_audio,
            config.multi_page,
        ];
        let total = categories.iter().filter(|enabled| **enabled).count() as f64 * CATEGORY_SHARE
            + ARCHIVE_SHARE;
        Self {
            completed_weight: 0.0,
            total_weight: total,
            errors: Vec::new(),
            done: false,
        }
    }

    pub fn add_weight(&mut self, weight: f64) {
        self.completed_weight = (self.completed_weight + weight).min(self.total_weight);
    }

    /// Credits the archive-generation share and marks the job done.
    pub fn complete_archive(&mut self) {
        self.completed_weight = self.total_weight;
        self.done = true;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn percent(&self) -> u8 {
        if self.total_weight <= 0.0 {
            return 0;
        }
        ((self.completed_weight / self.total_weight) * 100.0).round() as u8
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn done(&self) -> bool {
        self.done
    }
}
