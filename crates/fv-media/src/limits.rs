//! Acquisition policy limits.

/// Ceilings enforced while acquiring a source.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionLimits {
    /// Max source duration in seconds, checked before any transfer
    pub max_duration_secs: f64,
    /// Max downloaded file size in bytes, re-checked after transfer
    pub max_file_size_bytes: u64,
    /// Max stream height requested from the source
    pub max_resolution: u32,
}

impl Default for AcquisitionLimits {
    fn default() -> Self {
        Self {
            max_duration_secs: 300.0,
            max_file_size_bytes: 500 * 1024 * 1024,
            max_resolution: 720,
        }
    }
}

impl AcquisitionLimits {
    /// Tighten the duration ceiling with a per-job request. Never loosens it.
    pub fn with_requested_duration(mut self, requested: Option<f64>) -> Self {
        if let Some(requested) = requested.filter(|d| d.is_finite() && *d > 0.0) {
            self.max_duration_secs = self.max_duration_secs.min(requested);
        }
        self
    }

    /// yt-dlp format selector honoring the resolution cap.
    pub fn format_selector(&self) -> String {
        let h = self.max_resolution;
        format!(
            "best[height<={h}][ext=mp4]/best[height<={h}]/best[ext=mp4]/best",
            h = h
        )
    }
}

/// "20 second" / "5 minute"
pub(crate) fn describe_duration_limit(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minute", secs / 60)
    } else {
        format!("{} second", secs)
    }
}

/// "500MB"
pub(crate) fn describe_size_limit(bytes: u64) -> String {
    format!("{}MB", bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_duration_only_tightens() {
        let limits = AcquisitionLimits::default().with_requested_duration(Some(60.0));
        assert_eq!(limits.max_duration_secs, 60.0);

        let limits = AcquisitionLimits::default().with_requested_duration(Some(9000.0));
        assert_eq!(limits.max_duration_secs, 300.0);

        let limits = AcquisitionLimits::default().with_requested_duration(Some(-1.0));
        assert_eq!(limits.max_duration_secs, 300.0);
    }

    #[test]
    fn test_format_selector() {
        let limits = AcquisitionLimits::default();
        assert_eq!(
            limits.format_selector(),
            "best[height<=720][ext=mp4]/best[height<=720]/best[ext=mp4]/best"
        );
    }

    #[test]
    fn test_describe_limits() {
        assert_eq!(describe_duration_limit(20.0), "20 second");
        assert_eq!(describe_duration_limit(300.0), "5 minute");
        assert_eq!(describe_duration_limit(90.0), "90 second");
        assert_eq!(describe_size_limit(500 * 1024 * 1024), "500MB");
    }
}
