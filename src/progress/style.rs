//! Bar templates for the live progress display.

use indicatif::ProgressStyle;

/// Column budget the progress lines are laid out for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLayout {
    /// 90 columns or more: bar, percentage, bytes, speed and ETA.
    Wide,
    /// Between the two: percentage, speed and ETA.
    Medium,
    /// 50 columns or fewer: description and percentage only.
    Narrow,
}

impl ProgressLayout {
    /// Picks a layout for a terminal `width` columns wide.
    #[must_use]
    pub fn for_width(width: usize) -> Self {
        if width >= 90 {
            Self::Wide
        } else if width <= 50 {
            Self::Narrow
        } else {
            Self::Medium
        }
    }

    fn known_template(self) -> &'static str {
        match self {
            Self::Wide => {
                "{spinner:.green} {msg} [{bar:30.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec} eta {eta}"
            }
            Self::Medium => "{spinner:.green} {wide_msg} {percent:>3}% {bytes_per_sec} {eta}",
            Self::Narrow => "{wide_msg} {percent:>3}%",
        }
    }

    fn unknown_template(self) -> &'static str {
        match self {
            Self::Wide => "{spinner:.green} {msg} {bytes} {bytes_per_sec} eta -",
            Self::Medium => "{spinner:.green} {wide_msg} {bytes} {bytes_per_sec}",
            Self::Narrow => "{spinner} {wide_msg}",
        }
    }

    /// Style for an entry whose total size is known.
    pub(crate) fn known_style(self) -> ProgressStyle {
        ProgressStyle::with_template(self.known_template())
            .map(|style| style.progress_chars("━━╌"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    /// Style for an entry with no total yet (pulse mode).
    pub(crate) fn pulse_style(self) -> ProgressStyle {
        ProgressStyle::with_template(self.unknown_template())
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    /// Style for an entry that has not started transferring.
    pub(crate) fn waiting_style(self) -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.yellow} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}
