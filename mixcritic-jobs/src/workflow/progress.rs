//! Progress milestones
//!
//! Progress is advisory: it moves at a few coarse points per phase. A
//! combined job scales each phase into its share of one 0-100 bar.

/// A point a phase reports when it reaches it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub percent: u8,
    pub message: &'static str,
}

const fn milestone(percent: u8, message: &'static str) -> Milestone {
    Milestone { percent, message }
}

pub const ANALYZE_UPLOADING: Milestone = milestone(10, "Uploading audio");
pub const ANALYZE_LISTENING: Milestone = milestone(40, "Listening");
pub const ANALYZE_SAVING: Milestone = milestone(90, "Saving analysis");

pub const REVIEW_PREPARING: Milestone = milestone(10, "Preparing critique");
pub const REVIEW_LISTENING: Milestone = milestone(40, "Listening");
pub const REVIEW_WRITING: Milestone = milestone(80, "Writing critique");

/// Where `analyze_and_review` stores its analysis
pub const CHECKPOINT_PERCENT: u8 = 50;
/// A retried `analyze_and_review` starts here from the saved analysis
pub const ANALYSIS_REUSED: Milestone = milestone(CHECKPOINT_PERCENT, "Using saved analysis");

pub const DONE_PERCENT: u8 = 100;
pub const DONE_MESSAGE: &str = "Done";

/// Maps a phase's 0-100 milestones into a slice of the job's bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressScale {
    offset: u8,
    span: u8,
}

impl ProgressScale {
    /// Whole bar: single-phase jobs
    pub const FULL: ProgressScale = ProgressScale { offset: 0, span: 100 };
    /// First half of `analyze_and_review`
    pub const FIRST_HALF: ProgressScale = ProgressScale { offset: 0, span: 50 };
    /// Second half of `analyze_and_review`
    pub const SECOND_HALF: ProgressScale = ProgressScale { offset: 50, span: 50 };

    pub fn apply(&self, percent: u8) -> u8 {
        let percent = u32::from(percent.min(100));
        let scaled = u32::from(self.offset) + percent * u32::from(self.span) / 100;
        scaled.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_is_identity() {
        for percent in [0, 10, 40, 90, 100] {
            assert_eq!(ProgressScale::FULL.apply(percent), percent);
        }
    }

    #[test]
    fn test_halves_form_one_continuous_bar() {
        assert_eq!(ProgressScale::FIRST_HALF.apply(ANALYZE_UPLOADING.percent), 5);
        assert_eq!(ProgressScale::FIRST_HALF.apply(ANALYZE_SAVING.percent), 45);
        assert_eq!(ProgressScale::FIRST_HALF.apply(100), CHECKPOINT_PERCENT);
        assert_eq!(ProgressScale::SECOND_HALF.apply(0), 50);
        assert_eq!(ProgressScale::SECOND_HALF.apply(REVIEW_WRITING.percent), 90);
        assert_eq!(ProgressScale::SECOND_HALF.apply(100), 100);
    }

    #[test]
    fn test_milestones_increase_within_phase() {
        assert!(ANALYZE_UPLOADING.percent < ANALYZE_LISTENING.percent);
        assert!(ANALYZE_LISTENING.percent < ANALYZE_SAVING.percent);
        assert!(REVIEW_PREPARING.percent < REVIEW_LISTENING.percent);
        assert!(REVIEW_LISTENING.percent < REVIEW_WRITING.percent);
    }
}
