//! Mapping remote stage progress onto overall job progress
//!
//! Stages share the 0..85 range evenly; 85..100 is reserved for packaging
//! the final artifact. Within its window a stage's remote 0-100 progress is
//! scaled linearly, so overall progress never moves backwards as stages
//! advance.

/// Portion of the 0-100 job range covered by the stages themselves.
pub const STAGE_BUDGET: u8 = 85;

/// Half-open slice of overall job progress owned by one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressWindow {
    pub start: u8,
    pub end: u8,
}

impl ProgressWindow {
    /// Scales a remote task's 0-100 progress into this window
    pub fn map(&self, remote: u8) -> u8 {
        let span = u32::from(self.end - self.start);
        let remote = u32::from(remote.min(100));
        self.start + (remote * span / 100) as u8
    }
}

/// Window of the stage at `index` in a pipeline of `total` stages
///
/// `total` must be nonzero; pipelines without stages are rejected before
/// execution starts.
pub fn stage_window(index: usize, total: usize) -> ProgressWindow {
    let budget = usize::from(STAGE_BUDGET);
    ProgressWindow {
        start: (index * budget / total) as u8,
        end: ((index + 1) * budget / total) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_tile_the_stage_budget() {
        let windows: Vec<ProgressWindow> = (0..3).map(|i| stage_window(i, 3)).collect();
        assert_eq!(windows[0], ProgressWindow { start: 0, end: 28 });
        assert_eq!(windows[1], ProgressWindow { start: 28, end: 56 });
        assert_eq!(windows[2], ProgressWindow { start: 56, end: 85 });
    }

    #[test]
    fn test_single_stage_owns_the_whole_budget() {
        assert_eq!(stage_window(0, 1), ProgressWindow { start: 0, end: 85 });
    }

    #[test]
    fn test_map_scales_linearly_within_the_window() {
        let window = stage_window(0, 1);
        assert_eq!(window.map(0), 0);
        assert_eq!(window.map(50), 42);
        assert_eq!(window.map(100), 85);

        let second = stage_window(1, 3);
        assert_eq!(second.map(0), 28);
        assert_eq!(second.map(100), 56);
    }

    #[test]
    fn test_map_clamps_runaway_remote_progress() {
        let window = stage_window(0, 2);
        assert_eq!(window.map(250), window.end);
    }
}
