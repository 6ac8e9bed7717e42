//! Prune watermark computation (spec §4.9).
//!
//! Deterministic, pure logic: the maintenance loop calls this to decide how
//! far back commits may be safely deleted, then performs the actual delete
//! itself (this module does no IO).

/// Inputs to [`compute_prune_watermark`]. All timestamps are epoch millis.
#[derive(Debug, Clone, Copy)]
pub struct PruneWatermarkInput {
    /// The oldest `cursor` among all currently-active `ClientCursor` rows in
    /// the partition, if any are known.
    pub oldest_active_cursor: Option<i64>,
    pub now_ms: i64,
    pub active_window_ms: i64,
    /// Safety floor: never prune the newest N commits regardless of cursors.
    pub keep_newest_commits: i64,
    pub latest_commit_seq: i64,
    /// Used only when there are no active cursors at all.
    pub fallback_max_age_ms: i64,
}

/// Compute the commit-seq watermark below which commits may be pruned
/// (`commitSeq <= watermark` is eligible for deletion).
///
/// `watermark = min(oldestActiveClientCursor, now - activeWindowMs)` with a
/// `keepNewestCommits` safety floor, falling back to `now - fallbackMaxAgeMs`
/// when no active cursors exist. The floor always wins: the newest
/// `keep_newest_commits` commits are never eligible no matter how stale
/// every cursor is.
pub fn compute_prune_watermark(input: PruneWatermarkInput) -> i64 {
    let age_based = input.now_ms.saturating_sub(input.active_window_ms);

    let candidate = match input.oldest_active_cursor {
        Some(cursor) => cursor.min(age_based),
        None => input.now_ms.saturating_sub(input.fallback_max_age_ms),
    };

    let floor = input.latest_commit_seq - input.keep_newest_commits;
    candidate.min(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_cursor_bounds_the_watermark() {
        // Scenario F: 2000 commits, slow client cursor at 10, fast at 1900.
        let input = PruneWatermarkInput {
            oldest_active_cursor: Some(10),
            now_ms: 1_000_000,
            active_window_ms: 24 * 3_600_000,
            keep_newest_commits: 40,
            latest_commit_seq: 2000,
            fallback_max_age_ms: 7 * 24 * 3_600_000,
        };
        let watermark = compute_prune_watermark(input);
        assert!(watermark >= 10, "watermark {watermark} must not strand the slow cursor");
    }

    #[test]
    fn no_active_cursors_falls_back_to_max_age() {
        let input = PruneWatermarkInput {
            oldest_active_cursor: None,
            now_ms: 10_000_000,
            active_window_ms: 3_600_000,
            keep_newest_commits: 5,
            latest_commit_seq: 100,
            fallback_max_age_ms: 1_000_000,
        };
        let watermark = compute_prune_watermark(input);
        assert_eq!(watermark, 9_000_000.min(95));
    }

    #[test]
    fn safety_floor_always_wins() {
        let input = PruneWatermarkInput {
            oldest_active_cursor: Some(999_999),
            now_ms: 999_999,
            active_window_ms: 0,
            keep_newest_commits: 100,
            latest_commit_seq: 150,
            fallback_max_age_ms: 0,
        };
        let watermark = compute_prune_watermark(input);
        assert_eq!(watermark, 50);
    }
}
