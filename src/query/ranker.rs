//! Positional match scoring.
//!
//! A query suggestion that matched a document is scored from the token
//! positions it hit: how many distinct query tokens appear inside a small
//! window, how tight that window is, and whether the tokens occur in
//! query order. The packed score also folds in the accumulated typo cost
//! and the field id, so earlier-listed fields and cheaper corrections
//! outrank later fields and costlier ones.

/// Window width (in token positions) scanned for co-occurring tokens.
pub const WINDOW_SIZE: u32 = 10;

/// Worst tracked window span; anything looser scores zero proximity.
pub const MAX_DISTANCE: u32 = 100;

/// Positional match quality of one document against one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub words_present: u32,
    pub distance: u32,
}

impl Match {
    /// Score used for empty and single-token suggestions.
    pub fn single() -> Self {
        Self {
            words_present: 1,
            distance: 0,
        }
    }

    /// Best window over per-token position lists.
    ///
    /// `token_positions[i]` holds the in-document positions of the i-th
    /// query token (within one array element). Empty lists are allowed.
    pub fn from_token_positions(token_positions: &[Vec<u16>]) -> Self {
        let mut events: Vec<(u16, usize)> = Vec::new();
        for (token_index, positions) in token_positions.iter().enumerate() {
            for &pos in positions {
                events.push((pos, token_index));
            }
        }
        if events.is_empty() {
            return Self {
                words_present: 0,
                distance: MAX_DISTANCE,
            };
        }
        events.sort_unstable();

        let mut best_words = 0u32;
        let mut best_distance = MAX_DISTANCE;

        for start in 0..events.len() {
            let window_start = events[start].0;
            let mut seen = vec![u16::MAX; token_positions.len()];

            for &(pos, token_index) in &events[start..] {
                if u32::from(pos - window_start) >= WINDOW_SIZE {
                    break;
                }
                // first occurrence of each token inside the window
                if seen[token_index] == u16::MAX {
                    seen[token_index] = pos;
                }
            }

            let words = seen.iter().filter(|&&p| p != u16::MAX).count() as u32;
            if words == 0 {
                continue;
            }

            let max_pos = seen.iter().filter(|&&p| p != u16::MAX).max().copied().unwrap();
            let span = (max_pos - window_start) as u32;

            // out-of-query-order windows take a one-step penalty
            let in_order = seen
                .iter()
                .filter(|&&p| p != u16::MAX)
                .try_fold(0u16, |prev, &p| if p >= prev { Some(p) } else { None })
                .is_some();
            let distance = (span + u32::from(!in_order)).min(MAX_DISTANCE);

            if words > best_words || (words == best_words && distance < best_distance) {
                best_words = words;
                best_distance = distance;
            }
        }

        Self {
            words_present: best_words,
            distance: best_distance,
        }
    }

    /// Pack match quality, typo cost, and field id into one orderable
    /// score: words, then typo cost, then proximity, then field id.
    pub fn score(&self, total_cost: u32, field_id: u8) -> u64 {
        let words = u64::from(self.words_present.min(255));
        let typo = u64::from(255 - total_cost.min(255));
        let proximity = u64::from(MAX_DISTANCE.saturating_sub(self.distance));
        (words << 24) | (typo << 16) | (proximity << 8) | u64::from(field_id)
    }

    /// Cross-field estimate when a field matched the tokens but its
    /// per-field ranking did not retain the document: full typo credit,
    /// zero proximity credit, actual occurrence count.
    pub fn approximate_score(words_present: u32, field_id: u8) -> u64 {
        let words = u64::from(words_present.min(255));
        (words << 24) | (255u64 << 16) | u64::from(field_id)
    }
}
