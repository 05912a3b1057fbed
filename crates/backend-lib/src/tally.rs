// ============================
// relay-backend-lib/src/tally.rs
// ============================
//! Vote aggregation: totals and rounded percentages.

/// Sum of all option counts
pub fn total_votes(votes: &[u64]) -> u64 {
    votes.iter().sum()
}

/// Share of the total per option, rounded to the nearest whole percent.
///
/// Every entry is 0 when no votes have been cast. Recomputed from scratch on
/// each call, so the result never drifts from the counts.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentages(votes: &[u64]) -> Vec<u64> {
    let total = total_votes(votes);
    votes
        .iter()
        .map(|&count| {
            if total > 0 {
                ((count as f64 / total as f64) * 100.0).round() as u64
            } else {
                0
            }
        })
        .collect()
}
