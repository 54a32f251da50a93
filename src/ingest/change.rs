//! Change detection for summary embeddings.

/// Decide whether the summary embedding must be (re)computed.
///
/// - First sighting of a key: compute if the candidate text is non-empty.
/// - Known key: compute whenever the text differs from what is stored,
///   including transitions to or from empty.
/// - Known key with identical text: keep the stored embedding.
#[must_use]
pub fn needs_embedding(candidate: Option<&str>, existing: Option<&str>, had_existing_row: bool) -> bool {
    if had_existing_row {
        candidate != existing
    } else {
        candidate.is_some_and(|text| !text.trim().is_empty())
    }
}
