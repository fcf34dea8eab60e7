//! Operator trigger surface.
//!
//! Full recomputation is driven by a plain text command. Authorization
//! (operator identity, channel scope) is checked by the engine; this
//! module only recognizes the command forms.

/// Which flavor of full recomputation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeMode {
    /// Re-derive counts; skip the board-copy edit for rows whose live
    /// count already equals the stored count.
    Recount,
    /// Re-derive counts and re-render every surviving row.
    Redo,
}

/// Parse `content` against the configured prefix. Returns `None` for
/// anything that is not exactly a recognized command form.
pub fn parse(content: &str, prefix: &str) -> Option<RecomputeMode> {
    let rest = content.trim().strip_prefix(prefix)?;
    // The prefix must be a whole word, not a prefix of one.
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    match rest.trim() {
        "recount" => Some(RecomputeMode::Recount),
        "redo" => Some(RecomputeMode::Redo),
        _ => None,
    }
}
