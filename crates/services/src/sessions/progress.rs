use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub percentage: u32,
    pub current_index: usize,
    pub time_remaining: u32,
    pub is_expired: bool,
}
