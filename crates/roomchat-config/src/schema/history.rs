use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Messages requested per page, both for the first load and older pages.
    pub page_size: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}
