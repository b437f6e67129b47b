//! Live preview metadata.

use serde::{Deserialize, Serialize};

/// Everything the preview pane needs to know about the running project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMetadata {
    pub preview_url: Option<String>,
    /// User-editable path within the preview, defaults to `/`
    pub preview_path: String,
    /// Bumped on every full message update to force a preview reload
    pub preview_hash: u64,
    pub file_tree: Vec<String>,
}

impl Default for PreviewMetadata {
    fn default() -> Self {
        Self {
            preview_url: None,
            preview_path: "/".to_string(),
            preview_hash: 1,
            file_tree: Vec::new(),
        }
    }
}

impl PreviewMetadata {
    /// The URL the preview should load: tunnel URL joined with the path.
    pub fn location(&self) -> Option<String> {
        let base = self.preview_url.as_deref()?;
        let base = base.trim_end_matches('/');
        let path = self.preview_path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }
}
