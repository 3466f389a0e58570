//! Shared state for the filesystem authority server: the canonicalized
//! allow-list roots every request is checked against.

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub allowed_roots: Arc<Vec<PathBuf>>,
}

impl AppState {
    pub fn new(allowed_roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots: Arc::new(allowed_roots),
        }
    }
}
