//! JSON file graph store.

use crate::domain::document::GraphDocument;
use crate::domain::error::StratflowError;
use crate::ports::graph_port::GraphStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each graph as `<name>.json` under a base directory. A name that
/// already ends in `.json` is used as is.
pub struct JsonGraphStore {
    base_path: PathBuf,
}

impl JsonGraphStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// A store rooted at the file's directory, plus the name to load it by.
    pub fn for_file(path: &Path) -> (Self, String) {
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (Self::new(base), name)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        if name.ends_with(".json") {
            self.base_path.join(name)
        } else {
            self.base_path.join(format!("{}.json", name))
        }
    }
}

impl GraphStore for JsonGraphStore {
    fn load(&self, name: &str) -> Result<GraphDocument, StratflowError> {
        let path = self.path_for(name);
        let text = fs::read_to_string(&path)?;
        let document = GraphDocument::from_json(&text)?;
        debug!(
            path = %path.display(),
            nodes = document.nodes.len(),
            edges = document.edges.len(),
            "graph loaded"
        );
        Ok(document)
    }

    fn save(&self, name: &str, document: &GraphDocument) -> Result<(), StratflowError> {
        let path = self.path_for(name);
        fs::write(&path, document.to_json_pretty()?)?;
        debug!(path = %path.display(), "graph saved");
        Ok(())
    }
}
