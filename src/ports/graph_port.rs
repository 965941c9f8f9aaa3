//! Graph document storage port trait.

use crate::domain::document::GraphDocument;
use crate::domain::error::StratflowError;

pub trait GraphStore {
    fn load(&self, name: &str) -> Result<GraphDocument, StratflowError>;

    fn save(&self, name: &str, document: &GraphDocument) -> Result<(), StratflowError>;
}
