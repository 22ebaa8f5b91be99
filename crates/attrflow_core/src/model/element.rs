//! Element hierarchy node.

use super::ElementId;
use serde::{Deserialize, Serialize};

/// Node of the organizational hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub element_id: ElementId,
    pub name: String,
    /// Depth in the tree; the root is level 0.
    pub level: i64,
    /// `None` only for root elements.
    pub parent_id: Option<ElementId>,
}

impl Element {
    /// Returns whether this element is a tree root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
