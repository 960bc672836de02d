use serde::{Deserialize, Serialize};

/// Media kind, derived at overlay-open time and never stored back anywhere.
/// Vector assets cannot be described by the vision models behind the
/// metadata service, so they are excluded from generation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Raster,
    Vector,
}

/// What the field resolver could see of an asset when the overlay opened.
/// Empty strings mean "nothing resolved", never "absent field".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub id: String,
    pub title: String,
    pub alt_text: String,
    pub preview_url: String,
    pub kind: AssetKind,
}

impl AssetSnapshot {
    pub fn is_vector(&self) -> bool {
        self.kind == AssetKind::Vector
    }

    pub fn missing_title(&self) -> bool {
        self.title.is_empty()
    }

    pub fn missing_alt(&self) -> bool {
        self.alt_text.is_empty()
    }
}
