use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewCapability {
    Zoom,
    ZoomModality,
    Continuous,
    ViewModeModality,
    TrimMargins,
}

/// A named presentation of the document that exposes tunable capabilities.
pub trait View: Send {
    fn name(&self) -> &str;

    fn supports(&self, _capability: ViewCapability) -> bool {
        false
    }

    /// Called for views supporting [`ViewCapability::Zoom`].
    fn zoom_changed(&mut self, _factor: i32) {}
}

pub type ViewHandle = Arc<Mutex<dyn View>>;
