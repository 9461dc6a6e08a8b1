//! 视口几何与可见性追踪

pub mod layout;
pub mod tracker;

pub use layout::{LayoutProvider, Rect, StaticLayout, ViewportWindow};
pub use tracker::{IntersectionEntry, ScanTrigger, ViewportTracker, VisibleUnit};
