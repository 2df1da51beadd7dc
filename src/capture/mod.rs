/// HTTP capture layer and request inspection helpers
pub mod body;
pub mod layer;
pub mod shim;

pub use body::{BodyRecorder, ObservedBody};
pub use layer::{MonitorLayer, MonitorService};
