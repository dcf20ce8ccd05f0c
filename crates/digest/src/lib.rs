//! Pure digest core: note model, day-window math, grouping, and rendering.
//!
//! Nothing in this crate performs I/O.  The store, gateway, and runtime
//! crates build on these types; tests can exercise every path here without
//! a tokio runtime.

pub mod aggregate;
pub mod clock;
pub mod model;
pub mod render;

pub use aggregate::{DigestGroup, author_label, group_by_conversation, group_by_user};
pub use clock::{TimeWindow, local_timestamp_label, next_fire_time, today_bounds};
pub use model::{AnalysisResult, Note, Priority, TaskItem};
pub use render::{render, render_raw_fallback};
