//! Scan-local lookup tables, rebuilt from scratch every generation.

pub mod events;
pub mod tags;

pub use events::{Event, EventIndex};
pub use tags::TagIndex;
