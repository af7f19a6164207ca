//! Expose a Shotwell photo library as a read-only filesystem of event
//! directories, with Shotwell's crop and red-eye edits applied on the way
//! out.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod index;
pub mod logging;
pub mod paths;
pub mod rescan;
pub mod scanner;
pub mod transform;
pub mod vfs;

pub use cache::DerivedAssetCache;
pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
pub use scanner::Scanner;
pub use vfs::VirtualFs;
