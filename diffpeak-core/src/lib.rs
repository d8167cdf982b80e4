//! diffpeak-core: Core types and traits for diffraction peak search.
//!
//! This crate provides the foundational abstractions for blob accumulation,
//! ellipsoid geometry, detector data access and progress reporting.
//!

pub mod aabb;
pub mod blob;
pub mod error;
pub mod frame;
pub mod peak;
pub mod progress;

mod ellipsoid;

pub use aabb::Aabb;
pub use blob::Blob3D;
pub use ellipsoid::Ellipsoid;
pub use error::{ConfigError, DataError, FinderError, Result};
pub use frame::{DataSet, Frame, FrameStack};
pub use peak::CandidatePeak;
pub use progress::{CancelFlag, ProgressMonitor, Signal};
