//! Oblique Core
//!
//! This crate contains the shared functionality for the oblique rendering
//! pipeline: math, collections, scratch memory, logging and profiling.

pub mod alloc;
pub mod logging;
pub mod math;
pub mod profiling;
