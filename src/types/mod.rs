//! Type definitions for lictrack

mod error;
mod sample;
mod subscription;

pub use error::*;
pub use sample::*;
pub use subscription::*;
