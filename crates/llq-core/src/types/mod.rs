//! Core data types flowing through the pipeline.
//!
//! [`Trade`] stores its instrument as an inline [`Symbol`], so a record owns
//! no heap memory and moving it through a channel slot is a plain copy.

pub mod symbol;
pub mod trade;

pub use symbol::*;
pub use trade::*;
