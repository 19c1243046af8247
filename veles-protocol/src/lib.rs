//! Veles protocol types
//!
//! Pure value types shared by the chain core and its consumers:
//!
//! - **Assets**: symbol-tagged fixed-point amounts with checked arithmetic
//! - **Names/time**: validated account names, second-granularity timestamps
//! - **Operations**: the closed sum type of signed operations with static
//!   validation
//!
//! Everything here is deterministic and serialization-stable (bincode/serde);
//! no I/O, no clocks, no global state.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod asset;
pub mod error;
pub mod operations;
pub mod types;

// Re-exports
pub use asset::{Asset, Symbol, VBD, VLS};
pub use error::{Error, Result};
pub use operations::Operation;
pub use types::{AccountName, TimePointSec, PERCENT_100};
