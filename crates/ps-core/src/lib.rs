//! # ps-core
//!
//! Foundation types for plotstack: the binned [`Histogram`] primitive, the
//! asymmetric error band, the process [`Kind`] tag and the shared error type.
//!
//! Nothing in this crate knows about stacks or systematics; those live in
//! `ps-viz`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod band;
pub mod error;
pub mod histogram;
pub mod traits;
pub mod types;

pub use band::{AsymmetricBand, Range};
pub use error::{Error, Result};
pub use histogram::Histogram;
pub use traits::Plottable;
pub use types::{ErrorModel, Kind};

/// plotstack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
