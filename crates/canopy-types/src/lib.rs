//! Foundation types for Canopy.
//!
//! This crate provides the value types shared by every other Canopy crate:
//!
//! - [`Hash`] — content-addressed identifier (BLAKE3 digest, with
//!   key-derivation contexts for kinded hashing)
//! - [`Path`] — ordered sequence of name steps addressing into a tree
//! - [`CommitInfo`] — author/message/timestamp metadata attached to commits

pub mod error;
pub mod hash;
pub mod info;
pub mod path;

pub use error::TypeError;
pub use hash::Hash;
pub use info::CommitInfo;
pub use path::Path;
