//! Shared infrastructure utilities for fmtlink.
//!
//! - **`atomic_write`**: crash-safe file persistence (temp + rename) and
//!   owner-only state directories.

pub mod atomic_write;

pub use atomic_write::{FileMode, atomic_write, ensure_private_dir};
