//! Filesystem and network helpers.

/// Directory moves and copies.
pub mod fs;
/// Workshop name lookups.
pub mod net;
