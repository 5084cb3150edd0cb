//! Patch Engine
//!
//! Pure, stateless computation and application of unified-diff patches.
//! `diff` produces a patch from two texts; `apply` replays a patch against
//! a text with strict context matching and a typed failure when the target
//! has drifted. No I/O happens in this module.

pub mod apply;
pub mod diff;

pub use apply::{apply, PatchError};
pub use diff::diff;
