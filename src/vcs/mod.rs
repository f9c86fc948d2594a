//! Local version-control operations over libgit2.
//!
//! All mutation of a clone's working tree goes through [`SnapshotResolver`];
//! the history replay in [`history`] is read-only. Repositories are processed
//! strictly sequentially, so the working tree is exclusively owned by the
//! snapshot currently being collected.

pub mod clone;
pub mod history;
pub mod snapshot;

pub use clone::{ensure_clone, CloneOutcome};
pub use snapshot::SnapshotResolver;
