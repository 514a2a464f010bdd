//! Flat-file persistence for the project registry, gateway tokens,
//! gateway audit log, and per-project job stores — the four on-disk
//! surfaces `hack-daemon` owns exclusively (`SPEC_FULL.md` §4.6-4.7).
//!
//! Every store writes through [`atomic::write_atomic`] (write a sibling
//! temp file, then rename) so a reader never observes a half-written
//! file, and a crash mid-write leaves the previous version intact.

pub mod atomic;
pub mod audit;
pub mod jobstore;
pub mod registry;
pub mod tokens;

pub use audit::{AuditLog, sanitize_path};
pub use jobstore::{JobPaths, JobStore, OutputStream};
pub use registry::ProjectRegistry;
pub use tokens::TokenStore;
