//! Iterative real-time PCR primer design against NCBI Primer-BLAST.
//!
//! Each target gene is driven through a fixed ladder of progressively relaxed
//! design constraints until Primer-BLAST returns a usable, template-specific
//! primer pair or the ladder runs out. The architecture follows a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (parameter sets, the relaxation
//!   ladder, the per-target state machine, failure classification). No I/O.
//! - **[`io`]**: Side-effecting operations (the Primer-BLAST HTTP adapter,
//!   configuration, target lists, report files).
//!
//! Orchestration modules ([`controller`], [`batch`], [`design`]) combine the
//! two: one controller per target, fanned out by the batch coordinator.

pub mod batch;
pub mod controller;
pub mod core;
pub mod design;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
