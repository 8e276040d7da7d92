//! Local override table.
//!
//! Administrator-supplied name → address mappings consulted before the
//! cache and the upstream pool. A sentinel address (`0.0.0.0` for A,
//! `::` for AAAA) marks a name as blocked. Loaded once at startup and
//! immutable afterwards; lookups take segment read locks only.

mod loader;
mod table;

pub use loader::LoadSummary;
pub use table::{OverrideDecision, OverrideTable};
