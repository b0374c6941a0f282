//! `ledgercheck-recon`: field-mapping-driven loan file reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded reference and source tables,
//! returns per-document evidence. No CLI or file IO dependencies.

pub mod compare;
pub mod config;
pub mod consistency;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod rules;
pub mod table;

pub use config::{DuplicatePolicy, EngineConfig};
pub use engine::{run, Reconciler};
pub use error::ReconError;
pub use evidence::assemble_table;
pub use model::{EvidenceCell, EvidenceToken, ReconResult, ReconSummary, RowOutcome};
pub use registry::Registry;
pub use table::Table;
