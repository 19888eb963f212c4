//! Requirement Sync Engine
//!
//! Reconciles a scenario's hand-authored requirement manifests with the
//! test evidence produced by its phase runs:
//! - Discovers module files from `requirements/index.json` imports
//! - Parses them leniently, preserving unknown keys in order
//! - Derives live statuses from evidence and rolls them up the child graph
//! - Validates structure (duplicate IDs, cycles, dangling refs)
//! - Writes declared statuses back in canonical form, idempotently
//! - Reports the derived state as text or JSON
//!
//! Data problems are collected as diagnostics and never abort a run. Only
//! cancellation and write-back plumbing surface as errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use reqsync_engine::{EngineConfig, SyncEngine, SyncInput};
//! use reqsync_io::OsFs;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), reqsync_engine::EngineError> {
//! let engine = SyncEngine::new(Arc::new(OsFs::new()), EngineConfig::default());
//! let outcome = engine.sync(&SyncInput::new("demo", "/scenarios/demo")).await?;
//! println!("updated {} files", outcome.files_updated.len());
//! # Ok(())
//! # }
//! ```


pub mod cancel;
pub mod canonical;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod evidence;
pub mod graph;
pub mod parser;
pub mod refs;
pub mod report;
pub mod snapshot;
pub mod summary;
pub mod sync;
pub mod validate;

pub use cancel::CancellationToken;
pub use canonical::render_module;
pub use config::{Clock, EngineConfig, FixedClock, SystemClock, CONFIG_FILE, DEFAULT_MAX_FILE_SIZE};
pub use discovery::{Discoverer, Discovery, REQUIREMENTS_DIR};
pub use engine::{PhaseInspectResult, PhaseValidation, SyncEngine, SyncInput, SyncOutcome};
pub use enrich::Enricher;
pub use error::{ConfigError, DiscoveryError, EngineError, ReportError, SyncError, SyncStage};
pub use evidence::{merge_phase_results, EvidenceLoader, LoadedEvidence};
pub use graph::{find_cycles, CycleDetected};
pub use parser::{parse_module, ParsedModule, Parser};
pub use refs::RefIndex;
pub use report::{ReportFormat, ReportOptions, Reporter};
pub use snapshot::Snapshot;
pub use summary::summarize;
pub use sync::{StatusTransition, Syncer, LOG_FILE, SNAPSHOT_FILE};
pub use validate::validate_with;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding the engine
    pub use crate::{
        CancellationToken, EngineConfig, EngineError, ReportFormat, ReportOptions, SyncEngine,
        SyncInput, SyncOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
