pub mod diagnostics;
pub mod event;
pub mod graph;
pub mod memory;
pub mod session;

pub use diagnostics::{AnalysisDiff, DiagnosticFinding, DiagnosticRun, RunStatus, Severity};
pub use event::{Checkpoint, Event, EventType, IndexedFacets};
pub use graph::{
    EntityType, EntityVersion, GraphEntity, GraphRelationship, Properties, RelationshipType,
    VersionInfo,
};
pub use memory::{
    Embedding, Memory, MemoryPatch, MemoryStats, Metadata, Priority, Privacy, RecallQuery,
    SaveOptions, SortOrder,
};
pub use session::{Session, SessionFilter, SessionStatus};
