pub mod annotate;
pub mod config;
pub mod debounce;
pub mod dom;
pub mod extract;
pub mod pipeline;
pub mod report;
pub mod toast;
pub mod watcher;

pub use annotate::{Annotation, AnnotationEngine};
pub use config::{ConfigError, PipelineConfig};
pub use debounce::{ScanDebouncer, ScanTrigger, spawn_debounced};
pub use dom::{Document, DomError, MemoryDocument, NodeId, SharedDocument};
pub use extract::{ExclusionPolicy, LinkCandidate, LinkExtractor, ScanState};
pub use pipeline::{LinkOutcome, PassSummary, ScanPipeline, WatchHandle};
pub use toast::{ToastNotifier, ToastedUrlSet};
pub use watcher::MutationWatcher;
