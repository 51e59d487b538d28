pub mod categorizer;
pub mod gateway;
pub mod pipeline;
pub mod runtime;
pub mod sources;

pub use categorizer::{CategoryAssigner, CategoryClassifier, CategoryDecision};
pub use gateway::{ClassifierGateway, TagClassifier};
pub use pipeline::{IngestStats, Ingestor};
pub use sources::{FetchWindow, HostContext, NormalizedEvent, RawEventPayload, SourceAdapter};
