//! Asynchronous cover generation: job registry, pipeline stages,
//! task scheduling and the service facade used by the HTTP layer.

pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use registry::{JobEvent, JobFilter, JobPage, JobRegistry};
pub use runner::{GenerationPipeline, PipelineSettings, Stage, StageError};
pub use scheduler::JobScheduler;
pub use service::{GenerationService, ServiceError};
pub use storage::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore, StorageError};
