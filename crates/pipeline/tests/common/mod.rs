#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use covergen_comfyui::{GradientSynthesizer, ImageSynthesizer, SynthesisError, SynthesisRequest};
use covergen_core::font::BlockFont;
use covergen_core::job::{GenerationJob, JobStatus, Workflow};
use covergen_core::layout::LayoutZones;
use covergen_core::request::{GenerationRequest, ImageSize};
use covergen_core::style::{StyleCatalog, StyleResolver};
use covergen_core::types::JobId;
use covergen_pipeline::{
    ArtifactStore, GenerationPipeline, GenerationService, JobRegistry, JobScheduler,
    MemoryArtifactStore, PipelineSettings, StorageError,
};
use image::RgbaImage;
use tokio::sync::Notify;

pub const WIDTH: u32 = 512;
pub const HEIGHT: u32 = 256;

pub struct Harness {
    pub service: GenerationService,
    pub registry: Arc<JobRegistry>,
    pub scheduler: Arc<JobScheduler>,
    pub memory: Arc<MemoryArtifactStore>,
}

/// Service over an in-memory store with the given synthesizer.
pub fn harness(synthesizer: Arc<dyn ImageSynthesizer>) -> Harness {
    let memory = Arc::new(MemoryArtifactStore::new());
    build(synthesizer, memory.clone(), memory, Duration::from_secs(10))
}

pub fn build(
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: Arc<dyn ArtifactStore>,
    memory: Arc<MemoryArtifactStore>,
    timeout: Duration,
) -> Harness {
    let registry = Arc::new(JobRegistry::new());
    let zones = Arc::new(LayoutZones::cover_default());
    let resolver = Arc::new(StyleResolver::new(StyleCatalog::builtin(), &zones).unwrap());
    let settings = PipelineSettings {
        timeout,
        ..Default::default()
    };
    let pipeline = Arc::new(GenerationPipeline::new(
        registry.clone(),
        synthesizer,
        store,
        resolver,
        zones,
        Arc::new(BlockFont),
        settings,
    ));
    let scheduler = Arc::new(JobScheduler::new(pipeline));
    Harness {
        service: GenerationService::new(scheduler.clone()),
        registry,
        scheduler,
        memory,
    }
}

pub fn request(workflow: Workflow) -> GenerationRequest {
    let mut request = GenerationRequest::titled("Bitcoin Reaches New High");
    request.subtitle = Some("Analysts expect further volatility".to_string());
    request.size = ImageSize {
        width: WIDTH,
        height: HEIGHT,
    };
    request.workflow = workflow;
    request.seed = Some(7);
    request
}

pub fn gradient() -> Arc<dyn ImageSynthesizer> {
    Arc::new(GradientSynthesizer::new())
}

/// Poll until the job's status satisfies `done`, failing after 5 seconds.
pub async fn wait_until(
    registry: &JobRegistry,
    job_id: JobId,
    done: impl Fn(JobStatus) -> bool,
) -> GenerationJob {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = registry.get(job_id).await.expect("job exists");
        if done(job.status) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for(registry: &JobRegistry, job_id: JobId, status: JobStatus) -> GenerationJob {
    wait_until(registry, job_id, |s| s == status || s.is_terminal()).await
}

// ---------------------------------------------------------------------------
// Test synthesizers and stores
// ---------------------------------------------------------------------------

/// Always fails.
pub struct FailingSynthesizer;

#[async_trait]
impl ImageSynthesizer for FailingSynthesizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn synthesize(&self, _: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        Err(SynthesisError::Permanent("model exploded".to_string()))
    }
}

/// Gradient synthesizer that counts its calls.
#[derive(Default)]
pub struct CountingSynthesizer {
    calls: AtomicUsize,
}

impl CountingSynthesizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSynthesizer for CountingSynthesizer {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GradientSynthesizer::render(request))
    }
}

/// Panics inside the run.
pub struct PanickingSynthesizer;

#[async_trait]
impl ImageSynthesizer for PanickingSynthesizer {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn synthesize(&self, _: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        panic!("synthesizer bug");
    }
}

/// Blocks every synthesis until [`GatedSynthesizer::open`] is called.
#[derive(Default)]
pub struct GatedSynthesizer {
    gate: Notify,
    pub entered: Notify,
}

impl GatedSynthesizer {
    pub fn open(&self) {
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl ImageSynthesizer for GatedSynthesizer {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        let opened = self.gate.notified();
        self.entered.notify_one();
        opened.await;
        Ok(GradientSynthesizer::render(request))
    }
}

/// In-memory store whose `finalize` always fails.
pub struct BrokenFinalizeStore(pub Arc<MemoryArtifactStore>);

#[async_trait]
impl ArtifactStore for BrokenFinalizeStore {
    async fn store_final(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.0.store_final(job_id, image).await
    }

    async fn store_preview(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.0.store_preview(job_id, image).await
    }

    async fn finalize(&self, _: JobId) -> Result<String, StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn cleanup_preview(&self, job_id: JobId) -> Result<(), StorageError> {
        self.0.cleanup_preview(job_id).await
    }
}
