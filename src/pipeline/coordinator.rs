use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ConversionConfig, PipelineConfig};
use crate::engine::EngineHandle;
use crate::error::{ConversionError, EngineError, PipelineError};
use crate::media::{MediaAsset, MediaKind, Options, TargetContainer};
use crate::pipeline::artifacts::{INPUT_IMAGE, INPUT_VIDEO, INTERMEDIATES, RUN_ARTIFACTS};
use crate::pipeline::{
    ConcatStage, ContainerConverter, EncodePlan, FrameSynthesisStage, ProbeStage, PublishedOutput,
    RunState, RunStatus, TrimStage,
};

/// Called with a published output once a newer run starts or it is cleared
pub type ReleaseHook = Box<dyn Fn(&PublishedOutput) + Send + Sync>;

/// Orchestrates frame-replacement runs against one engine
///
/// The coordinator follows a fixed pipeline:
/// 1. Staging - clear the previous run's artifacts and write both inputs
/// 2. Probe - resolve even output dimensions
/// 3. Frame Synthesis - encode the replacement-frame clip
/// 4. Trim - cut the remainder, copying or re-encoding per the encode plan
/// 5. Concat - splice the segments and read the result back
///
/// Every run gets a run id when it is requested. Runs queue behind each other on the
/// engine's workspace lock; a run that has been superseded by a newer request stops
/// at its next stage boundary and never reports state or publishes. A run that gets
/// past the lock as the latest request retires the published output before staging,
/// whether it goes on to succeed or fail.
pub struct PipelineCoordinator {
    engine: Arc<EngineHandle>,
    config: PipelineConfig,
    conversion: ConversionConfig,
    generation: AtomicU64,
    status: watch::Sender<RunStatus>,
    published: watch::Sender<Option<Arc<PublishedOutput>>>,
    release_hook: Option<ReleaseHook>,
}

impl PipelineCoordinator {
    pub fn new(engine: Arc<EngineHandle>, config: PipelineConfig) -> Self {
        let (status, _) = watch::channel(RunStatus::default());
        let (published, _) = watch::channel(None);
        Self {
            engine,
            config,
            conversion: ConversionConfig::default(),
            generation: AtomicU64::new(0),
            status,
            published,
            release_hook: None,
        }
    }

    pub fn with_conversion(mut self, conversion: ConversionConfig) -> Self {
        self.conversion = conversion;
        self
    }

    /// Register a hook that releases outputs retired by newer runs
    pub fn with_release_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PublishedOutput) + Send + Sync + 'static,
    {
        self.release_hook = Some(Box::new(hook));
        self
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    /// Load the engine, reporting failure as a pipeline error
    pub async fn load_engine(&self) -> Result<(), PipelineError> {
        self.engine.load().await.map_err(|e| match e {
            EngineError::LoadFailed { reason } => PipelineError::EngineLoad { reason },
            other => PipelineError::EngineLoad { reason: other.to_string() },
        })
    }

    /// Replace the opening frame of `video` with `image`
    ///
    /// Returns the spliced MP4 named after `options.output_base_name`. A run that a
    /// newer request overtakes returns [`PipelineError::Superseded`] instead of its result.
    pub async fn run(
        &self,
        video: &MediaAsset,
        image: &MediaAsset,
        options: &Options,
    ) -> Result<MediaAsset, PipelineError> {
        if !self.engine.is_ready() {
            return Err(PipelineError::EngineNotReady);
        }
        options.validate(self.config.lead_in_seconds)?;

        let run_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("🎬 Run {}: replacing first frame of {} with {}", run_id, video.name(), image.name());
        info!("   Scale to: {}", options.scale_target);
        if let Some(fps) = options.framerate {
            info!("   Framerate: {} fps", fps);
        }
        if let Some(duration) = options.duration {
            info!("   Duration: {:.2}s", duration);
        }

        let session = self.engine.session().await;
        let result = self.execute(run_id, video, image, options).await;
        if !self.config.keep_intermediates {
            self.release_intermediates().await;
        }
        drop(session);

        match &result {
            Ok(output) => {
                info!("🎉 Run {} complete: {} ({:.2} MB)", run_id, output.name(), output.size_mb());
            }
            Err(PipelineError::Superseded { latest, .. }) => {
                warn!("Run {} discarded: superseded by run {}", run_id, latest);
            }
            Err(e) => {
                self.report(run_id, RunState::Failed);
                warn!("Run {} failed: {}", run_id, e);
            }
        }
        result
    }

    async fn execute(
        &self,
        run_id: u64,
        video: &MediaAsset,
        image: &MediaAsset,
        options: &Options,
    ) -> Result<MediaAsset, PipelineError> {
        self.ensure_current(run_id)?;
        self.clear_output();
        self.stage_inputs(video, image).await?;

        // ==========================================
        // STEP 1: PROBE
        // ==========================================
        self.enter(run_id, RunState::Probing)?;
        info!("📐 Step 1: Probing dimensions...");
        let probe = ProbeStage::new(&self.engine).run(options.scale_target).await?;
        let plan = EncodePlan::decide(options, &probe, &self.config);
        debug!("Encode plan: {:?}", plan);

        // ==========================================
        // STEP 2: FRAME SYNTHESIS
        // ==========================================
        self.enter(run_id, RunState::SynthesizingFrame)?;
        info!("🖼️  Step 2: Synthesizing replacement frame...");
        FrameSynthesisStage::new(&self.engine).run(&plan.synthesis).await?;

        // ==========================================
        // STEP 3: TRIM
        // ==========================================
        self.enter(run_id, RunState::Trimming)?;
        info!("✂️  Step 3: Trimming source video...");
        TrimStage::new(&self.engine, self.config.duration_tolerance_seconds)
            .run(&plan.remainder, probe.source_duration())
            .await?;

        // ==========================================
        // STEP 4: CONCAT
        // ==========================================
        self.enter(run_id, RunState::Concatenating)?;
        info!("🔗 Step 4: Splicing segments...");
        let output = ConcatStage::new(&self.engine).run(&options.output_file_name()).await?;

        self.ensure_current(run_id)?;
        self.publish(run_id, output.clone());
        self.report(run_id, RunState::Complete);
        Ok(output)
    }

    /// Clear every artifact of the previous run, then write the new inputs
    async fn stage_inputs(&self, video: &MediaAsset, image: &MediaAsset) -> Result<(), PipelineError> {
        if video.kind() != MediaKind::Video || image.kind() != MediaKind::Image {
            return Err(PipelineError::Staging {
                reason: format!(
                    "expected a video and an image, got {} and {}",
                    video.name(),
                    image.name()
                ),
            });
        }

        for name in RUN_ARTIFACTS {
            self.engine.discard(name).await;
        }

        for (name, asset) in [(INPUT_VIDEO, video), (INPUT_IMAGE, image)] {
            self.engine
                .write_file(name, asset.data())
                .await
                .map_err(|e| PipelineError::Staging { reason: e.to_string() })?;
        }
        debug!("Staged {} ({} bytes) and {} ({} bytes)", video.name(), video.len(), image.name(), image.len());
        Ok(())
    }

    fn enter(&self, run_id: u64, state: RunState) -> Result<(), PipelineError> {
        self.ensure_current(run_id)?;
        self.report(run_id, state);
        Ok(())
    }

    fn ensure_current(&self, run_id: u64) -> Result<(), PipelineError> {
        let latest = self.latest_run_id();
        if latest == run_id {
            Ok(())
        } else {
            Err(PipelineError::Superseded { run_id, latest })
        }
    }

    /// Record a state transition, unless a newer run has been requested
    fn report(&self, run_id: u64, state: RunState) {
        if self.latest_run_id() != run_id {
            return;
        }
        self.status.send_if_modified(|status| {
            if status.run_id == run_id && !status.state.can_advance_to(state) {
                return false;
            }
            *status = RunStatus { run_id, state };
            true
        });
    }

    /// Make `asset` the authoritative output if no newer run has published
    fn publish(&self, run_id: u64, asset: MediaAsset) -> bool {
        let mut displaced = None;
        let replaced = self.published.send_if_modified(|slot| {
            if slot.as_ref().map_or(false, |current| current.run_id >= run_id) {
                return false;
            }
            displaced = slot.replace(Arc::new(PublishedOutput { run_id, asset }));
            true
        });

        if let Some(previous) = displaced {
            self.release(&previous);
        }
        replaced
    }

    fn release(&self, output: &PublishedOutput) {
        debug!("Releasing output of run {}", output.run_id);
        if let Some(hook) = &self.release_hook {
            hook(output);
        }
    }

    async fn release_intermediates(&self) {
        for name in INTERMEDIATES {
            self.engine.discard(name).await;
        }
    }

    /// Convert a finished output into another container
    ///
    /// Waits for any run in progress; the original asset is left untouched.
    pub async fn convert_container(
        &self,
        output: &MediaAsset,
        target: TargetContainer,
    ) -> Result<MediaAsset, ConversionError> {
        ContainerConverter::new(&self.engine, self.conversion.mode)
            .convert(output, target)
            .await
    }

    /// The authoritative output, if any run has completed
    pub fn current_output(&self) -> Option<Arc<PublishedOutput>> {
        self.published.borrow().clone()
    }

    /// Watch the published slot; it empties when a run starts and fills when one completes
    pub fn subscribe_outputs(&self) -> watch::Receiver<Option<Arc<PublishedOutput>>> {
        self.published.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Id of the most recently requested run
    pub fn latest_run_id(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Drop the published output, releasing it
    pub fn clear_output(&self) {
        let previous = self.published.send_replace(None);
        if let Some(previous) = previous {
            self.release(&previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    use image::{ImageOutputFormat, RgbImage};

    use crate::engine::{OperationKind, SimulatedEngine, SimulatedMedia};
    use crate::error::Stage;
    use crate::pipeline::artifacts::{FRAME_CLIP, OUTPUT, REMAINDER};

    fn video() -> MediaAsset {
        let media = SimulatedMedia::video(1280, 720, 25.0, 3.0);
        MediaAsset::new("clip.mp4", MediaKind::Video, media.to_bytes())
    }

    fn image() -> MediaAsset {
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(RgbImage::new(320, 240))
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .unwrap();
        MediaAsset::new("cover.png", MediaKind::Image, buffer.into_inner())
    }

    async fn coordinator(engine: SimulatedEngine, config: PipelineConfig) -> (Arc<SimulatedEngine>, PipelineCoordinator) {
        let engine = Arc::new(engine);
        let handle = Arc::new(EngineHandle::new(engine.clone()));
        let coordinator = PipelineCoordinator::new(handle, config);
        coordinator.load_engine().await.unwrap();
        (engine, coordinator)
    }

    #[tokio::test]
    async fn test_run_requires_ready_engine() {
        let handle = Arc::new(EngineHandle::new(Arc::new(SimulatedEngine::new())));
        let coordinator = PipelineCoordinator::new(handle, PipelineConfig::default());

        let err = coordinator.run(&video(), &image(), &Options::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EngineNotReady));
        assert_eq!(coordinator.latest_run_id(), 0);
    }

    #[tokio::test]
    async fn test_load_failure_is_engine_load_error() {
        let handle = Arc::new(EngineHandle::new(Arc::new(
            SimulatedEngine::new().with_load_failure("ffmpeg: command not found"),
        )));
        let coordinator = PipelineCoordinator::new(handle, PipelineConfig::default());

        let err = coordinator.load_engine().await.unwrap_err();
        assert!(matches!(err, PipelineError::EngineLoad { ref reason } if reason.contains("not found")));
    }

    #[tokio::test]
    async fn test_invalid_options_never_start_a_run() {
        let (engine, coordinator) = coordinator(SimulatedEngine::new(), PipelineConfig::default()).await;
        let options = Options { framerate: Some(0), ..Options::default() };

        let err = coordinator.run(&video(), &image(), &options).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOptions { .. }));
        assert!(engine.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_swapped_assets_fail_staging() {
        let (_, coordinator) = coordinator(SimulatedEngine::new(), PipelineConfig::default()).await;

        let err = coordinator.run(&image(), &video(), &Options::default()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Staging));
        assert_eq!(coordinator.status().state, RunState::Failed);
    }

    #[tokio::test]
    async fn test_successful_run_publishes_and_cleans_up() {
        let (engine, coordinator) = coordinator(SimulatedEngine::new(), PipelineConfig::default()).await;
        let options = Options { output_base_name: "holiday".into(), ..Options::default() };

        let output = coordinator.run(&video(), &image(), &options).await.unwrap();
        assert_eq!(output.name(), "holiday.mp4");
        assert_eq!(coordinator.status(), RunStatus { run_id: 1, state: RunState::Complete });

        let published = coordinator.current_output().unwrap();
        assert_eq!(published.run_id, 1);
        assert_eq!(published.asset, output);

        assert_eq!(engine.file_names().await, vec![OUTPUT.to_string()]);
    }

    #[tokio::test]
    async fn test_keep_intermediates() {
        let config = PipelineConfig { keep_intermediates: true, ..PipelineConfig::default() };
        let (engine, coordinator) = coordinator(SimulatedEngine::new(), config).await;

        coordinator.run(&video(), &image(), &Options::default()).await.unwrap();
        assert!(engine.contains(FRAME_CLIP).await);
        assert!(engine.contains(REMAINDER).await);
    }

    #[tokio::test]
    async fn test_failed_stage_is_reported() {
        let (_, coordinator) = coordinator(
            SimulatedEngine::new().with_failure(OperationKind::SynthesizeClip),
            PipelineConfig::default(),
        )
        .await;

        let err = coordinator.run(&video(), &image(), &Options::default()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::FrameSynthesis));
        assert_eq!(coordinator.status(), RunStatus { run_id: 1, state: RunState::Failed });
        assert!(coordinator.current_output().is_none());
    }

    #[tokio::test]
    async fn test_newer_output_releases_previous() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let (_, coordinator) = coordinator(SimulatedEngine::new(), PipelineConfig::default()).await;
        let coordinator = coordinator.with_release_hook(move |output| {
            sink.lock().unwrap().push(output.run_id);
        });

        coordinator.run(&video(), &image(), &Options::default()).await.unwrap();
        coordinator.run(&video(), &image(), &Options::default()).await.unwrap();
        assert_eq!(*released.lock().unwrap(), vec![1]);
        assert_eq!(coordinator.current_output().unwrap().run_id, 2);

        coordinator.clear_output();
        assert_eq!(*released.lock().unwrap(), vec![1, 2]);
        assert!(coordinator.current_output().is_none());
    }

    #[tokio::test]
    async fn test_failed_run_retires_previous_output() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let (_, coordinator) = coordinator(SimulatedEngine::new(), PipelineConfig::default()).await;
        let coordinator = coordinator.with_release_hook(move |output| {
            sink.lock().unwrap().push(output.run_id);
        });

        coordinator.run(&video(), &image(), &Options::default()).await.unwrap();
        let mut outputs = coordinator.subscribe_outputs();
        assert_eq!(outputs.borrow_and_update().as_ref().map(|o| o.run_id), Some(1));

        let too_long = Options { duration: Some(10.0), ..Options::default() };
        let err = coordinator.run(&video(), &image(), &too_long).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Trim));
        assert_eq!(coordinator.status(), RunStatus { run_id: 2, state: RunState::Failed });

        assert!(coordinator.current_output().is_none());
        assert!(outputs.has_changed().unwrap());
        assert!(outputs.borrow_and_update().is_none());
        assert_eq!(*released.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_stale_publish_is_ignored() {
        let handle = Arc::new(EngineHandle::new(Arc::new(SimulatedEngine::new())));
        let coordinator = PipelineCoordinator::new(handle, PipelineConfig::default());

        assert!(coordinator.publish(2, video()));
        assert!(!coordinator.publish(1, video()));
        assert_eq!(coordinator.current_output().unwrap().run_id, 2);
    }
}
