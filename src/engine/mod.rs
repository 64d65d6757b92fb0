//! # Transcoding Engine
//!
//! The engine decodes, encodes and remuxes media on behalf of the pipeline. It owns a
//! private virtual filesystem of named blobs; every stage talks to it only through
//! those names.
//!
//! Two engines are provided:
//!
//! - [`FfmpegEngine`] drives external `ffmpeg`/`ffprobe` processes over a temp directory
//! - [`SimulatedEngine`] models stream parameters in memory, for tests and dry runs
//!
//! Both are wrapped in an [`EngineHandle`], which owns the load lifecycle and the
//! workspace lock shared by pipeline runs and container conversions.

pub mod ffmpeg;
pub mod operation;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::media::MediaInfo;

pub use ffmpeg::FfmpegEngine;
pub use operation::{produced_codec, Operation, OperationKind, VideoEncode};
pub use simulated::{SimulatedEngine, SimulatedMedia};

/// Boundary to the external transcoding engine
///
/// Every call is a suspension point. Implementations must treat deleting a missing
/// file as success.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Prepare the engine for use
    async fn load(&self) -> Result<(), EngineError>;

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Run one transcoding operation
    async fn transform(&self, operation: &Operation) -> Result<(), EngineError>;

    /// Report the stream layout of a virtual file
    async fn inspect(&self, name: &str) -> Result<MediaInfo, EngineError>;
}

/// Load lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

/// Owned handle to a transcoding engine
///
/// Once `Ready` the handle stays ready. File and transform calls made before that
/// fail with [`EngineError::NotReady`].
pub struct EngineHandle {
    engine: Arc<dyn TranscodeEngine>,
    state: watch::Sender<EngineState>,
    load_lock: Mutex<()>,
    workspace: Mutex<()>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        Self {
            engine,
            state,
            load_lock: Mutex::new(()),
            workspace: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Watch lifecycle changes
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Load the engine; calls after the first success are no-ops
    ///
    /// Concurrent callers wait for the in-flight load and then observe its outcome.
    pub async fn load(&self) -> Result<(), EngineError> {
        let _guard = self.load_lock.lock().await;
        if self.is_ready() {
            debug!("Engine {} already loaded", self.engine.name());
            return Ok(());
        }

        self.state.send_replace(EngineState::Loading);
        info!("Loading transcoding engine: {}", self.engine.name());

        match self.engine.load().await {
            Ok(()) => {
                self.state.send_replace(EngineState::Ready);
                info!("Transcoding engine ready");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(EngineState::Unloaded);
                warn!("Failed to load transcoding engine: {}", e);
                Err(match e {
                    EngineError::LoadFailed { .. } => e,
                    other => EngineError::LoadFailed { reason: other.to_string() },
                })
            }
        }
    }

    /// Exclusive access to the virtual filesystem for one run or conversion
    pub async fn session(&self) -> MutexGuard<'_, ()> {
        self.workspace.lock().await
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    pub async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.ensure_ready()?;
        debug!("vfs write {} ({} bytes)", name, data.len());
        self.engine.write_file(name, data).await
    }

    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.ensure_ready()?;
        let data = self.engine.read_file(name).await?;
        debug!("vfs read {} ({} bytes)", name, data.len());
        Ok(data)
    }

    pub async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.ensure_ready()?;
        debug!("vfs delete {}", name);
        self.engine.delete_file(name).await
    }

    /// Best-effort delete; failures are logged and swallowed
    pub async fn discard(&self, name: &str) {
        if let Err(e) = self.delete_file(name).await {
            warn!("Could not remove artifact {}: {}", name, e);
        }
    }

    pub async fn transform(&self, operation: &Operation) -> Result<(), EngineError> {
        self.ensure_ready()?;
        debug!("engine {} -> {}", operation.kind(), operation.output());
        self.engine.transform(operation).await
    }

    pub async fn inspect(&self, name: &str) -> Result<MediaInfo, EngineError> {
        self.ensure_ready()?;
        self.engine.inspect(name).await
    }
}
