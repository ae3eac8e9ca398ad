use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::assign::{AssignRequest, ColorAssigner};
use crate::colors::{extended_palette, ExtendedPalette};
use crate::config::Config;
use crate::error::ServiceError;
use crate::imaging::{apply_mask, decode_image, working_image, ModelInput};
use crate::segmentation::Segmenter;

pub const NO_IMAGE_DATA: &str = "No image data found in the request";
pub const INVALID_DATA: &str = "Invalid data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessImageResponse {
    pub color_palette: ExtendedPalette,
}

/// Request-independent state shared by every handler thread.
///
/// The segmentation model and the assigner are injected at startup and only
/// ever borrowed immutably.
pub struct PaletteService {
    config: Config,
    segmenter: Arc<dyn Segmenter>,
    assigner: Arc<dyn ColorAssigner>,
    workers: WorkerGate,
}

impl PaletteService {
    pub fn new(config: Config, segmenter: Arc<dyn Segmenter>, assigner: Arc<dyn ColorAssigner>) -> Self {
        let workers = WorkerGate::new(config.max_workers);
        PaletteService { config, segmenter, assigner, workers }
    }

    pub fn workers(&self) -> &WorkerGate {
        &self.workers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn segmenter_name(&self) -> &str {
        self.segmenter.name()
    }

    /// Decode → resize → segment → mask → extended palette.
    pub fn process_image(&self, bytes: &[u8]) -> Result<ProcessImageResponse, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::invalid(NO_IMAGE_DATA));
        }
        let size = self.config.image_size;

        let image = decode_image(bytes)?;
        let working = working_image(&image, size);
        let input = ModelInput::from_rgb(&working);

        let predicted = self.segmenter.predict(&input)?;
        let mask = predicted.resize(size, size);
        debug!(
            model = self.segmenter.name(),
            native = predicted.width,
            coverage = mask.coverage(self.config.mask_threshold),
            "segmented image"
        );

        let focal = apply_mask(&working, &mask, self.config.mask_threshold)?;
        let color_palette = extended_palette(&focal, &self.config.palette_options())?;
        Ok(ProcessImageResponse { color_palette })
    }

    /// Validates `{"layers": ..., "palette": ...}` and forwards it to the
    /// assigner. The assigner's result is returned untouched.
    pub fn assign_colors(&self, body: &[u8]) -> Result<Value, ServiceError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ServiceError::invalid(INVALID_DATA))?;
        let has_fields = value
            .as_object()
            .map_or(false, |o| o.contains_key("layers") && o.contains_key("palette"));
        if !has_fields {
            return Err(ServiceError::invalid(INVALID_DATA));
        }

        let request: AssignRequest = serde_json::from_value(value)
            .map_err(|e| ServiceError::invalid_with(INVALID_DATA, e.to_string()))?;

        let assignment = self.assigner.assign(&request.palette, &request.layers)?;
        serde_json::to_value(&assignment).map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

/// Runs `work` on its own thread and waits at most `timeout` for it.
///
/// A timed-out worker is not killed; it finishes in the background and its
/// result is dropped with the channel. Use `WorkerGate::run` to bound how
/// many such workers can be alive at once.
pub fn run_with_timeout<T, F>(timeout: Duration, work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(work());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ServiceError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ServiceError::Internal("worker thread exited without a result".into()))
        }
    }
}

/// Caps the number of live pipeline workers, counting timed-out ones until
/// they actually finish.
#[derive(Debug)]
pub struct WorkerGate {
    active: Arc<AtomicUsize>,
    limit: usize,
}

/// Releases one slot when the worker thread is done with it.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerGate {
    pub fn new(limit: usize) -> Self {
        WorkerGate { active: Arc::new(AtomicUsize::new(0)), limit }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// `run_with_timeout`, or `ServiceError::Busy` when every slot is taken.
    pub fn run<T, F>(&self, timeout: Duration, work: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    {
        if self.active.fetch_add(1, Ordering::SeqCst) >= self.limit {
            self.active.fetch_sub(1, Ordering::SeqCst);
            warn!(limit = self.limit, "all pipeline workers busy");
            return Err(ServiceError::Busy { limit: self.limit });
        }
        let slot = Slot(Arc::clone(&self.active));
        run_with_timeout(timeout, move || {
            let _slot = slot;
            work()
        })
    }
}
