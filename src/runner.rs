//! Background execution of clip analyses on a rayon thread pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use crate::audio::analysis::{ClipAnalysis, Pipeline, RunControl};
use crate::audio::decode::AudioClip;
use crate::audio::flux::{BandConfig, SpectralFluxAnalyzer};
use crate::audio::window::WindowKind;
use crate::error::{AnalysisError, Result};

pub struct AnalysisRunner {
    pool: rayon::ThreadPool,
}

impl AnalysisRunner {
    /// `threads == 0` lets rayon pick from the available cores.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("fluxbeat-worker-{}", i))
            .panic_handler(|payload| {
                log::error!("Analysis job panicked: {}", panic_message(payload.as_ref()));
            })
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("failed to build thread pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Queue a whole-clip analysis. Preconditions are checked before anything is queued.
    pub fn submit(
        &self,
        clip: Arc<AudioClip>,
        window: WindowKind,
        bands: Vec<BandConfig>,
    ) -> Result<AnalysisHandle> {
        let pipeline = Pipeline::prepare(&clip, window, &bands)?;
        let control = Arc::new(RunControl::default());
        let (sender, receiver) = mpsc::channel();

        let worker_control = Arc::clone(&control);
        self.pool.spawn(move || {
            let outcome = run_guarded(|| pipeline.run(&clip, &worker_control));
            if let Err(ref e) = outcome {
                log::warn!("Clip analysis failed: {}", e);
            }
            // The handle may already be gone; nobody is left to tell
            let _ = sender.send(outcome);
            worker_control.mark_finished();
        });

        Ok(AnalysisHandle { control, receiver })
    }

    /// Queue a single-band analysis whose completion callback fires exactly once.
    pub fn submit_band<F>(
        &self,
        clip: Arc<AudioClip>,
        window: WindowKind,
        band: BandConfig,
        on_complete: F,
    ) -> Result<Arc<RunControl>>
    where
        F: FnOnce(Result<SpectralFluxAnalyzer>) + Send + 'static,
    {
        let pipeline = Pipeline::prepare(&clip, window, std::slice::from_ref(&band))?;
        let control = Arc::new(RunControl::default());

        let worker_control = Arc::clone(&control);
        self.pool.spawn(move || {
            let outcome = run_guarded(|| pipeline.run(&clip, &worker_control)).and_then(|analysis| {
                analysis
                    .bands
                    .into_iter()
                    .next()
                    .ok_or(AnalysisError::WorkerDisconnected)
            });
            worker_control.mark_finished();
            on_complete(outcome);
        });

        Ok(control)
    }
}

/// Handle to a queued analysis. The result is only reachable once the run has finished.
pub struct AnalysisHandle {
    control: Arc<RunControl>,
    receiver: Receiver<Result<ClipAnalysis>>,
}

impl AnalysisHandle {
    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    pub fn progress(&self) -> (usize, usize) {
        self.control.progress()
    }

    /// Ask the worker to stop at the next frame boundary.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Non-blocking; hands the handle back if the run is still going.
    pub fn try_wait(self) -> std::result::Result<Result<ClipAnalysis>, Self> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(AnalysisError::WorkerDisconnected)),
        }
    }

    pub fn wait(self) -> Result<ClipAnalysis> {
        self.receiver
            .recv()
            .unwrap_or(Err(AnalysisError::WorkerDisconnected))
    }
}

fn run_guarded<T>(job: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(job))
        .unwrap_or_else(|payload| Err(AnalysisError::WorkerPanicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
