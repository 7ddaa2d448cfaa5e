//! Driving a scan session: stimulus output, capture, and a background worker.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::session::{ScanSession, ScanState};
use crate::bitmap::{PixelImage, TextureFormat};
use crate::error::{Error, Result};

/// Produces a screenshot of the model wearing the current stimulus.
pub trait CaptureProvider: Send {
    fn capture(&mut self) -> Result<PixelImage>;
}

impl<F> CaptureProvider for F
where
    F: FnMut() -> Result<PixelImage> + Send,
{
    fn capture(&mut self) -> Result<PixelImage> {
        self()
    }
}

/// Receives each stimulus so the live render can pick it up.
pub trait StimulusSink {
    fn show(&mut self, stimulus: &PixelImage) -> Result<()>;
}

/// Writes stimuli to the texture file the renderer reads from.
#[derive(Debug, Clone)]
pub struct FileStimulusSink {
    path: PathBuf,
    format: TextureFormat,
}

impl FileStimulusSink {
    pub fn new(path: impl Into<PathBuf>, format: TextureFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StimulusSink for FileStimulusSink {
    fn show(&mut self, stimulus: &PixelImage) -> Result<()> {
        stimulus.save(&self.path, self.format)
    }
}

/// Replays pre-recorded screenshots from a directory, in file name order.
#[derive(Debug, Clone)]
pub struct ReplayCapture {
    files: Vec<PathBuf>,
    next: usize,
}

impl ReplayCapture {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files, next: 0 }
    }

    /// Collect every PNG/TGA/BMP/TIFF file in `dir`, sorted by name.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "tga" | "bmp" | "tif" | "tiff"))
                .unwrap_or(false);
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();
        log::info!("Found {} captures in {}", files.len(), dir.as_ref().display());
        Ok(Self::new(files))
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }
}

impl CaptureProvider for ReplayCapture {
    fn capture(&mut self) -> Result<PixelImage> {
        let path = self
            .files
            .get(self.next)
            .ok_or_else(|| Error::Capture("no more recorded captures".to_string()))?;
        let image = PixelImage::load(path)?;
        self.next += 1;
        Ok(image)
    }
}

/// Synchronous scan loop: show stimulus, capture, ingest.
pub struct ScanRunner<C, S> {
    capture: C,
    sink: S,
}

impl<C: CaptureProvider, S: StimulusSink> ScanRunner<C, S> {
    pub fn new(capture: C, sink: S) -> Self {
        Self { capture, sink }
    }

    /// Run one step. A failed capture leaves the session where it was.
    pub fn step(&mut self, session: &mut ScanSession) -> Result<ScanState> {
        let stimulus = session.current_stimulus().ok_or(Error::SessionFinished)?;
        log::info!("Scanning: {}", session.step_description());
        self.sink.show(&stimulus)?;
        let screenshot = self.capture.capture()?;
        session.ingest(&screenshot)
    }

    /// Step until the session is done.
    pub fn run_to_completion(&mut self, session: &mut ScanSession) -> Result<()> {
        while !session.done() {
            self.step(session)?;
        }
        Ok(())
    }

    pub fn into_parts(self) -> (C, S) {
        (self.capture, self.sink)
    }
}

/// Commands sent to the worker thread.
#[derive(Debug)]
enum WorkerCommand {
    /// Capture and ingest the next step
    Step,
    /// Stop the worker thread
    Stop,
}

/// Events from the worker thread.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A capture was ingested; carries the stimulus for the next step
    StepCompleted {
        state: ScanState,
        progress: (u32, u32),
        next_stimulus: Option<PixelImage>,
    },
    /// Capture failed, the session did not advance
    CaptureFailed(String),
    /// The capture was rejected by the session
    IngestFailed(String),
    /// Scan finished; carries the final projection map
    Finished(Option<PixelImage>),
}

/// Runs capture-and-ingest on a background thread, one step per request.
///
/// Steps are processed strictly in request order by a single thread, so no
/// two ingests can race on the session.
pub struct ScanWorker {
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<WorkerEvent>,
    worker_handle: Option<JoinHandle<ScanSession>>,
}

impl ScanWorker {
    pub fn spawn(session: ScanSession, capture: impl CaptureProvider + 'static) -> Self {
        let (command_tx, command_rx) = bounded::<WorkerCommand>(16);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(64);

        let worker_handle = thread::spawn(move || Self::worker_loop(session, capture, command_rx, event_tx));

        Self {
            command_tx,
            event_rx,
            worker_handle: Some(worker_handle),
        }
    }

    fn worker_loop(
        mut session: ScanSession,
        mut capture: impl CaptureProvider,
        command_rx: Receiver<WorkerCommand>,
        event_tx: Sender<WorkerEvent>,
    ) -> ScanSession {
        loop {
            match command_rx.recv() {
                Ok(WorkerCommand::Step) => {
                    if session.done() {
                        let _ = event_tx.send(WorkerEvent::Finished(session.projection_map()));
                        continue;
                    }

                    let screenshot = match capture.capture() {
                        Ok(image) => image,
                        Err(e) => {
                            log::warn!("Capture failed: {}", e);
                            let _ = event_tx.send(WorkerEvent::CaptureFailed(e.to_string()));
                            continue;
                        }
                    };

                    match session.ingest(&screenshot) {
                        Ok(state) => {
                            let _ = event_tx.send(WorkerEvent::StepCompleted {
                                state,
                                progress: session.progress(),
                                next_stimulus: session.current_stimulus(),
                            });
                            if state.is_done() {
                                let _ = event_tx.send(WorkerEvent::Finished(session.projection_map()));
                            }
                        }
                        Err(e) => {
                            log::warn!("Capture rejected: {}", e);
                            let _ = event_tx.send(WorkerEvent::IngestFailed(e.to_string()));
                        }
                    }
                }
                Ok(WorkerCommand::Stop) | Err(_) => return session,
            }
        }
    }

    /// Ask the worker to capture and ingest the next step.
    pub fn request_step(&self) -> Result<()> {
        self.command_tx
            .send(WorkerCommand::Step)
            .map_err(|_| Error::WorkerDisconnected)
    }

    /// Non-blocking poll for the next event.
    pub fn poll(&self) -> Option<WorkerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until an event arrives or the timeout elapses.
    pub fn wait(&self, timeout: std::time::Duration) -> Result<Option<WorkerEvent>> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerDisconnected),
        }
    }

    /// Stop the worker and take back the session, including partial progress.
    pub fn finish(mut self) -> Result<ScanSession> {
        let _ = self.command_tx.send(WorkerCommand::Stop);
        let handle = self.worker_handle.take().ok_or(Error::WorkerDisconnected)?;
        handle.join().map_err(|_| Error::WorkerDisconnected)
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.worker_handle.take() {
            let _ = self.command_tx.send(WorkerCommand::Stop);
            let _ = handle.join();
        }
    }
}
