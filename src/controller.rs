//! Session lifecycle: Idle → Running → Idle
//!
//! A [`PipelineController`] runs ticks in one of two modes:
//!
//! - **push**: [`start`](PipelineController::start), then feed frames with
//!   [`tick`](PipelineController::tick) from the caller's thread
//! - **threaded**: [`start_with_source`](PipelineController::start_with_source)
//!   moves the pipeline into an executor thread that polls a
//!   [`SensorSource`]
//!
//! In both modes the pipeline has exactly one owner at a time. Display code
//! reads published snapshots through a [`SnapshotReader`], never the
//! pipeline itself.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use chrono::Local;
use log::{debug, error, info};
use parking_lot::Mutex;

use crate::error::{ConfigError, PipelineError, PipelineState, StorageError};
use crate::pipeline::Pipeline;
use crate::record::{CsvRecordStore, RecordLayout};
use crate::sink::{LogSink, SinkHandle};
use crate::snapshot::{Snapshot, SnapshotReader};
use crate::source::{SensorSource, SourceEvent};
use crate::types::{LocationFix, PipelineSettings, SensorFrame};

/// Record file status for a started session
#[derive(Debug)]
pub enum Logging {
    Enabled(PathBuf),
    /// No record directory configured
    Disabled,
    /// The file could not be created; the session runs without recording
    Failed(StorageError),
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(Logging),
    /// The session was already running; nothing changed
    AlreadyRunning,
}

/// Summary returned when a running session stops
#[derive(Debug)]
pub struct SessionReport {
    /// Ticks executed during this session
    pub ticks: u64,
    /// Rows written to the record file
    pub records: u64,
    pub record_path: Option<PathBuf>,
    pub storage_error: Option<StorageError>,
}

/// Shared slot for the latest location fix.
///
/// Cloned out of the controller so a positioning callback on another thread
/// can publish fixes while a session runs.
#[derive(Debug, Clone, Default)]
pub struct LocationUpdater {
    slot: Arc<Mutex<Option<LocationFix>>>,
}

impl LocationUpdater {
    pub fn update(&self, fix: LocationFix) {
        *self.slot.lock() = Some(fix);
    }

    pub fn latest(&self) -> Option<LocationFix> {
        *self.slot.lock()
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Tick-side state, owned by whichever context executes ticks
struct Session {
    pipeline: Pipeline,
    sink: Option<SinkHandle>,
    reader: SnapshotReader,
    location: LocationUpdater,
    ticks: u64,
}

impl Session {
    fn new(pipeline: Pipeline, reader: &SnapshotReader, location: &LocationUpdater) -> Self {
        Self {
            pipeline,
            sink: None,
            reader: reader.clone(),
            location: location.clone(),
            ticks: 0,
        }
    }

    fn tick(&mut self, frame: &SensorFrame) -> Arc<Snapshot> {
        let snapshot = Arc::new(self.pipeline.tick(frame, self.location.latest()));
        if let Some(sink) = &self.sink {
            sink.submit(Arc::clone(&snapshot));
        }
        self.reader.publish(Arc::clone(&snapshot));
        self.ticks += 1;
        snapshot
    }
}

struct Executor {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Option<Session>>,
}

/// Owns the pipeline lifecycle and the session's record file.
///
/// # Example
/// ```
/// use chrono::Local;
/// use inertial_pipeline::{PipelineController, PipelineSettings, SensorFrame, StartOutcome};
///
/// let mut controller = PipelineController::new(PipelineSettings::default()).unwrap();
/// assert!(matches!(controller.start(), StartOutcome::Started(_)));
///
/// controller.tick(&SensorFrame::empty(Local::now())).unwrap();
/// assert!(controller.reset().is_err());
///
/// let report = controller.stop().unwrap();
/// assert_eq!(report.ticks, 1);
/// controller.reset().unwrap();
/// assert!(controller.latest().is_none());
/// ```
pub struct PipelineController {
    /// Fresh pipeline for the current settings
    template: Pipeline,
    /// `None` only while an executor thread owns it
    session: Option<Session>,
    executor: Option<Executor>,
    running: bool,
    sink: Option<LogSink>,
    record_path: Option<PathBuf>,
    reader: SnapshotReader,
    location: LocationUpdater,
}

impl PipelineController {
    pub fn new(settings: PipelineSettings) -> Result<Self, ConfigError> {
        let template = Pipeline::new(settings)?;
        let reader = SnapshotReader::new();
        let location = LocationUpdater::default();
        Ok(Self {
            session: Some(Session::new(template.clone(), &reader, &location)),
            template,
            executor: None,
            running: false,
            sink: None,
            record_path: None,
            reader,
            location,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        self.template.settings()
    }

    pub fn state(&self) -> PipelineState {
        if self.running {
            PipelineState::Running
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Read handle on published snapshots, usable from any thread
    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.reader.latest()
    }

    pub fn location_updater(&self) -> LocationUpdater {
        self.location.clone()
    }

    pub fn update_location(&self, fix: LocationFix) {
        self.location.update(fix);
    }

    /// Record file of the current or most recent session
    pub fn record_path(&self) -> Option<&Path> {
        self.record_path.as_deref()
    }

    /// Begin a push-mode session. No-op when already running.
    pub fn start(&mut self) -> StartOutcome {
        if self.running {
            debug!("start ignored: session already running");
            return StartOutcome::AlreadyRunning;
        }
        let (logging, handle) = self.open_record();
        let session = self.idle_session();
        session.sink = handle;
        session.ticks = 0;
        self.running = true;
        info!("session started");
        StartOutcome::Started(logging)
    }

    /// Begin a session whose ticks are driven by `source` on a dedicated
    /// executor thread. No-op when already running.
    pub fn start_with_source(
        &mut self,
        mut source: Box<dyn SensorSource>,
    ) -> Result<StartOutcome, PipelineError> {
        if self.running {
            debug!("start ignored: session already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        let (logging, handle) = self.open_record();
        let mut session = match self.session.take() {
            Some(session) => session,
            None => self.fresh_session(),
        };
        session.sink = handle;
        session.ticks = 0;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        // Handed over only once the thread exists; a failed spawn leaves the
        // session with the controller
        let (handover, arrival) = mpsc::sync_channel::<Session>(1);
        let spawned = thread::Builder::new()
            .name("pipeline-executor".into())
            .spawn(move || {
                let mut session = arrival.recv().ok()?;
                while !flag.load(Ordering::Acquire) {
                    match source.poll() {
                        // A frame that raced with stop is dropped
                        SourceEvent::Frame(_) if flag.load(Ordering::Acquire) => break,
                        SourceEvent::Frame(frame) => {
                            session.tick(&frame);
                        }
                        SourceEvent::Idle => {}
                        SourceEvent::End => {
                            debug!("sensor source exhausted");
                            break;
                        }
                    }
                }
                Some(session)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("cannot spawn executor thread: {e}");
                self.abandon_start(session);
                return Err(PipelineError::Executor(e));
            }
        };
        if let Err(mpsc::SendError(session)) = handover.send(session) {
            error!("executor thread exited before taking the session");
            self.abandon_start(session);
            return Err(PipelineError::Executor(io::Error::other(
                "executor thread exited before taking the session",
            )));
        }

        self.executor = Some(Executor { stop, handle });
        self.running = true;
        info!("session started with executor thread");
        Ok(StartOutcome::Started(logging))
    }

    /// Process one frame in a push-mode session.
    ///
    /// Rejected while idle (including after [`stop`](Self::stop) has
    /// returned) and while a source drives the session; state is untouched.
    pub fn tick(&mut self, frame: &SensorFrame) -> Result<Arc<Snapshot>, PipelineError> {
        if !self.running {
            debug!("tick ignored: session idle");
            return Err(PipelineError::InvalidState {
                operation: "tick",
                state: PipelineState::Idle,
            });
        }
        match (&self.executor, self.session.as_mut()) {
            (None, Some(session)) => Ok(session.tick(frame)),
            _ => {
                debug!("tick ignored: session is source-driven");
                Err(PipelineError::InvalidState {
                    operation: "push frames to a source-driven session",
                    state: PipelineState::Running,
                })
            }
        }
    }

    /// End the session. No-op (returns `None`) when already idle.
    ///
    /// On return no tick is executing or will execute, and every snapshot
    /// of the session has been written and the record file closed.
    pub fn stop(&mut self) -> Option<SessionReport> {
        if !self.running {
            debug!("stop ignored: session idle");
            return None;
        }

        if let Some(executor) = self.executor.take() {
            executor.stop.store(true, Ordering::Release);
            let session = match executor.handle.join() {
                Ok(Some(session)) => session,
                _ => {
                    error!("executor thread panicked, pipeline state rebuilt from settings");
                    self.fresh_session()
                }
            };
            self.session = Some(session);
        }

        let session = self.idle_session();
        // Producer handle must go before the sink can drain
        session.sink = None;
        let ticks = session.ticks;

        let sink_report = self.sink.take().map(LogSink::finish).unwrap_or_default();
        self.running = false;
        info!(
            "session stopped after {ticks} ticks, {} records written",
            sink_report.records
        );

        Some(SessionReport {
            ticks,
            records: sink_report.records,
            record_path: self.record_path.clone(),
            storage_error: sink_report.error,
        })
    }

    /// Zero every filter and integrator, clear the published snapshot and
    /// the last location fix. Only permitted while idle.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if self.running {
            debug!("reset rejected: session running");
            return Err(PipelineError::InvalidState {
                operation: "reset",
                state: PipelineState::Running,
            });
        }
        self.idle_session().pipeline.reset();
        self.reader.clear();
        self.location.clear();
        debug!("pipeline reset");
        Ok(())
    }

    /// Replace the settings; rebuilds all filter and integrator state.
    /// Only permitted while idle.
    pub fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), PipelineError> {
        if self.running {
            debug!("settings change rejected: session running");
            return Err(PipelineError::InvalidState {
                operation: "change settings",
                state: PipelineState::Running,
            });
        }
        self.template = Pipeline::new(settings)?;
        let pipeline = self.template.clone();
        self.idle_session().pipeline = pipeline;
        self.reader.clear();
        Ok(())
    }

    /// Return the session of a threaded start whose executor never ran,
    /// state intact, and close the record it opened.
    fn abandon_start(&mut self, mut session: Session) {
        session.sink = None;
        self.session = Some(session);
        if let Some(sink) = self.sink.take() {
            sink.finish();
        }
    }

    fn fresh_session(&self) -> Session {
        Session::new(self.template.clone(), &self.reader, &self.location)
    }

    fn idle_session(&mut self) -> &mut Session {
        let Self {
            session,
            template,
            reader,
            location,
            ..
        } = self;
        session.get_or_insert_with(|| Session::new(template.clone(), reader, location))
    }

    /// Create the session record file and its writer, if configured.
    fn open_record(&mut self) -> (Logging, Option<SinkHandle>) {
        let Some(directory) = self.settings().record.directory.clone() else {
            self.record_path = None;
            return (Logging::Disabled, None);
        };

        let layout = RecordLayout::standard(self.settings());
        let opened = CsvRecordStore::create(&directory, Local::now(), &layout).and_then(|store| {
            let path = store.path().to_path_buf();
            LogSink::spawn(Box::new(store), layout).map(|sink| (path, sink))
        });

        match opened {
            Ok((path, sink)) => {
                let handle = sink.handle();
                self.sink = Some(sink);
                self.record_path = Some(path.clone());
                (Logging::Enabled(path), Some(handle))
            }
            Err(e) => {
                error!("recording disabled for this session: {e}");
                self.record_path = None;
                (Logging::Failed(e), None)
            }
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}
