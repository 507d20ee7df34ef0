//! Run skeleton shared by every long-running operation.
//!
//! A [`ProcessRunner`] drives one [`Pipeline`] through
//! validate → reset → `run_main` → finalize. The pipeline talks back through the
//! [`ProcessContext`], which owns the current state and phase, dispatches the
//! callbacks, mirrors every message to `tracing` and to an optional file log, and
//! exposes the cooperative checkpoints. The UI side keeps a [`ProcessHandle`] to
//! pause, resume or cancel while the runner is busy on a worker task.

use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::callbacks::{progress_percent, Callbacks};
use crate::control::ProcessControl;
use crate::error::{ProcessError, Result};
use crate::fs_utils::{format_duration, timestamped_file_name};
use crate::models::{MessageLevel, Phase, ProcessState, RunReport};

const LOG_RULE_WIDTH: usize = 80;

#[derive(Debug)]
struct Status<P> {
    state: ProcessState,
    phase: P,
    /// State to restore on resume, recorded by pause
    resume_to: Option<ProcessState>,
    run_id: String,
}

/// Shared state of one engine instance
pub struct ProcessContext<P: Phase> {
    engine_name: &'static str,
    callbacks: Callbacks<P>,
    control: ProcessControl,
    status: Mutex<Status<P>>,
    log_file: Mutex<Option<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: Phase> ProcessContext<P> {
    pub fn new(engine_name: &'static str, callbacks: Callbacks<P>) -> Self {
        Self {
            engine_name,
            callbacks,
            control: ProcessControl::new(),
            status: Mutex::new(Status {
                state: ProcessState::Stopped,
                phase: P::INITIAL,
                resume_to: None,
                run_id: String::new(),
            }),
            log_file: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.status).state
    }

    pub fn phase(&self) -> P {
        lock(&self.status).phase
    }

    pub fn run_id(&self) -> String {
        lock(&self.status).run_id.clone()
    }

    pub fn control(&self) -> &ProcessControl {
        &self.control
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        lock(&self.log_file).clone()
    }

    // ========================================
    // Communication
    // ========================================

    /// Deliver a message to the sink, `tracing`, and the file log
    pub fn emit(&self, phase: P, level: MessageLevel, text: impl AsRef<str>) {
        let text = text.as_ref();
        (self.callbacks.message)(phase, level, text);
        self.trace_message(phase, level, text);

        if self.log_path().is_some() {
            let timestamp = Local::now().format("%H:%M:%S");
            self.write_log(&format!("[{}] [{}] {}", timestamp, level.tag(), text));
        }
    }

    /// [`ProcessContext::emit`] tagged with the current phase
    pub fn emit_current(&self, level: MessageLevel, text: impl AsRef<str>) {
        self.emit(self.phase(), level, text);
    }

    fn trace_message(&self, phase: P, level: MessageLevel, text: &str) {
        let engine = self.engine_name;
        match level {
            MessageLevel::Debug => {
                tracing::debug!(target: "attachment_sorter::messages", engine, %phase, "{}", text)
            }
            MessageLevel::Info | MessageLevel::Success => {
                tracing::info!(target: "attachment_sorter::messages", engine, %phase, "{}", text)
            }
            MessageLevel::Warning => {
                tracing::warn!(target: "attachment_sorter::messages", engine, %phase, "{}", text)
            }
            MessageLevel::Error => {
                tracing::error!(target: "attachment_sorter::messages", engine, %phase, "{}", text)
            }
        }
    }

    /// Report `(current, total, percent)`; `current` is clamped to `total`
    pub fn update_progress(&self, current: usize, total: usize) {
        let current = current.min(total);
        (self.callbacks.progress)(current, total, progress_percent(current, total));
    }

    /// Transition to `new_state` and notify.
    ///
    /// While paused, a transition to another active state only changes the state
    /// restored on resume. Once cancellation was requested, active states are ignored.
    pub fn set_state(&self, new_state: ProcessState) {
        {
            let mut status = lock(&self.status);
            if new_state.is_pausable() {
                if self.control.is_cancelled() {
                    debug!("Ignoring transition to {} after cancellation", new_state);
                    return;
                }
                if status.state == ProcessState::Paused {
                    status.resume_to = Some(new_state);
                    debug!("Paused; {} will be restored on resume", new_state);
                    return;
                }
            }
            status.state = new_state;
        }
        self.notify_state(new_state);
    }

    fn notify_state(&self, state: ProcessState) {
        (self.callbacks.state)(state);
        if self.log_path().is_some() {
            self.write_log(&format!("Estado cambiado a: {}", state));
        }
    }

    /// Move to another pipeline stage and announce it
    pub fn change_phase(&self, phase: P) {
        lock(&self.status).phase = phase;
        self.emit(phase, MessageLevel::Info, format!("Iniciando fase: {}", phase));
    }

    // ========================================
    // Flow control
    // ========================================

    /// Pause an active run. Returns `false` (and does nothing) in any other state.
    pub fn pause(&self) -> bool {
        let phase = {
            let mut status = lock(&self.status);
            if !status.state.is_pausable() {
                return false;
            }
            status.resume_to = Some(status.state);
            self.control.close_gate();
            status.state = ProcessState::Paused;
            status.phase
        };
        self.notify_state(ProcessState::Paused);
        self.emit(phase, MessageLevel::Warning, "Proceso pausado");
        true
    }

    /// Resume a paused run, restoring the state it had before pausing
    pub fn resume(&self) -> bool {
        let (restored, phase) = {
            let mut status = lock(&self.status);
            if status.state != ProcessState::Paused {
                return false;
            }
            self.control.open_gate();
            let restored = status.resume_to.take().unwrap_or(ProcessState::Running);
            status.state = restored;
            (restored, status.phase)
        };
        self.notify_state(restored);
        self.emit(phase, MessageLevel::Info, "Proceso reanudado");
        true
    }

    /// Request cancellation. Always effective; observed at the next checkpoint.
    pub fn cancel(&self) {
        let phase = {
            let mut status = lock(&self.status);
            self.control.request_cancel();
            status.resume_to = None;
            status.state = ProcessState::Cancelled;
            status.phase
        };
        self.notify_state(ProcessState::Cancelled);
        self.emit(phase, MessageLevel::Warning, "Proceso cancelado por el usuario");
    }

    /// Iteration boundary: fail if cancelled, otherwise wait out a pause
    pub async fn checkpoint(&self) -> Result<()> {
        self.control.check_cancelled()?;
        self.control.wait_if_paused().await;
        self.control.check_cancelled()
    }

    /// Clear control, phase and file log before a new run
    fn begin_run(&self) {
        self.control.reset();
        *lock(&self.log_file) = None;
        let mut status = lock(&self.status);
        status.phase = P::INITIAL;
        status.resume_to = None;
        status.run_id = uuid::Uuid::new_v4().to_string();
        debug!("Starting {} run {}", self.engine_name, status.run_id);
    }

    // ========================================
    // Filesystem helpers
    // ========================================

    /// Create `path` with its parents. Reports an Error message instead of failing.
    pub async fn ensure_directory(&self, path: &Path) -> bool {
        match tokio::fs::create_dir_all(path).await {
            Ok(()) => true,
            Err(e) => {
                self.emit_current(
                    MessageLevel::Error,
                    format!("Error al crear carpeta {}: {}", path.display(), e),
                );
                false
            }
        }
    }

    // ========================================
    // File log
    // ========================================

    /// Start a timestamped `.log` file in `folder`; every later message is appended
    pub fn begin_file_log(&self, folder: &Path, prefix: &str) -> PathBuf {
        let now = Local::now();
        let path = folder.join(timestamped_file_name(prefix, "log", now));
        *lock(&self.log_file) = Some(path.clone());

        let rule = "=".repeat(LOG_RULE_WIDTH);
        self.write_log(&rule);
        self.write_log(&format!(
            "LOG DE PROCESAMIENTO - {}",
            self.engine_name.to_uppercase()
        ));
        self.write_log(&rule);
        self.write_log(&format!("Inicio: {}", now.format("%Y-%m-%d %H:%M:%S")));
        self.write_log(&format!("Ejecución: {}", self.run_id()));
        self.write_log("");

        info!("Writing process log to {:?}", path);
        path
    }

    /// Append the summary block: every report field, duration, and final status
    pub fn end_file_log<R: RunReport>(&self, report: &R) {
        let Some(path) = self.log_path() else {
            return;
        };

        let rule = "=".repeat(LOG_RULE_WIDTH);
        self.write_log("");
        self.write_log(&rule);
        self.write_log("RESUMEN FINAL");
        self.write_log(&rule);

        match serde_json::to_value(report) {
            Ok(serde_json::Value::Object(fields)) => {
                for (key, value) in fields.iter().filter(|(key, _)| *key != "tiempo_total") {
                    self.write_log(&format!("{}: {}", key, value));
                }
            }
            Ok(other) => self.write_log(&other.to_string()),
            Err(e) => warn!("Could not serialize report for the log summary: {}", e),
        }

        self.write_log(&format!(
            "Tiempo total: {}",
            format_duration(report.total_seconds())
        ));

        match self.state() {
            ProcessState::Completed => self.write_log("Estado: ✅ Completado exitosamente"),
            ProcessState::Cancelled => self.write_log("Estado: 🛑 Cancelado"),
            ProcessState::Failed => self.write_log("Estado: ❌ Error"),
            _ => {}
        }

        let absolute = std::fs::canonicalize(&path).unwrap_or(path);
        self.write_log(&rule);
        self.write_log(&format!("Log guardado en: {}", absolute.display()));
        self.write_log(&rule);
    }

    /// One physical append per line; failures are reported to `tracing` only
    fn write_log(&self, line: &str) {
        let Some(path) = self.log_path() else {
            return;
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(format!("{}\n", line).as_bytes()));

        if let Err(e) = result {
            error!("Error writing log {:?}: {}", path, e);
        }
    }
}

/// Cloneable control surface for the owner of a running pipeline
pub struct ProcessHandle<P: Phase> {
    context: Arc<ProcessContext<P>>,
}

impl<P: Phase> Clone for ProcessHandle<P> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<P: Phase> ProcessHandle<P> {
    pub fn pause(&self) -> bool {
        self.context.pause()
    }

    pub fn resume(&self) -> bool {
        self.context.resume()
    }

    pub fn cancel(&self) {
        self.context.cancel()
    }

    pub fn state(&self) -> ProcessState {
        self.context.state()
    }

    pub fn phase(&self) -> P {
        self.context.phase()
    }

    pub fn is_cancelled(&self) -> bool {
        self.context.control().is_cancelled()
    }

    pub fn is_pause_open(&self) -> bool {
        self.context.control().is_pause_open()
    }
}

/// Domain logic plugged into the run skeleton
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Phase: Phase;
    type Params: Send + Sync;
    type Report: RunReport;

    /// Engine label used in the file log header
    const NAME: &'static str;

    /// Check parameters before anything runs; `Err` carries a user-facing reason
    async fn validate(
        &self,
        ctx: &ProcessContext<Self::Phase>,
        params: &Self::Params,
    ) -> std::result::Result<(), String>;

    /// The pipeline itself. Must call [`ProcessContext::checkpoint`] at every
    /// iteration boundary.
    async fn run_main(
        &mut self,
        ctx: &ProcessContext<Self::Phase>,
        params: &Self::Params,
    ) -> Result<Self::Report>;

    /// Snapshot of the statistics gathered so far
    fn build_report(&self) -> Self::Report;
}

/// Generic lifecycle runner: one run at a time per instance
pub struct ProcessRunner<E: Pipeline> {
    engine: E,
    context: Arc<ProcessContext<E::Phase>>,
}

impl<E: Pipeline> ProcessRunner<E> {
    pub fn new(engine: E) -> Self {
        Self::with_callbacks(engine, Callbacks::noop())
    }

    pub fn with_callbacks(engine: E, callbacks: Callbacks<E::Phase>) -> Self {
        Self {
            engine,
            context: Arc::new(ProcessContext::new(E::NAME, callbacks)),
        }
    }

    pub fn handle(&self) -> ProcessHandle<E::Phase> {
        ProcessHandle {
            context: Arc::clone(&self.context),
        }
    }

    pub fn context(&self) -> &ProcessContext<E::Phase> {
        &self.context
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run only the validation step
    pub async fn validate(&self, params: &E::Params) -> std::result::Result<(), String> {
        self.engine.validate(&self.context, params).await
    }

    /// Execute the full run.
    ///
    /// Cancellation is absorbed into a partial report; validation, collaborator and
    /// unexpected failures are returned as errors after the state moved to `Failed`.
    pub async fn run(&mut self, params: E::Params) -> Result<E::Report> {
        let ctx = &*self.context;

        if let Err(message) = self.engine.validate(ctx, &params).await {
            ctx.emit(
                E::Phase::INITIAL,
                MessageLevel::Error,
                format!("Validación fallida: {}", message),
            );
            return Err(ProcessError::ValidationFailed(message));
        }

        ctx.begin_run();
        ctx.set_state(ProcessState::Starting);
        let started = Instant::now();

        match self.engine.run_main(ctx, &params).await {
            Ok(mut report) => {
                report.set_total_seconds(started.elapsed().as_secs_f64());
                if !ctx.control().is_cancelled() {
                    ctx.set_state(ProcessState::Completed);
                }
                ctx.end_file_log(&report);
                info!("{} run finished in {:.1}s", E::NAME, report.total_seconds());
                Ok(report)
            }
            Err(error) if error.is_cancellation() => {
                ctx.set_state(ProcessState::Cancelled);
                let report = self.engine.build_report();
                ctx.end_file_log(&report);
                info!("{} run cancelled", E::NAME);
                Ok(report)
            }
            Err(error) => {
                if error.is_fatal() {
                    error!("{} run failed: {}", E::NAME, error);
                } else {
                    warn!("{} run stopped: {}", E::NAME, error);
                }
                ctx.set_state(ProcessState::Failed);
                ctx.emit_current(
                    MessageLevel::Error,
                    format!("Error durante el proceso: {}", error),
                );
                ctx.end_file_log(&self.engine.build_report());
                Err(error)
            }
        }
    }
}

impl<E: Pipeline> std::fmt::Debug for ProcessRunner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(estado={}, fase={})",
            E::NAME,
            self.context.state(),
            self.context.phase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionPhase;
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct CountReport {
        processed: usize,
        tiempo_total: f64,
    }

    impl RunReport for CountReport {
        fn total_seconds(&self) -> f64 {
            self.tiempo_total
        }

        fn set_total_seconds(&mut self, seconds: f64) {
            self.tiempo_total = seconds;
        }
    }

    /// Counts to `params`, checkpointing once per step
    struct CountingPipeline {
        processed: usize,
        fail_at: Option<usize>,
        step_delay: Duration,
    }

    impl CountingPipeline {
        fn new() -> Self {
            Self {
                processed: 0,
                fail_at: None,
                step_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        type Phase = ExtractionPhase;
        type Params = usize;
        type Report = CountReport;

        const NAME: &'static str = "Contador";

        async fn validate(
            &self,
            _ctx: &ProcessContext<ExtractionPhase>,
            params: &usize,
        ) -> std::result::Result<(), String> {
            if *params > 0 {
                Ok(())
            } else {
                Err("Valor debe ser mayor a 0".to_string())
            }
        }

        async fn run_main(
            &mut self,
            ctx: &ProcessContext<ExtractionPhase>,
            params: &usize,
        ) -> Result<CountReport> {
            self.processed = 0;
            ctx.change_phase(ExtractionPhase::Downloading);
            ctx.set_state(ProcessState::Processing);
            for step in 1..=*params {
                ctx.checkpoint().await?;
                if Some(step) == self.fail_at {
                    return Err(ProcessError::Unexpected("step exploded".to_string()));
                }
                if !self.step_delay.is_zero() {
                    tokio::time::sleep(self.step_delay).await;
                }
                self.processed += 1;
                ctx.update_progress(step, *params);
            }
            Ok(self.build_report())
        }

        fn build_report(&self) -> CountReport {
            CountReport {
                processed: self.processed,
                tiempo_total: 0.0,
            }
        }
    }

    type Recorded = Arc<Mutex<Vec<String>>>;

    fn recording_callbacks() -> (Callbacks<ExtractionPhase>, Recorded, Arc<Mutex<Vec<ProcessState>>>) {
        let messages: Recorded = Arc::new(Mutex::new(Vec::new()));
        let states = Arc::new(Mutex::new(Vec::new()));
        let message_sink = Arc::clone(&messages);
        let state_sink = Arc::clone(&states);
        let callbacks = Callbacks::noop()
            .on_message(move |phase, level, text| {
                message_sink
                    .lock()
                    .unwrap()
                    .push(format!("{}|{}|{}", phase, level, text));
            })
            .on_state(move |state| state_sink.lock().unwrap().push(state));
        (callbacks, messages, states)
    }

    fn context() -> ProcessContext<ExtractionPhase> {
        ProcessContext::new("Prueba", Callbacks::noop())
    }

    #[test]
    fn test_new_context_is_stopped() {
        let ctx = context();
        assert_eq!(ctx.state(), ProcessState::Stopped);
        assert_eq!(ctx.phase(), ExtractionPhase::Initial);
        assert!(ctx.log_path().is_none());
    }

    #[test]
    fn test_emit_reaches_callback() {
        let (callbacks, messages, _) = recording_callbacks();
        let ctx = ProcessContext::new("Prueba", callbacks);

        ctx.emit(ExtractionPhase::Initial, MessageLevel::Info, "Test mensaje");

        assert_eq!(*messages.lock().unwrap(), vec!["inicial|INFO|Test mensaje"]);
    }

    #[test]
    fn test_update_progress_percent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = ProcessContext::new(
            "Prueba",
            Callbacks::<ExtractionPhase>::noop()
                .on_progress(move |current, total, percent| sink.lock().unwrap().push((current, total, percent))),
        );

        ctx.update_progress(50, 100);
        ctx.update_progress(0, 0);
        ctx.update_progress(7, 5);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(50, 100, 50.0), (0, 0, 0.0), (5, 5, 100.0)]
        );
    }

    #[test]
    fn test_set_state_notifies() {
        let (callbacks, _, states) = recording_callbacks();
        let ctx = ProcessContext::new("Prueba", callbacks);

        ctx.set_state(ProcessState::Running);

        assert_eq!(ctx.state(), ProcessState::Running);
        assert_eq!(*states.lock().unwrap(), vec![ProcessState::Running]);
    }

    #[test]
    fn test_change_phase_emits_message() {
        let (callbacks, messages, _) = recording_callbacks();
        let ctx = ProcessContext::new("Prueba", callbacks);

        ctx.change_phase(ExtractionPhase::Filtering);

        assert_eq!(ctx.phase(), ExtractionPhase::Filtering);
        assert_eq!(
            *messages.lock().unwrap(),
            vec!["filtrado|INFO|Iniciando fase: filtrado"]
        );
    }

    #[test]
    fn test_pause_from_active_state() {
        let (callbacks, messages, _) = recording_callbacks();
        let ctx = ProcessContext::new("Prueba", callbacks);
        ctx.set_state(ProcessState::Running);

        assert!(ctx.pause());

        assert_eq!(ctx.state(), ProcessState::Paused);
        assert!(!ctx.control().is_pause_open());
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.ends_with("WARNING|Proceso pausado")));
    }

    #[test]
    fn test_pause_is_noop_when_not_active() {
        let ctx = context();
        for state in [
            ProcessState::Stopped,
            ProcessState::Starting,
            ProcessState::Completed,
            ProcessState::Cancelled,
            ProcessState::Failed,
        ] {
            ctx.set_state(state);
            assert!(!ctx.pause());
            assert_eq!(ctx.state(), state);
            assert!(ctx.control().is_pause_open());
        }
    }

    #[test]
    fn test_resume_restores_previous_state() {
        let ctx = context();
        ctx.set_state(ProcessState::Classifying);

        ctx.pause();
        assert!(ctx.resume());

        assert_eq!(ctx.state(), ProcessState::Classifying);
        assert!(ctx.control().is_pause_open());
    }

    #[test]
    fn test_resume_is_noop_unless_paused() {
        let ctx = context();
        ctx.set_state(ProcessState::Filtering);
        assert!(!ctx.resume());
        assert_eq!(ctx.state(), ProcessState::Filtering);
    }

    #[test]
    fn test_transition_while_paused_updates_resume_target() {
        let ctx = context();
        ctx.set_state(ProcessState::Filtering);
        ctx.pause();

        ctx.set_state(ProcessState::Processing);
        assert_eq!(ctx.state(), ProcessState::Paused);

        ctx.resume();
        assert_eq!(ctx.state(), ProcessState::Processing);
    }

    #[test]
    fn test_cancel_sets_flag_and_opens_gate() {
        let ctx = context();
        ctx.set_state(ProcessState::Running);
        ctx.pause();

        ctx.cancel();

        assert_eq!(ctx.state(), ProcessState::Cancelled);
        assert!(ctx.control().is_cancelled());
        assert!(ctx.control().is_pause_open());
    }

    #[tokio::test]
    async fn test_cancel_survives_pause_resume_cycle() {
        let ctx = context();
        ctx.set_state(ProcessState::Running);
        ctx.cancel();

        ctx.set_state(ProcessState::Running);
        ctx.pause();
        ctx.resume();

        assert!(matches!(ctx.checkpoint().await, Err(ProcessError::Cancelled)));
    }

    #[tokio::test]
    async fn test_ensure_directory() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context();
        let nested = temp_dir.path().join("a").join("b");

        assert!(ctx.ensure_directory(&nested).await);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_ensure_directory_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file.txt");
        std::fs::write(&blocker, "x").unwrap();
        let (callbacks, messages, _) = recording_callbacks();
        let ctx = ProcessContext::new("Prueba", callbacks);

        assert!(!ctx.ensure_directory(&blocker.join("child")).await);
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("ERROR|Error al crear carpeta")));
    }

    #[test]
    fn test_file_log_lines() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context();

        let path = ctx.begin_file_log(temp_dir.path(), "log_prueba");
        ctx.emit(ExtractionPhase::Filtering, MessageLevel::Success, "Mensaje de prueba");
        ctx.set_state(ProcessState::Filtering);

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("log_prueba_fecha("));
        assert!(name.ends_with(").log"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("LOG DE PROCESAMIENTO - PRUEBA"));
        assert!(content.contains("[SUCCESS] Mensaje de prueba"));
        assert!(content.contains("Estado cambiado a: filtrando"));

        let line = content
            .lines()
            .find(|l| l.ends_with("Mensaje de prueba"))
            .unwrap();
        // [HH:MM:SS] [LEVEL] text
        assert_eq!(&line[0..1], "[");
        assert_eq!(&line[9..10], "]");
    }

    #[test]
    fn test_end_file_log_summary() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context();
        let path = ctx.begin_file_log(temp_dir.path(), "log");
        ctx.set_state(ProcessState::Completed);

        ctx.end_file_log(&CountReport {
            processed: 3,
            tiempo_total: 75.0,
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("RESUMEN FINAL"));
        assert!(content.contains("processed: 3"));
        assert!(content.contains("Tiempo total: 1min 15.0s"));
        assert!(content.contains("Estado: ✅ Completado exitosamente"));
        assert!(content.contains("Log guardado en:"));
        assert!(!content.contains("tiempo_total:"));
    }

    #[test]
    fn test_end_file_log_without_log_is_noop() {
        let ctx = context();
        ctx.end_file_log(&CountReport::default());
        assert!(ctx.log_path().is_none());
    }

    #[tokio::test]
    async fn test_run_full_flow() {
        let (callbacks, _, states) = recording_callbacks();
        let mut runner = ProcessRunner::with_callbacks(CountingPipeline::new(), callbacks);

        let report = runner.run(3).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(runner.context().state(), ProcessState::Completed);
        let states = states.lock().unwrap();
        assert_eq!(states.first(), Some(&ProcessState::Starting));
        assert_eq!(states.last(), Some(&ProcessState::Completed));
    }

    #[tokio::test]
    async fn test_run_with_invalid_params() {
        let (callbacks, messages, states) = recording_callbacks();
        let mut runner = ProcessRunner::with_callbacks(CountingPipeline::new(), callbacks);

        let result = runner.run(0).await;

        assert!(matches!(result, Err(ProcessError::ValidationFailed(_))));
        assert_eq!(runner.context().state(), ProcessState::Stopped);
        assert!(states.lock().unwrap().is_empty());
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("ERROR|Validación fallida: Valor debe ser mayor a 0")));
    }

    #[tokio::test]
    async fn test_run_propagates_unexpected_errors() {
        let mut pipeline = CountingPipeline::new();
        pipeline.fail_at = Some(2);
        let (callbacks, messages, _) = recording_callbacks();
        let mut runner = ProcessRunner::with_callbacks(pipeline, callbacks);

        let result = runner.run(5).await;

        assert!(matches!(result, Err(ProcessError::Unexpected(_))));
        assert_eq!(runner.context().state(), ProcessState::Failed);
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("Error durante el proceso")));
    }

    #[tokio::test]
    async fn test_run_cancelled_returns_partial_report() {
        let mut pipeline = CountingPipeline::new();
        pipeline.step_delay = Duration::from_millis(10);
        let mut runner = ProcessRunner::with_callbacks(pipeline, Callbacks::noop());
        let handle = runner.handle();

        let worker = tokio::spawn(async move {
            let report = runner.run(1000).await;
            (report, runner.context().state())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let (report, state) = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("cancelled run must finish")
            .unwrap();
        let report = report.unwrap();
        assert!(report.processed < 1000);
        assert_eq!(state, ProcessState::Cancelled);
    }

    #[tokio::test]
    async fn test_run_resets_control_between_runs() {
        let mut runner = ProcessRunner::new(CountingPipeline::new());
        runner.handle().cancel();

        let report = runner.run(2).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(runner.context().state(), ProcessState::Completed);
    }

    #[tokio::test]
    async fn test_pause_holds_worker_until_resume() {
        let mut pipeline = CountingPipeline::new();
        pipeline.step_delay = Duration::from_millis(5);
        let mut runner = ProcessRunner::new(pipeline);
        let handle = runner.handle();

        let worker = tokio::spawn(async move { runner.run(40).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.pause());
        assert_eq!(handle.state(), ProcessState::Paused);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!worker.is_finished());

        assert!(handle.resume());
        assert_eq!(handle.state(), ProcessState::Processing);

        let report = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("resumed run must finish")
            .unwrap()
            .unwrap();
        assert_eq!(report.processed, 40);
    }

    #[test]
    fn test_runner_debug() {
        let runner = ProcessRunner::new(CountingPipeline::new());
        assert_eq!(format!("{:?}", runner), "Contador(estado=detenido, fase=inicial)");
    }
}
