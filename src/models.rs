use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control-flow status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Filtering,
    Processing,
    Classifying,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl ProcessState {
    /// States from which a pause request is honoured
    pub const PAUSABLE: [ProcessState; 4] = [
        ProcessState::Running,
        ProcessState::Filtering,
        ProcessState::Processing,
        ProcessState::Classifying,
    ];

    pub fn is_pausable(&self) -> bool {
        Self::PAUSABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Completed | ProcessState::Cancelled | ProcessState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "detenido",
            ProcessState::Starting => "iniciando",
            ProcessState::Filtering => "filtrando",
            ProcessState::Processing => "procesando",
            ProcessState::Classifying => "clasificando",
            ProcessState::Running => "en_ejecucion",
            ProcessState::Paused => "pausado",
            ProcessState::Completed => "completado",
            ProcessState::Cancelled => "cancelado",
            ProcessState::Failed => "error",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tag carried by every emitted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl MessageLevel {
    /// Upper-case tag used in file log lines
    pub fn tag(&self) -> &'static str {
        match self {
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Info => "INFO",
            MessageLevel::Success => "SUCCESS",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Pipeline stage label. Each engine defines its own closed set of phases;
/// the lifecycle only stores and forwards them.
pub trait Phase: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Phase reported before any pipeline work (validation, setup)
    const INITIAL: Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPhase {
    Initial,
    Filtering,
    Downloading,
    Finalizing,
}

impl Phase for ExtractionPhase {
    const INITIAL: Self = ExtractionPhase::Initial;
}

impl fmt::Display for ExtractionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionPhase::Initial => "inicial",
            ExtractionPhase::Filtering => "filtrado",
            ExtractionPhase::Downloading => "descarga",
            ExtractionPhase::Finalizing => "finalizacion",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPhase {
    Initial,
    Classifying,
    Finalizing,
}

impl Phase for ClassificationPhase {
    const INITIAL: Self = ClassificationPhase::Initial;
}

impl fmt::Display for ClassificationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassificationPhase::Initial => "inicial",
            ClassificationPhase::Classifying => "clasificando",
            ClassificationPhase::Finalizing => "finalizacion",
        })
    }
}

/// Start/end timestamps of a run
#[derive(Debug, Clone, Default)]
pub struct RunClock {
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl RunClock {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Local::now()),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    /// Elapsed seconds between start and end.
    ///
    /// A run that was interrupted before recording its end time is measured up to now.
    pub fn total_seconds(&self) -> f64 {
        match self.started_at {
            Some(start) => {
                let end = self.finished_at.unwrap_or_else(Local::now);
                (end - start).num_milliseconds().max(0) as f64 / 1000.0
            }
            None => 0.0,
        }
    }
}

/// One attachment written to the destination folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub name: String,
    pub downloaded_at: DateTime<Local>,
    /// Received date of the source message, `dd/mm/YYYY`
    pub message_date: String,
    /// Received time of the source message, `HH:MM:SS`
    pub message_time: String,
}

impl DownloadedFile {
    pub fn new(name: String, received: NaiveDateTime) -> Self {
        Self {
            name,
            downloaded_at: Local::now(),
            message_date: received.format("%d/%m/%Y").to_string(),
            message_time: received.format("%H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    pub clock: RunClock,
    pub emails_found: usize,
    pub emails_processed: usize,
    pub attachments_downloaded: usize,
    pub attachments_failed: usize,
    pub total_size_mb: f64,
    /// Items skipped during filtering because their timestamp could not be read
    pub items_skipped: usize,
    pub downloaded_files: Vec<DownloadedFile>,
}

impl ExtractionStats {
    pub fn started_now() -> Self {
        Self {
            clock: RunClock::started_now(),
            ..Default::default()
        }
    }

    /// Percentage of attempted attachments that were saved
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attachments_downloaded + self.attachments_failed;
        if attempted == 0 {
            return 0.0;
        }
        self.attachments_downloaded as f64 / attempted as f64 * 100.0
    }

    pub fn to_report(&self) -> ExtractionReport {
        ExtractionReport {
            emails_found: self.emails_found,
            emails_processed: self.emails_processed,
            attachments_downloaded: self.attachments_downloaded,
            attachments_failed: self.attachments_failed,
            total_size_mb: self.total_size_mb,
            total_seconds: self.clock.total_seconds(),
            success_rate: self.success_rate(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationStats {
    pub clock: RunClock,
    pub total: usize,
    pub signed: usize,
    pub unsigned: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ClassificationStats {
    pub fn started_now() -> Self {
        Self {
            clock: RunClock::started_now(),
            ..Default::default()
        }
    }

    pub fn to_report(&self) -> ClassificationReport {
        ClassificationReport {
            total: self.total,
            signed: self.signed,
            unsigned: self.unsigned,
            skipped: self.skipped,
            errors: self.errors,
            total_seconds: self.clock.total_seconds(),
        }
    }
}

/// Frozen result of a run, handed back by the lifecycle runner
pub trait RunReport: Serialize + Send + 'static {
    fn total_seconds(&self) -> f64;
    fn set_total_seconds(&mut self, seconds: f64);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    #[serde(rename = "total_correos")]
    pub emails_found: usize,
    #[serde(rename = "correos_procesados")]
    pub emails_processed: usize,
    #[serde(rename = "adjuntos_descargados")]
    pub attachments_downloaded: usize,
    #[serde(rename = "adjuntos_fallidos")]
    pub attachments_failed: usize,
    #[serde(rename = "tamaño_total_mb")]
    pub total_size_mb: f64,
    #[serde(rename = "tiempo_total")]
    pub total_seconds: f64,
    #[serde(rename = "tasa_exito")]
    pub success_rate: f64,
}

impl RunReport for ExtractionReport {
    fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    fn set_total_seconds(&mut self, seconds: f64) {
        self.total_seconds = seconds;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub total: usize,
    #[serde(rename = "firmados")]
    pub signed: usize,
    #[serde(rename = "sin_firmar")]
    pub unsigned: usize,
    #[serde(rename = "omitidos")]
    pub skipped: usize,
    #[serde(rename = "errores")]
    pub errors: usize,
    #[serde(rename = "tiempo_total")]
    pub total_seconds: f64,
}

impl RunReport for ClassificationReport {
    fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    fn set_total_seconds(&mut self, seconds: f64) {
        self.total_seconds = seconds;
    }
}
