use thiserror::Error;

/// Type alias for Result with ProcessError
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Error types shared by the extraction and classification pipelines
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Input parameters were rejected before the run started
    #[error("Validación fallida: {0}")]
    ValidationFailed(String),

    /// The user requested cancellation (sticky until the next run)
    #[error("Proceso cancelado por el usuario")]
    Cancelled,

    /// Mail client could not be reached
    #[error("Cliente de correo no disponible: {0}")]
    CollaboratorUnavailable(String),

    /// A segment of a mailbox folder path does not exist
    #[error("Carpeta de correo no encontrada: {0}")]
    FolderNotFound(String),

    /// Saving a single attachment failed
    #[error("Error con adjunto: {0}")]
    AttachmentSave(String),

    /// A required output directory could not be created
    #[error("Error de carpeta: {0}")]
    DirectoryCreation(String),

    /// Spreadsheet generation failed
    #[error("Error de Excel: {0}")]
    Spreadsheet(String),

    /// Configuration error
    #[error("Error de configuración: {0}")]
    Config(String),

    /// IO error (file operations, etc.)
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic catch-all error
    #[error("Error inesperado: {0}")]
    Unexpected(String),
}

impl ProcessError {
    /// Check if the error is the cooperative cancellation signal
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ProcessError::Cancelled)
    }

    /// Check if the error aborts a run (anything except per-item failures and cancellation)
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProcessError::Cancelled | ProcessError::AttachmentSave(_) | ProcessError::Spreadsheet(_)
        )
    }
}

impl From<zip::result::ZipError> for ProcessError {
    fn from(error: zip::result::ZipError) -> Self {
        ProcessError::Spreadsheet(error.to_string())
    }
}
