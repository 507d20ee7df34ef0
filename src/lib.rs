//! Attachment Sorter
//!
//! Pulls attachments out of a mail store and sorts document folders into
//! signed and unsigned subfolders, both as pausable, cancellable runs.
//!
//! # Overview
//!
//! - **Extraction**: filter a mail folder by received date and subject phrases,
//!   save the attachments, and list them in an `.xlsx` spreadsheet
//! - **Classification**: move files whose names carry signature markers into
//!   `Documentos Firmados` / `Documentos sin Firmar`
//! - **Lifecycle**: both pipelines run inside one generic runner that owns the
//!   state machine, pause/cancel control, callbacks and the per-run file log
//!
//! # Example Usage
//!
//! ```no_run
//! use attachment_sorter::{ClassificationParams, DocumentClassifier, ProcessRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runner = ProcessRunner::new(DocumentClassifier::new());
//!     let handle = runner.handle(); // pause / resume / cancel from elsewhere
//!
//!     let report = runner
//!         .run(ClassificationParams {
//!             source_folder: "/srv/documentos".to_string(),
//!         })
//!         .await?;
//!
//!     println!("{} firmados, {} sin firmar", report.signed, report.unsigned);
//!     drop(handle);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`callbacks`] - Message, progress and state sinks
//! - [`classifier`] - Signed/unsigned document classification
//! - [`cli`] - Command-line interface and console adapter
//! - [`config`] - Configuration management
//! - [`control`] - Pause gate and cancellation flag
//! - [`error`] - Error types and result aliases
//! - [`extractor`] - Attachment extraction pipeline
//! - [`fs_utils`] - Unique names, folder and date validation
//! - [`lifecycle`] - Generic runner, process context and file log
//! - [`mailbox`] - Mail collaborator trait and `.eml` store
//! - [`models`] - States, phases, statistics and reports
//! - [`spreadsheet`] - `.xlsx` document list

pub mod callbacks;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod extractor;
pub mod fs_utils;
pub mod lifecycle;
pub mod mailbox;
pub mod models;
pub mod spreadsheet;

// Re-export commonly used types for convenience
pub use error::{ProcessError, Result};

// Core data models
pub use models::{
    ClassificationPhase, ClassificationReport, ExtractionPhase, ExtractionReport, MessageLevel,
    Phase, ProcessState, RunReport,
};

// Lifecycle
pub use callbacks::Callbacks;
pub use control::ProcessControl;
pub use lifecycle::{Pipeline, ProcessContext, ProcessHandle, ProcessRunner};

// Pipelines
pub use classifier::{ClassificationParams, ClassifierOptions, DocumentClassifier, SignatureRules, SignatureStatus};
pub use extractor::{AttachmentExtractor, ExtractionParams, ExtractorOptions};

// Mail collaborator
pub use mailbox::{Attachment, EmlMailStore, MailFolder, MailItem, MailSource};

// Config types
pub use config::{ClassificationConfig, Config, ExtractionConfig, ReportingConfig};
