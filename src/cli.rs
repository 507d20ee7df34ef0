//! Command-line interface

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::fmt::MakeWriter;

use crate::callbacks::Callbacks;
use crate::classifier::{ClassificationParams, DocumentClassifier};
use crate::config::Config;
use crate::error::{ProcessError, Result};
use crate::extractor::{AttachmentExtractor, ExtractionParams};
use crate::fs_utils::format_duration;
use crate::lifecycle::{Pipeline, ProcessHandle, ProcessRunner};
use crate::mailbox::EmlMailStore;
use crate::models::{MessageLevel, Phase, ProcessState, RunReport};

#[derive(Parser, Debug)]
#[command(name = "attachment-sorter")]
#[command(version)]
#[command(about = "Extract mail attachments and sort signed documents", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "attachment-sorter.toml")]
    pub config: PathBuf,

    /// Verbose logging (also shows debug messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip the confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save the attachments of matching messages into a folder
    Extract(ExtractArgs),

    /// Move signed and unsigned documents into their subfolders
    Classify {
        /// Folder holding the documents
        folder: PathBuf,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "attachment-sorter.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Subject phrase (repeatable); any match selects the message
    #[arg(short, long = "phrase")]
    pub phrases: Vec<String>,

    /// Destination folder for attachments, log and spreadsheet
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Root directory of the .eml mail store
    #[arg(long)]
    pub mailbox_root: Option<PathBuf>,

    /// Mail folder path, e.g. "cuenta\Bandeja de entrada"
    #[arg(short, long)]
    pub mailbox: Option<String>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD), inclusive
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

impl ExtractArgs {
    /// Command-line values first, configuration as fallback
    pub fn to_params(&self, config: &Config) -> ExtractionParams {
        let phrases = if self.phrases.is_empty() {
            config.extraction.phrases.clone()
        } else {
            self.phrases.clone()
        };

        let destination = self
            .destination
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .or_else(|| config.extraction.destination.clone())
            .unwrap_or_default();

        ExtractionParams {
            phrases,
            destination,
            mailbox_path: self
                .mailbox
                .clone()
                .unwrap_or_else(|| config.extraction.mailbox_path.clone()),
            start_date: self.start,
            end_date: self.end,
        }
    }

    pub fn mailbox_root(&self, config: &Config) -> PathBuf {
        self.mailbox_root
            .clone()
            .or_else(|| config.extraction.mailbox_root.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Icon shown before console messages of each level
pub fn level_icon(level: MessageLevel) -> &'static str {
    match level {
        MessageLevel::Debug => "🔍",
        MessageLevel::Info => "ℹ️",
        MessageLevel::Success => "✅",
        MessageLevel::Warning => "⚠️",
        MessageLevel::Error => "❌",
    }
}

/// `[HH:MM:SS] <icon> <text>`
pub fn console_line(level: MessageLevel, text: &str) -> String {
    format!(
        "[{}] {} {}",
        Local::now().format("%H:%M:%S"),
        level_icon(level),
        text
    )
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a `MultiProgress` with the tracing writer so log lines print above the bar
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>5}/{len:5} {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self { multi, bar_style }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    /// `tracing` writer that keeps log output above the progress bars
    pub fn log_writer(&self) -> ConsoleLogWriter {
        ConsoleLogWriter {
            multi: self.multi.clone(),
        }
    }

    pub fn add_progress_bar(&self) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(self.bar_style.clone());
        pb
    }

    /// Sinks that drive `bar` and print messages through the shared `MultiProgress`
    pub fn callbacks<P: Phase>(&self, bar: &ProgressBar, verbose: bool) -> Callbacks<P> {
        let multi = self.multi.clone();
        let progress_bar = bar.clone();
        let state_bar = bar.clone();

        Callbacks::noop()
            .on_message(move |_phase, level, text| {
                if level == MessageLevel::Debug && !verbose {
                    return;
                }
                let _ = multi.println(console_line(level, text));
            })
            .on_progress(move |current, total, _percent| {
                progress_bar.set_length(total as u64);
                progress_bar.set_position(current as u64);
            })
            .on_state(move |state| {
                state_bar.set_message(state.to_string());
            })
    }

    /// Ask before starting; `--yes` answers for the user
    pub fn confirm(&self, question: &str, assume_yes: bool) -> Result<bool> {
        if assume_yes {
            return Ok(true);
        }

        let answer = self.multi.suspend(|| {
            inquire::Confirm::new(question)
                .with_default(false)
                .with_help_message("p = pausar, r = reanudar, c = cancelar durante la ejecución")
                .prompt()
        });

        match answer {
            Ok(answer) => Ok(answer),
            Err(inquire::InquireError::OperationCanceled)
            | Err(inquire::InquireError::OperationInterrupted) => Ok(false),
            Err(e) => Err(ProcessError::Unexpected(format!("falló la confirmación: {}", e))),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands `tracing` one [`ConsoleLogLine`] per event
#[derive(Clone)]
pub struct ConsoleLogWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for ConsoleLogWriter {
    type Writer = ConsoleLogLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLogLine {
            multi: self.multi.clone(),
            line: Vec::new(),
        }
    }
}

/// Collects one formatted event and prints it when dropped
pub struct ConsoleLogLine {
    multi: MultiProgress,
    line: Vec<u8>,
}

impl ConsoleLogLine {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.line).trim_end().to_string()
    }
}

impl Write for ConsoleLogLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.line.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLogLine {
    fn drop(&mut self) {
        let text = self.text();
        if !text.is_empty() {
            let _ = self.multi.println(text);
        }
    }
}

/// Read `p`/`r`/`c` commands from stdin on a dedicated thread.
///
/// The thread is detached; it ends when stdin closes or after a cancel.
pub fn spawn_stdin_control<P: Phase>(handle: ProcessHandle<P>, multi: MultiProgress) {
    let spawned = std::thread::Builder::new()
        .name("stdin-control".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim().to_lowercase().as_str() {
                    "p" | "pausar" => {
                        if !handle.pause() {
                            let _ = multi.println(console_line(
                                MessageLevel::Warning,
                                "No se puede pausar en el estado actual",
                            ));
                        }
                    }
                    "r" | "reanudar" => {
                        if !handle.resume() {
                            let _ = multi.println(console_line(
                                MessageLevel::Warning,
                                "El proceso no está pausado",
                            ));
                        }
                    }
                    "c" | "cancelar" => {
                        handle.cancel();
                        break;
                    }
                    "" => {}
                    other => debug!("Ignoring console input {:?}", other),
                }
                if handle.state().is_terminal() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Interactive control unavailable: {}", e);
    }
}

/// Run a pipeline with console control attached: stdin commands plus Ctrl-C → cancel
pub async fn run_with_console<E: Pipeline>(
    runner: &mut ProcessRunner<E>,
    params: E::Params,
    reporter: &ProgressReporter,
) -> Result<E::Report> {
    let handle = runner.handle();
    spawn_stdin_control(handle.clone(), reporter.multi_progress().clone());

    let ctrl_c = tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        }
    });

    let result = runner.run(params).await;
    ctrl_c.abort();
    result
}

/// Human-readable or JSON printout of a finished run
pub fn print_report<R: RunReport>(title: &str, report: &R, state: ProcessState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let rule = "=".repeat(50);
    println!("\n{}", rule);
    println!("{}", title);
    println!("{}", rule);
    if let serde_json::Value::Object(fields) = serde_json::to_value(report)? {
        for (key, value) in fields.iter().filter(|(key, _)| *key != "tiempo_total") {
            println!("{}: {}", key, value);
        }
    }
    println!("Tiempo total: {}", format_duration(report.total_seconds()));
    println!("Estado: {}", state);
    println!("{}", rule);
    Ok(())
}

pub async fn run_extraction(cli: &Cli, args: &ExtractArgs, config: &Config, reporter: &ProgressReporter) -> Result<()> {
    let params = args.to_params(config);
    let root = args.mailbox_root(config);
    info!("Extracting from {:?} ({})", root, params.mailbox_path);

    let question = format!(
        "¿Extraer adjuntos de '{}' a '{}'?",
        params.mailbox_path, params.destination
    );
    if !reporter.confirm(&question, cli.yes)? {
        println!("Ejecución cancelada.");
        return Ok(());
    }

    let bar = reporter.add_progress_bar();
    let extractor = AttachmentExtractor::with_options(EmlMailStore::new(root), config.extractor_options());
    let mut runner = ProcessRunner::with_callbacks(extractor, reporter.callbacks(&bar, cli.verbose));

    let result = run_with_console(&mut runner, params, reporter).await;
    bar.finish_and_clear();
    let report = result?;

    if let Some(path) = runner.context().log_path() {
        println!("Log: {}", path.display());
    }
    if let Some(path) = runner.engine().spreadsheet_path() {
        println!("Excel: {}", path.display());
    }
    print_report("RESUMEN DE EXTRACCIÓN", &report, runner.context().state(), cli.json)
}

pub async fn run_classification(
    cli: &Cli,
    folder: &std::path::Path,
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<()> {
    let params = ClassificationParams {
        source_folder: folder.to_string_lossy().into_owned(),
    };

    let question = format!("¿Clasificar los documentos de '{}'?", params.source_folder);
    if !reporter.confirm(&question, cli.yes)? {
        println!("Ejecución cancelada.");
        return Ok(());
    }

    let bar = reporter.add_progress_bar();
    let classifier = DocumentClassifier::with_options(config.classifier_options()?);
    let mut runner = ProcessRunner::with_callbacks(classifier, reporter.callbacks(&bar, cli.verbose));

    let result = run_with_console(&mut runner, params, reporter).await;
    bar.finish_and_clear();
    let report = result?;

    print_report("RESUMEN DE CLASIFICACIÓN", &report, runner.context().state(), cli.json)
}
