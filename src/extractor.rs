//! Attachment extraction pipeline.
//!
//! Filters a mail folder by received date and subject phrases, saves the
//! attachments of every matching message into a destination folder, and
//! lists what was saved in a spreadsheet.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ProcessError, Result};
use crate::fs_utils::{resolve_unique_name, validate_date_range};
use crate::lifecycle::{Pipeline, ProcessContext};
use crate::mailbox::{split_folder_path, MailFolder, MailItem, MailSource};
use crate::models::{
    DownloadedFile, ExtractionPhase, ExtractionReport, ExtractionStats, MessageLevel,
    ProcessState,
};
use crate::spreadsheet::write_document_list;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Inputs of one extraction run
#[derive(Debug, Clone, Default)]
pub struct ExtractionParams {
    /// Subject phrases; a message matches if its subject contains any of them
    pub phrases: Vec<String>,
    pub destination: String,
    /// Backslash-delimited folder path, account first
    pub mailbox_path: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ExtractionParams {
    /// Lower-cased, trimmed, non-empty phrases
    fn normalized_phrases(&self) -> Vec<String> {
        self.phrases
            .iter()
            .map(|phrase| phrase.trim().to_lowercase())
            .filter(|phrase| !phrase.is_empty())
            .collect()
    }
}

/// Tunables of the extraction pipeline
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub log_prefix: String,
    pub spreadsheet_prefix: String,
    /// Items inspected at each end of the folder to estimate its date range
    pub range_sample_size: usize,
    /// Emit a progress summary every N messages during download
    pub summary_every: usize,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            log_prefix: "log_extraccion".to_string(),
            spreadsheet_prefix: "lista_documentos".to_string(),
            range_sample_size: 20,
            summary_every: 10,
        }
    }
}

/// Message selected by the filter, with its timezone-stripped timestamp
#[derive(Debug, Clone)]
struct Candidate {
    item: MailItem,
    received: NaiveDateTime,
}

pub struct AttachmentExtractor<M: MailSource> {
    source: M,
    options: ExtractorOptions,
    stats: ExtractionStats,
    spreadsheet: Option<PathBuf>,
}

impl<M: MailSource> AttachmentExtractor<M> {
    pub fn new(source: M) -> Self {
        Self::with_options(source, ExtractorOptions::default())
    }

    pub fn with_options(source: M, options: ExtractorOptions) -> Self {
        Self {
            source,
            options,
            stats: ExtractionStats::default(),
            spreadsheet: None,
        }
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// Spreadsheet written by the last run, if any
    pub fn spreadsheet_path(&self) -> Option<&Path> {
        self.spreadsheet.as_deref()
    }

    async fn open_mail_folder(
        &self,
        ctx: &ProcessContext<ExtractionPhase>,
        mailbox_path: &str,
    ) -> Result<MailFolder> {
        let phase = ExtractionPhase::Initial;

        if let Err(e) = self.source.connect().await {
            let message = format!("Error al conectar con el cliente de correo: {}", e);
            ctx.emit(phase, MessageLevel::Error, &message);
            return Err(match e {
                ProcessError::CollaboratorUnavailable(_) => e,
                other => ProcessError::CollaboratorUnavailable(other.to_string()),
            });
        }
        ctx.emit(
            phase,
            MessageLevel::Success,
            "Conectado al cliente de correo exitosamente",
        );

        ctx.emit(
            phase,
            MessageLevel::Info,
            format!("Buscando carpeta: {}", mailbox_path),
        );
        let segments = split_folder_path(mailbox_path);
        match self.source.open_folder(&segments).await {
            Ok(folder) => {
                ctx.emit(
                    phase,
                    MessageLevel::Success,
                    format!("Carpeta encontrada: {} ({} elementos)", folder.name, folder.item_count),
                );
                Ok(folder)
            }
            Err(e) => {
                ctx.emit(
                    phase,
                    MessageLevel::Error,
                    format!("Error al acceder a la carpeta '{}': {}", mailbox_path, e),
                );
                Err(e)
            }
        }
    }

    /// Advisory comparison of the requested range with the folder's dates.
    ///
    /// Only the newest and oldest `range_sample_size` items are inspected.
    fn report_folder_range(
        &self,
        ctx: &ProcessContext<ExtractionPhase>,
        items: &[MailItem],
        start: NaiveDate,
        end: NaiveDate,
    ) {
        let sample = self.options.range_sample_size.max(1);
        let newest = items
            .iter()
            .take(sample)
            .find_map(|item| item.received)
            .map(|received| received.naive_local().date());
        let oldest = items
            .iter()
            .rev()
            .take(sample)
            .find_map(|item| item.received)
            .map(|received| received.naive_local().date());

        let (Some(oldest), Some(newest)) = (oldest, newest) else {
            debug!("No dated items in the sampled range of the folder");
            return;
        };

        let phase = ExtractionPhase::Filtering;
        ctx.emit(
            phase,
            MessageLevel::Info,
            format!("📅 Rango real en bandeja: {} a {}", oldest, newest),
        );
        if start < oldest {
            ctx.emit(
                phase,
                MessageLevel::Warning,
                format!(
                    "⚠️ Fecha inicio ({}) es anterior a la primera fecha en bandeja ({})",
                    start, oldest
                ),
            );
        }
        if end > newest {
            ctx.emit(
                phase,
                MessageLevel::Warning,
                format!(
                    "⚠️ Fecha fin ({}) es posterior a la última fecha en bandeja ({})",
                    end, newest
                ),
            );
        }
    }

    async fn filter_items(
        &mut self,
        ctx: &ProcessContext<ExtractionPhase>,
        folder: &MailFolder,
        params: &ExtractionParams,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candidate>> {
        ctx.change_phase(ExtractionPhase::Filtering);
        ctx.set_state(ProcessState::Filtering);
        let phase = ExtractionPhase::Filtering;

        let items = self.source.list_items(folder).await?;
        let total = items.len();
        ctx.emit(
            phase,
            MessageLevel::Info,
            format!("Iniciando filtrado de correos (Total: {})", total),
        );

        let range_start = start.and_time(chrono::NaiveTime::MIN);
        let range_end = end.and_hms_micro_opt(23, 59, 59, 999_999).ok_or_else(|| {
            ProcessError::Unexpected(format!("fecha fin fuera de rango: {}", end))
        })?;
        ctx.emit(
            phase,
            MessageLevel::Info,
            format!("Rango de fechas solicitado: {} a {}", start, end),
        );

        self.report_folder_range(ctx, &items, start, end);

        let phrases = params.normalized_phrases();
        let step = (total / 10).max(1);
        let mut candidates = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            ctx.checkpoint().await?;

            let position = index + 1;
            if position % step == 0 || position == total {
                ctx.emit(
                    phase,
                    MessageLevel::Info,
                    format!(
                        "Filtrando: {}/{} ({:.1}%)",
                        position,
                        total,
                        position as f64 / total as f64 * 100.0
                    ),
                );
                ctx.update_progress(position, total);
            }

            let Some(received) = item.received else {
                self.stats.items_skipped += 1;
                ctx.emit(
                    phase,
                    MessageLevel::Debug,
                    format!("Elemento {} omitido: no es un correo", position),
                );
                continue;
            };

            let received = received.naive_local();
            if received < range_start || received > range_end {
                continue;
            }

            if !phrases.is_empty() {
                let subject = item.subject.as_deref().unwrap_or_default().to_lowercase();
                if !phrases.iter().any(|phrase| subject.contains(phrase.as_str())) {
                    continue;
                }
            }

            if item.attachments.is_empty() {
                continue;
            }

            candidates.push(Candidate { item, received });
        }

        self.stats.emails_found = candidates.len();
        ctx.emit(
            phase,
            MessageLevel::Success,
            format!(
                "Filtrado completado: {} correos con adjuntos encontrados",
                candidates.len()
            ),
        );
        Ok(candidates)
    }

    async fn download_attachments(
        &mut self,
        ctx: &ProcessContext<ExtractionPhase>,
        candidates: &[Candidate],
        destination: &Path,
    ) -> Result<()> {
        ctx.change_phase(ExtractionPhase::Downloading);
        ctx.set_state(ProcessState::Processing);
        let phase = ExtractionPhase::Downloading;

        let total = candidates.len();
        ctx.emit(
            phase,
            MessageLevel::Info,
            format!("Iniciando descarga de adjuntos de {} correos", total),
        );

        let summary_every = self.options.summary_every.max(1);
        for (index, candidate) in candidates.iter().enumerate() {
            ctx.checkpoint().await?;

            for attachment in &candidate.item.attachments {
                ctx.checkpoint().await?;

                let target = resolve_unique_name(&destination.join(&attachment.file_name));
                match self
                    .source
                    .save_attachment(&candidate.item, attachment, &target)
                    .await
                {
                    Ok(()) => {
                        let bytes = tokio::fs::metadata(&target)
                            .await
                            .map(|metadata| metadata.len())
                            .unwrap_or(attachment.size);
                        let size_mb = bytes as f64 / BYTES_PER_MB;
                        let name = target
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| attachment.file_name.clone());

                        self.stats.total_size_mb += size_mb;
                        self.stats.attachments_downloaded += 1;
                        self.stats
                            .downloaded_files
                            .push(DownloadedFile::new(name.clone(), candidate.received));

                        ctx.emit(
                            phase,
                            MessageLevel::Success,
                            format!("✓ Descargado: {} ({:.2} MB)", name, size_mb),
                        );
                    }
                    Err(e) => {
                        self.stats.attachments_failed += 1;
                        ctx.emit(
                            phase,
                            MessageLevel::Error,
                            format!("✗ Error al descargar {}: {}", attachment.file_name, e),
                        );
                    }
                }
            }

            self.stats.emails_processed += 1;
            let position = index + 1;
            ctx.update_progress(position, total);

            if position % summary_every == 0 || position == total {
                ctx.emit(
                    phase,
                    MessageLevel::Info,
                    format!(
                        "Procesados: {}/{} correos ({:.1}%)",
                        position,
                        total,
                        position as f64 / total as f64 * 100.0
                    ),
                );
            }
        }

        ctx.emit(
            phase,
            MessageLevel::Success,
            format!(
                "Descarga completada: {} adjuntos descargados",
                self.stats.attachments_downloaded
            ),
        );
        Ok(())
    }

    async fn write_spreadsheet(&mut self, ctx: &ProcessContext<ExtractionPhase>, destination: &Path) {
        let phase = ExtractionPhase::Finalizing;

        if self.stats.downloaded_files.is_empty() {
            ctx.emit(phase, MessageLevel::Info, "No hay archivos para listar en Excel");
            return;
        }

        ctx.emit(
            phase,
            MessageLevel::Info,
            "Generando archivo Excel con listado...",
        );

        let folder = destination.to_path_buf();
        let prefix = self.options.spreadsheet_prefix.clone();
        let files = self.stats.downloaded_files.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            write_document_list(&folder, &prefix, &files, Local::now())
        })
        .await
        .map_err(|e| ProcessError::Spreadsheet(e.to_string()))
        .and_then(|result| result);

        match outcome {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ctx.emit(
                    phase,
                    MessageLevel::Success,
                    format!("Excel generado: {}", name),
                );
                self.spreadsheet = Some(path);
            }
            Err(e) => {
                ctx.emit(
                    phase,
                    MessageLevel::Warning,
                    format!("Error al generar Excel: {}", e),
                );
            }
        }
    }
}

#[async_trait]
impl<M: MailSource> Pipeline for AttachmentExtractor<M> {
    type Phase = ExtractionPhase;
    type Params = ExtractionParams;
    type Report = ExtractionReport;

    const NAME: &'static str = "Extracción";

    async fn validate(
        &self,
        ctx: &ProcessContext<ExtractionPhase>,
        params: &ExtractionParams,
    ) -> std::result::Result<(), String> {
        if params.destination.trim().is_empty() {
            return Err("Debe seleccionar una carpeta de destino".to_string());
        }

        if params.mailbox_path.trim().is_empty() {
            return Err("Debe seleccionar una bandeja de correo".to_string());
        }

        validate_date_range(params.start_date, params.end_date)?;

        tokio::fs::create_dir_all(&params.destination)
            .await
            .map_err(|e| format!("No se puede crear la carpeta de destino: {}", e))?;

        if params.normalized_phrases().is_empty() {
            ctx.emit(
                ExtractionPhase::Initial,
                MessageLevel::Warning,
                "No se especificaron frases: se descargarán todos los adjuntos",
            );
        }

        Ok(())
    }

    async fn run_main(
        &mut self,
        ctx: &ProcessContext<ExtractionPhase>,
        params: &ExtractionParams,
    ) -> Result<ExtractionReport> {
        self.stats = ExtractionStats::started_now();
        self.spreadsheet = None;

        let (Some(start), Some(end)) = (params.start_date, params.end_date) else {
            return Err(ProcessError::ValidationFailed(
                "Debe seleccionar fechas de inicio y fin".to_string(),
            ));
        };
        let destination = PathBuf::from(&params.destination);

        ctx.begin_file_log(&destination, &self.options.log_prefix);
        let folder = self.open_mail_folder(ctx, &params.mailbox_path).await?;

        let candidates = self.filter_items(ctx, &folder, params, start, end).await?;
        if candidates.is_empty() {
            ctx.emit(
                ExtractionPhase::Filtering,
                MessageLevel::Warning,
                "No se encontraron correos con los criterios especificados",
            );
            self.stats.clock.finish();
            return Ok(self.build_report());
        }

        self.download_attachments(ctx, &candidates, &destination)
            .await?;

        ctx.change_phase(ExtractionPhase::Finalizing);
        self.stats.clock.finish();
        self.write_spreadsheet(ctx, &destination).await;

        ctx.emit(
            ExtractionPhase::Finalizing,
            MessageLevel::Success,
            format!(
                "Proceso completado: {} adjuntos descargados",
                self.stats.attachments_downloaded
            ),
        );
        info!(
            "Extraction finished: {} downloaded, {} failed, {} skipped",
            self.stats.attachments_downloaded, self.stats.attachments_failed, self.stats.items_skipped
        );

        Ok(self.build_report())
    }

    fn build_report(&self) -> ExtractionReport {
        self.stats.to_report()
    }
}
