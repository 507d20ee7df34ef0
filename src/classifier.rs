//! Document classification pipeline with name-based signature rules

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::fs_utils::{has_write_permission, resolve_unique_name, validate_folder_exists};
use crate::lifecycle::{Pipeline, ProcessContext};
use crate::models::{
    ClassificationPhase, ClassificationReport, ClassificationStats, MessageLevel, ProcessState,
};

pub const DEFAULT_SIGNED_FOLDER: &str = "Documentos Firmados";
pub const DEFAULT_UNSIGNED_FOLDER: &str = "Documentos sin Firmar";

pub const DEFAULT_UNSIGNED_MARKERS: [&str; 6] = [
    "sin firmar",
    "sin_firmar",
    "sinfirmar",
    "not signed",
    "not_signed",
    "notsigned",
];

pub const DEFAULT_SIGNED_MARKERS: [&str; 2] = ["firmado", "signed"];

static DEFAULT_RULES: Lazy<SignatureRules> = Lazy::new(|| SignatureRules {
    unsigned: marker_pattern(DEFAULT_UNSIGNED_MARKERS).unwrap(),
    signed: marker_pattern(DEFAULT_SIGNED_MARKERS).unwrap(),
});

/// Case-insensitive alternation of literal markers
fn marker_pattern<I, S>(markers: I) -> std::result::Result<Regex, regex::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let alternatives: Vec<String> = markers
        .into_iter()
        .map(|marker| regex::escape(marker.as_ref()))
        .collect();
    Regex::new(&format!("(?i)({})", alternatives.join("|")))
}

/// Outcome of matching a file name against the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Unsigned,
    Signed,
    /// Matches neither rule; the file stays where it is
    Unmatched,
}

/// Substring rules on file names. Unsigned markers win over signed ones, so
/// `contrato_firmado_sin_firmar.pdf` is unsigned.
#[derive(Debug, Clone)]
pub struct SignatureRules {
    unsigned: Regex,
    signed: Regex,
}

impl SignatureRules {
    pub fn new<S: AsRef<str>>(unsigned_markers: &[S], signed_markers: &[S]) -> Result<Self> {
        if unsigned_markers.is_empty() || signed_markers.is_empty() {
            return Err(ProcessError::Config(
                "las listas de marcadores no pueden estar vacías".to_string(),
            ));
        }

        let unsigned = marker_pattern(unsigned_markers)
            .map_err(|e| ProcessError::Config(format!("marcadores sin firmar inválidos: {}", e)))?;
        let signed = marker_pattern(signed_markers)
            .map_err(|e| ProcessError::Config(format!("marcadores de firmado inválidos: {}", e)))?;

        Ok(Self { unsigned, signed })
    }

    pub fn classify_name(&self, name: &str) -> SignatureStatus {
        if self.unsigned.is_match(name) {
            SignatureStatus::Unsigned
        } else if self.signed.is_match(name) {
            SignatureStatus::Signed
        } else {
            SignatureStatus::Unmatched
        }
    }
}

impl Default for SignatureRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub signed_folder: String,
    pub unsigned_folder: String,
    pub rules: SignatureRules,
    /// Emit a progress summary every N files
    pub summary_every: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            signed_folder: DEFAULT_SIGNED_FOLDER.to_string(),
            unsigned_folder: DEFAULT_UNSIGNED_FOLDER.to_string(),
            rules: SignatureRules::default(),
            summary_every: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationParams {
    pub source_folder: String,
}

/// Sorts the files of a folder into signed and unsigned subfolders
pub struct DocumentClassifier {
    options: ClassifierOptions,
    stats: ClassificationStats,
}

impl DocumentClassifier {
    pub fn new() -> Self {
        Self::with_options(ClassifierOptions::default())
    }

    pub fn with_options(options: ClassifierOptions) -> Self {
        Self {
            options,
            stats: ClassificationStats::default(),
        }
    }

    pub fn stats(&self) -> &ClassificationStats {
        &self.stats
    }

    /// Regular files directly inside `folder`, in name order.
    /// Symlinks count when their target is a file; dangling links are ignored.
    async fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn classify_file(
        &mut self,
        ctx: &ProcessContext<ClassificationPhase>,
        file: &Path,
        signed_dir: &Path,
        unsigned_dir: &Path,
    ) {
        let phase = ClassificationPhase::Classifying;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let status = self.options.rules.classify_name(&name);
        let target_dir = match status {
            SignatureStatus::Unsigned => unsigned_dir,
            SignatureStatus::Signed => signed_dir,
            SignatureStatus::Unmatched => {
                self.stats.skipped += 1;
                debug!("No signature marker in {:?}", name);
                return;
            }
        };

        let target = resolve_unique_name(&target_dir.join(&name));
        match tokio::fs::rename(file, &target).await {
            Ok(()) => match status {
                SignatureStatus::Unsigned => {
                    self.stats.unsigned += 1;
                    ctx.emit(phase, MessageLevel::Warning, format!("⚠️ Sin firmar: {}", name));
                }
                _ => {
                    self.stats.signed += 1;
                    ctx.emit(phase, MessageLevel::Success, format!("✅ Firmado: {}", name));
                }
            },
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                self.stats.errors += 1;
                ctx.emit(
                    phase,
                    MessageLevel::Error,
                    format!("❌ Archivo bloqueado: {}", name),
                );
            }
            Err(e) => {
                self.stats.errors += 1;
                ctx.emit(
                    phase,
                    MessageLevel::Error,
                    format!("❌ Error con {}: {}", name, e),
                );
            }
        }
    }
}

impl Default for DocumentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for DocumentClassifier {
    type Phase = ClassificationPhase;
    type Params = ClassificationParams;
    type Report = ClassificationReport;

    const NAME: &'static str = "Clasificación";

    async fn validate(
        &self,
        _ctx: &ProcessContext<ClassificationPhase>,
        params: &ClassificationParams,
    ) -> std::result::Result<(), String> {
        validate_folder_exists(&params.source_folder, "carpeta de origen")?;

        if !has_write_permission(Path::new(&params.source_folder)) {
            return Err("No tiene permisos de escritura en la carpeta".to_string());
        }

        Ok(())
    }

    async fn run_main(
        &mut self,
        ctx: &ProcessContext<ClassificationPhase>,
        params: &ClassificationParams,
    ) -> Result<ClassificationReport> {
        self.stats = ClassificationStats::started_now();
        ctx.change_phase(ClassificationPhase::Initial);

        let source = PathBuf::from(&params.source_folder);
        let signed_dir = source.join(&self.options.signed_folder);
        let unsigned_dir = source.join(&self.options.unsigned_folder);

        if !ctx.ensure_directory(&signed_dir).await {
            return Err(ProcessError::DirectoryCreation(
                "No se pudo crear carpeta de firmados".to_string(),
            ));
        }
        if !ctx.ensure_directory(&unsigned_dir).await {
            return Err(ProcessError::DirectoryCreation(
                "No se pudo crear carpeta de sin firmar".to_string(),
            ));
        }
        ctx.emit(
            ClassificationPhase::Initial,
            MessageLevel::Success,
            "Carpetas de destino creadas correctamente",
        );

        let files = Self::list_files(&source).await?;
        let total = files.len();
        self.stats.total = total;

        if total == 0 {
            ctx.emit(
                ClassificationPhase::Initial,
                MessageLevel::Warning,
                "No se encontraron archivos para clasificar",
            );
            self.stats.clock.finish();
            return Ok(self.build_report());
        }

        ctx.emit(
            ClassificationPhase::Initial,
            MessageLevel::Info,
            format!("Se encontraron {} archivos para clasificar", total),
        );

        ctx.change_phase(ClassificationPhase::Classifying);
        ctx.set_state(ProcessState::Classifying);

        let summary_every = self.options.summary_every.max(1);
        for (index, file) in files.iter().enumerate() {
            ctx.checkpoint().await?;

            self.classify_file(ctx, file, &signed_dir, &unsigned_dir)
                .await;

            let processed = index + 1;
            ctx.update_progress(processed, total);
            if processed % summary_every == 0 || processed == total {
                ctx.emit(
                    ClassificationPhase::Classifying,
                    MessageLevel::Info,
                    format!(
                        "Procesados: {}/{} ({:.1}%)",
                        processed,
                        total,
                        processed as f64 / total as f64 * 100.0
                    ),
                );
            }
        }

        ctx.change_phase(ClassificationPhase::Finalizing);
        self.stats.clock.finish();
        ctx.emit(
            ClassificationPhase::Finalizing,
            MessageLevel::Success,
            format!(
                "Clasificación completada: {} firmados, {} sin firmar",
                self.stats.signed, self.stats.unsigned
            ),
        );

        Ok(self.build_report())
    }

    fn build_report(&self) -> ClassificationReport {
        self.stats.to_report()
    }
}
