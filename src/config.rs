use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::classifier::{
    ClassifierOptions, SignatureRules, DEFAULT_SIGNED_FOLDER, DEFAULT_SIGNED_MARKERS,
    DEFAULT_UNSIGNED_FOLDER, DEFAULT_UNSIGNED_MARKERS,
};
use crate::error::{ProcessError, Result};
use crate::extractor::ExtractorOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Default subject phrases when none are given on the command line
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// Root directory of the `.eml` mail store
    #[serde(default)]
    pub mailbox_root: Option<String>,
    #[serde(default = "default_mailbox_path")]
    pub mailbox_path: String,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_spreadsheet_prefix")]
    pub spreadsheet_prefix: String,
    #[serde(default = "default_range_sample_size")]
    pub range_sample_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            phrases: Vec::new(),
            destination: None,
            mailbox_root: None,
            mailbox_path: default_mailbox_path(),
            log_prefix: default_log_prefix(),
            spreadsheet_prefix: default_spreadsheet_prefix(),
            range_sample_size: default_range_sample_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_signed_folder")]
    pub signed_folder: String,
    #[serde(default = "default_unsigned_folder")]
    pub unsigned_folder: String,
    #[serde(default = "default_unsigned_markers")]
    pub unsigned_markers: Vec<String>,
    #[serde(default = "default_signed_markers")]
    pub signed_markers: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            signed_folder: default_signed_folder(),
            unsigned_folder: default_unsigned_folder(),
            unsigned_markers: default_unsigned_markers(),
            signed_markers: default_signed_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Progress summary message every N processed items
    #[serde(default = "default_summary_every")]
    pub summary_every: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            summary_every: default_summary_every(),
        }
    }
}

fn default_mailbox_path() -> String {
    "cuenta\\Bandeja de entrada".to_string()
}

fn default_log_prefix() -> String {
    "log_extraccion".to_string()
}

fn default_spreadsheet_prefix() -> String {
    "lista_documentos".to_string()
}

fn default_range_sample_size() -> usize {
    20
}

fn default_signed_folder() -> String {
    DEFAULT_SIGNED_FOLDER.to_string()
}

fn default_unsigned_folder() -> String {
    DEFAULT_UNSIGNED_FOLDER.to_string()
}

fn default_unsigned_markers() -> Vec<String> {
    DEFAULT_UNSIGNED_MARKERS.iter().map(|m| m.to_string()).collect()
}

fn default_signed_markers() -> Vec<String> {
    DEFAULT_SIGNED_MARKERS.iter().map(|m| m.to_string()).collect()
}

fn default_summary_every() -> usize {
    10
}

fn has_path_separator(value: &str) -> bool {
    value.contains('/') || value.contains('\\')
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProcessError::Config(format!("No se pudo leer el archivo de configuración: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ProcessError::Config(format!("Archivo de configuración inválido: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProcessError::Config(format!("No se pudo crear la carpeta de configuración: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ProcessError::Config(format!("No se pudo serializar la configuración: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ProcessError::Config(format!("No se pudo escribir el archivo de configuración: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (key, prefix) in [
            ("extraction.log_prefix", &self.extraction.log_prefix),
            ("extraction.spreadsheet_prefix", &self.extraction.spreadsheet_prefix),
        ] {
            if prefix.trim().is_empty() {
                return Err(ProcessError::Config(format!("{} no puede estar vacío", key)));
            }
            if has_path_separator(prefix) {
                return Err(ProcessError::Config(format!(
                    "{} no puede contener separadores de ruta",
                    key
                )));
            }
        }

        if self.extraction.range_sample_size == 0 {
            return Err(ProcessError::Config(
                "extraction.range_sample_size debe ser al menos 1".to_string(),
            ));
        }

        let classification = &self.classification;
        for (key, folder) in [
            ("classification.signed_folder", &classification.signed_folder),
            ("classification.unsigned_folder", &classification.unsigned_folder),
        ] {
            if folder.trim().is_empty() {
                return Err(ProcessError::Config(format!("{} no puede estar vacío", key)));
            }
            if has_path_separator(folder) {
                return Err(ProcessError::Config(format!(
                    "{} no puede contener separadores de ruta",
                    key
                )));
            }
        }
        if classification.signed_folder == classification.unsigned_folder {
            return Err(ProcessError::Config(
                "classification.signed_folder y classification.unsigned_folder deben ser distintas"
                    .to_string(),
            ));
        }

        for (key, markers) in [
            ("classification.unsigned_markers", &classification.unsigned_markers),
            ("classification.signed_markers", &classification.signed_markers),
        ] {
            if markers.is_empty() {
                return Err(ProcessError::Config(format!("{} no puede estar vacío", key)));
            }
            if markers.iter().any(|marker| marker.is_empty()) {
                return Err(ProcessError::Config(format!(
                    "{} no puede contener textos vacíos",
                    key
                )));
            }
        }

        if self.reporting.summary_every == 0 {
            return Err(ProcessError::Config(
                "reporting.summary_every debe ser al menos 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }

    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            log_prefix: self.extraction.log_prefix.clone(),
            spreadsheet_prefix: self.extraction.spreadsheet_prefix.clone(),
            range_sample_size: self.extraction.range_sample_size,
            summary_every: self.reporting.summary_every,
        }
    }

    pub fn classifier_options(&self) -> Result<ClassifierOptions> {
        Ok(ClassifierOptions {
            signed_folder: self.classification.signed_folder.clone(),
            unsigned_folder: self.classification.unsigned_folder.clone(),
            rules: SignatureRules::new(
                self.classification.unsigned_markers.as_slice(),
                self.classification.signed_markers.as_slice(),
            )?,
            summary_every: self.reporting.summary_every,
        })
    }
}
