//! Mail collaborator used by the extraction pipeline.
//!
//! [`MailSource`] is the seam: folder lookup, newest-first item listing and
//! attachment saving. [`EmlMailStore`] is the shipped implementation, a directory
//! tree of RFC 822 `.eml` files where each directory is a mail folder.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use mail_parser::{MessageParser, MimeHeaders};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProcessError, Result};

/// Separator of mail folder paths, e.g. `cuenta\Bandeja de entrada\Contratos`
pub const FOLDER_SEPARATOR: char = '\\';

/// Split a backslash-delimited folder path into its non-empty segments
pub fn split_folder_path(path: &str) -> Vec<String> {
    path.split(FOLDER_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// File name to save an attachment under.
///
/// Only the final path component of the declared name is kept; attachments
/// without a usable name become `adjunto_<n>` (1-based).
pub fn sanitize_attachment_name(declared: Option<&str>, index: usize) -> String {
    let candidate = declared
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .unwrap_or_default();

    if candidate.is_empty() || candidate == "." || candidate == ".." {
        format!("adjunto_{}", index + 1)
    } else {
        candidate.to_string()
    }
}

/// Resolved mail folder
#[derive(Debug, Clone, PartialEq)]
pub struct MailFolder {
    pub name: String,
    /// Collaborator-specific locator
    pub id: String,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Position among the item's attachments
    pub index: usize,
    pub file_name: String,
    pub size: u64,
}

/// One folder entry. `received` is `None` for entries that are not mail
/// messages (meeting requests, reports, unreadable files).
#[derive(Debug, Clone, PartialEq)]
pub struct MailItem {
    pub id: String,
    pub received: Option<DateTime<FixedOffset>>,
    pub subject: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Operations the extraction pipeline needs from a mail client
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Establish the session; fails with `CollaboratorUnavailable`
    async fn connect(&self) -> Result<()>;

    /// Resolve a folder from its path segments (account first)
    async fn open_folder(&self, segments: &[String]) -> Result<MailFolder>;

    /// All items of a folder, newest first
    async fn list_items(&self, folder: &MailFolder) -> Result<Vec<MailItem>>;

    /// Write one attachment to `target`
    async fn save_attachment(
        &self,
        item: &MailItem,
        attachment: &Attachment,
        target: &Path,
    ) -> Result<()>;
}

/// Directory tree of `.eml` files
#[derive(Debug, Clone)]
pub struct EmlMailStore {
    root: PathBuf,
}

impl EmlMailStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn eml_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_eml = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("eml"))
                .unwrap_or(false);
            if is_eml && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Parse raw message bytes into a [`MailItem`]
fn parse_item(id: String, raw: &[u8]) -> MailItem {
    let Some(message) = MessageParser::default().parse(raw) else {
        debug!("Unparseable mail file {}", id);
        return MailItem {
            id,
            received: None,
            subject: None,
            attachments: Vec::new(),
        };
    };

    let received = message.date().and_then(to_fixed_offset);
    let subject = message.subject().map(str::to_string);
    let attachments = message
        .attachments()
        .enumerate()
        .map(|(index, part)| Attachment {
            index,
            file_name: sanitize_attachment_name(part.attachment_name(), index),
            size: part.contents().len() as u64,
        })
        .collect();

    MailItem {
        id,
        received,
        subject,
        attachments,
    }
}

fn to_fixed_offset(date: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_seconds = i32::from(date.tz_hour) * 3600 + i32::from(date.tz_minute) * 60;
    let offset = if date.tz_before_gmt {
        FixedOffset::west_opt(offset_seconds)?
    } else {
        FixedOffset::east_opt(offset_seconds)?
    };

    let naive = NaiveDate::from_ymd_opt(
        i32::from(date.year),
        u32::from(date.month),
        u32::from(date.day),
    )?
    .and_hms_opt(
        u32::from(date.hour),
        u32::from(date.minute),
        u32::from(date.second),
    )?;

    offset.from_local_datetime(&naive).single()
}

#[async_trait]
impl MailSource for EmlMailStore {
    async fn connect(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => {
                debug!("Mail store ready at {:?}", self.root);
                Ok(())
            }
            Ok(_) => Err(ProcessError::CollaboratorUnavailable(format!(
                "{} no es una carpeta",
                self.root.display()
            ))),
            Err(e) => Err(ProcessError::CollaboratorUnavailable(format!(
                "{}: {}",
                self.root.display(),
                e
            ))),
        }
    }

    async fn open_folder(&self, segments: &[String]) -> Result<MailFolder> {
        let Some(last) = segments.last() else {
            return Err(ProcessError::FolderNotFound(String::new()));
        };

        let mut dir = self.root.clone();
        for segment in segments {
            dir.push(segment);
            let exists = tokio::fs::metadata(&dir)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            if !exists {
                return Err(ProcessError::FolderNotFound(segment.clone()));
            }
        }

        let item_count = Self::eml_files(&dir).await?.len();
        Ok(MailFolder {
            name: last.clone(),
            id: dir.to_string_lossy().into_owned(),
            item_count,
        })
    }

    async fn list_items(&self, folder: &MailFolder) -> Result<Vec<MailItem>> {
        let mut items = Vec::new();
        for path in Self::eml_files(Path::new(&folder.id)).await? {
            let id = path.to_string_lossy().into_owned();
            match tokio::fs::read(&path).await {
                Ok(raw) => items.push(parse_item(id, &raw)),
                Err(e) => {
                    warn!("Could not read {:?}: {}", path, e);
                    items.push(MailItem {
                        id,
                        received: None,
                        subject: None,
                        attachments: Vec::new(),
                    });
                }
            }
        }

        // Newest first; entries without a timestamp go last
        items.sort_by(|a, b| b.received.cmp(&a.received));
        Ok(items)
    }

    async fn save_attachment(
        &self,
        item: &MailItem,
        attachment: &Attachment,
        target: &Path,
    ) -> Result<()> {
        let raw = tokio::fs::read(&item.id)
            .await
            .map_err(|e| ProcessError::AttachmentSave(format!("{}: {}", item.id, e)))?;

        let contents = MessageParser::default()
            .parse(&raw)
            .and_then(|message| {
                message
                    .attachments()
                    .nth(attachment.index)
                    .map(|part| part.contents().to_vec())
            })
            .ok_or_else(|| {
                ProcessError::AttachmentSave(format!(
                    "adjunto {} no encontrado en {}",
                    attachment.index, item.id
                ))
            })?;

        tokio::fs::write(target, contents)
            .await
            .map_err(|e| ProcessError::AttachmentSave(e.to_string()))
    }
}
