//! Filesystem helpers shared by both pipelines

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Attempts with numeric suffixes before falling back to a timestamp suffix
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Return `path` if nothing exists there, otherwise the first free
/// `stem_N.ext` sibling. Falls back to a timestamp suffix after
/// [`MAX_SUFFIX_ATTEMPTS`] so the search always terminates.
pub fn resolve_unique_name(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let folder = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for counter in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = folder.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    tracing::warn!(
        "No free numeric suffix for {:?} after {} attempts, using timestamp",
        path,
        MAX_SUFFIX_ATTEMPTS
    );
    folder.join(format!("{}_{}{}", stem, timestamp, extension))
}

/// Whether the current process may write into `path`. No side effects.
///
/// Asks the kernel with `access(W_OK)`, so ownership, group membership and
/// read-only mounts are all taken into account.
#[cfg(unix)]
pub fn has_write_permission(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let allowed = unsafe { libc::access(c_path.as_ptr(), libc::W_OK) } == 0;
    if !allowed {
        tracing::debug!(
            "No write access to {:?} (uid={})",
            path,
            unsafe { libc::geteuid() }
        );
    }
    allowed
}

#[cfg(not(unix))]
pub fn has_write_permission(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|metadata| !metadata.permissions().readonly())
        .unwrap_or(false)
}

/// Check that `folder` names an existing directory.
///
/// `label` is the human-readable name used in the error message
/// (e.g. "carpeta de origen").
pub fn validate_folder_exists(folder: &str, label: &str) -> Result<(), String> {
    if folder.trim().is_empty() {
        return Err(format!("Debe seleccionar una {}", label));
    }

    let path = Path::new(folder);
    if !path.exists() {
        return Err(format!("La {} no existe", label));
    }

    if !path.is_dir() {
        return Err(format!("La ruta no es una {} válida", label));
    }

    Ok(())
}

/// Check that both ends of a range are present and ordered
pub fn validate_date_range<T: PartialOrd>(start: Option<T>, end: Option<T>) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) => {
            if start > end {
                return Err("La fecha de inicio no puede ser posterior a la fecha fin".to_string());
            }
            Ok(())
        }
        _ => Err("Debe seleccionar fechas de inicio y fin".to_string()),
    }
}

/// `12.3s` below a minute, `2min 5.0s` above
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        let minutes = (seconds / 60.0).floor();
        let rest = seconds - minutes * 60.0;
        format!("{}min {:.1}s", minutes as u64, rest)
    }
}

/// `<prefix>_fecha(dd.mm.YYYY)_hora(HH.MM.SS).<extension>`
pub fn timestamped_file_name(prefix: &str, extension: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_fecha({})_hora({}).{}",
        prefix,
        at.format("%d.%m.%Y"),
        at.format("%H.%M.%S"),
        extension
    )
}
