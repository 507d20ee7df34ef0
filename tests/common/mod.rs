//! Common test utilities and fixtures

#![allow(dead_code)]

use attachment_sorter::{Callbacks, MessageLevel, Phase, ProcessState};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Everything the sinks received, in order
pub struct Recorded<P> {
    pub messages: Mutex<Vec<(P, MessageLevel, String)>>,
    pub progress: Mutex<Vec<(usize, usize, f64)>>,
    pub states: Mutex<Vec<ProcessState>>,
}

impl<P: Phase> Recorded<P> {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn has_message(&self, level: MessageLevel, fragment: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(_, l, text)| *l == level && text.contains(fragment))
    }

    pub fn phases(&self) -> Vec<P> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(phase, _, _)| *phase)
            .collect()
    }

    pub fn states(&self) -> Vec<ProcessState> {
        self.states.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(usize, usize, f64)> {
        self.progress.lock().unwrap().clone()
    }
}

/// Callbacks that record into a shared [`Recorded`]
pub fn recording_callbacks<P: Phase>() -> (Callbacks<P>, Arc<Recorded<P>>) {
    let recorded = Arc::new(Recorded {
        messages: Mutex::new(Vec::new()),
        progress: Mutex::new(Vec::new()),
        states: Mutex::new(Vec::new()),
    });

    let messages = Arc::clone(&recorded);
    let progress = Arc::clone(&recorded);
    let states = Arc::clone(&recorded);

    let callbacks = Callbacks::noop()
        .on_message(move |phase, level, text| {
            messages
                .messages
                .lock()
                .unwrap()
                .push((phase, level, text.to_string()));
        })
        .on_progress(move |current, total, percent| {
            progress.progress.lock().unwrap().push((current, total, percent));
        })
        .on_state(move |state| states.states.lock().unwrap().push(state));

    (callbacks, recorded)
}

/// RFC 822 message with one attachment per entry of `files`
pub fn eml(subject: &str, date: &str, files: &[(&str, &[u8])]) -> String {
    let mut body = format!(
        "From: remitente@example.com\r\n\
         To: destino@example.com\r\n\
         Subject: {}\r\n\
         Date: {}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"LIMITE\"\r\n\
         \r\n\
         --LIMITE\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Cuerpo del mensaje.\r\n",
        subject, date
    );

    for (name, contents) in files {
        body.push_str(&format!(
            "--LIMITE\r\n\
             Content-Type: application/octet-stream; name=\"{name}\"\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {}\r\n",
            base64(contents),
            name = name
        ));
    }

    body.push_str("--LIMITE--\r\n");
    body
}

/// Minimal base64 encoder for fixtures
fn base64(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::new();
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        out.push(ALPHABET[(n >> 18) as usize & 63] as char);
        out.push(ALPHABET[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}

/// Create the nested mail folder `segments` under `root`
pub fn mail_folder(root: &Path, segments: &[&str]) -> PathBuf {
    let dir = segments.iter().fold(root.to_path_buf(), |dir, s| dir.join(s));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write `content` to `dir/name` and return the path
pub fn write_file(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Names of the regular files directly inside `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
