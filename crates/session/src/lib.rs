//! One browser session: the upload form's inputs, the table derived from
//! them, and the rendered output pushed to listeners.
//!
//! The graph is `data_file + header -> file_data -> file_contents`. Both
//! inputs are written only by the user's own requests, and every evaluation
//! happens through `&mut Session`, so callers serialize access with a lock.

use std::{fs, io, path::Path};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use reactive::{req, Calc, Eval, Halt, Input, Version};
use shared::{
    domain::{SessionId, UploadedFile},
    protocol::{FileSummary, OutputState, ServerEvent, SessionSnapshot},
};
use tabular::{read_csv, render_html, ParsedTable, TableError};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

pub struct Session {
    id: SessionId,
    upload_dir: TempDir,
    upload_seq: u64,
    data_file: Input<Option<UploadedFile>>,
    header: Input<bool>,
    file_data: Calc<(Version, Version), Eval<ParsedTable, TableError>>,
    file_contents: Calc<Version, OutputState>,
    published: Version,
    events: broadcast::Sender<ServerEvent>,
    last_seen: DateTime<Utc>,
}

impl Session {
    /// Creates the session's private upload directory under `upload_root`.
    /// It is removed when the session is dropped.
    pub fn new(id: SessionId, upload_root: &Path) -> anyhow::Result<Self> {
        let upload_dir = tempfile::Builder::new()
            .prefix(&format!("session-{id}-"))
            .tempdir_in(upload_root)
            .with_context(|| {
                format!(
                    "failed to create upload directory under '{}'",
                    upload_root.display()
                )
            })?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            id,
            upload_dir,
            upload_seq: 0,
            data_file: Input::new(None),
            header: Input::new(true),
            file_data: Calc::new("file_data"),
            file_contents: Calc::new("file_contents"),
            published: Version::default(),
            events,
            last_seen: Utc::now(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn data_file(&self) -> Option<&UploadedFile> {
        self.data_file.get().as_ref()
    }

    pub fn header(&self) -> bool {
        *self.header.get()
    }

    /// Stores `bytes` as the session's file, replacing any previous upload.
    pub fn accept_upload(
        &mut self,
        name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> anyhow::Result<FileSummary> {
        let datapath = self
            .upload_dir
            .path()
            .join(format!("{}.csv", self.upload_seq));
        self.upload_seq += 1;
        fs::write(&datapath, bytes)
            .with_context(|| format!("failed to write upload to '{}'", datapath.display()))?;

        let file = UploadedFile {
            name: display_name(name),
            datapath,
            size: bytes.len() as u64,
            content_type: content_type.map(str::to_string),
        };
        let summary = FileSummary::from(&file);
        info!(session = %self.id, file = %file.name, size = file.size, "file uploaded");

        if let Some(previous) = self.data_file.replace(Some(file)) {
            remove_upload(&previous);
        }
        self.flush();
        Ok(summary)
    }

    /// Returns whether the flag changed. An unchanged flag leaves the graph
    /// untouched.
    pub fn set_header(&mut self, header: bool) -> bool {
        let changed = self.header.set_if_changed(header);
        if changed {
            debug!(session = %self.id, header, "header flag changed");
            self.flush();
        }
        changed
    }

    /// Current rendered output, recomputing only what changed since the last
    /// evaluation.
    pub fn output(&mut self) -> OutputState {
        let key = (self.data_file.version(), self.header.version());
        let data_file = self.data_file.get().as_ref();
        let header = *self.header.get();
        let id = self.id;
        self.file_data.get(key, || load_table(id, data_file, header));

        let generation = self.file_data.generation();
        let file_data = &self.file_data;
        self.file_contents
            .get(generation, || render_output(file_data.peek(), data_file))
            .clone()
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        let output = self.output();
        SessionSnapshot {
            session_id: self.id,
            data_file: self.data_file().map(FileSummary::from),
            header: self.header(),
            output,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_seen
    }

    /// Re-evaluates the output and notifies listeners when it was re-rendered.
    fn flush(&mut self) {
        let output = self.output();
        let generation = self.file_contents.generation();
        if generation == self.published {
            return;
        }
        self.published = generation;
        // No listeners is fine; the next page load reads the output directly.
        let _ = self.events.send(ServerEvent::OutputUpdated { output });
    }
}

fn load_table(
    session: SessionId,
    data_file: Option<&UploadedFile>,
    header: bool,
) -> Eval<ParsedTable, TableError> {
    let file = req::<_, TableError>(data_file)?;
    read_csv(&file.datapath, header).map_err(|err| {
        warn!(%session, file = %file.name, error = %err, "failed to parse upload");
        Halt::Failed(err)
    })
}

fn render_output(
    parsed: Option<&Eval<ParsedTable, TableError>>,
    data_file: Option<&UploadedFile>,
) -> OutputState {
    match (parsed, data_file) {
        (Some(Ok(table)), Some(file)) => OutputState::Rendered {
            file: FileSummary::from(file),
            table: table.to_view(),
            html: render_html(table),
        },
        (Some(Err(Halt::Failed(err))), _) => OutputState::Failed { error: err.into() },
        _ => OutputState::Idle,
    }
}

/// Browsers send a bare file name, but some older ones include a client path.
fn display_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    if base.is_empty() {
        "upload.csv".to_string()
    } else {
        base.to_string()
    }
}

fn remove_upload(file: &UploadedFile) {
    if let Err(error) = fs::remove_file(&file.datapath) {
        if error.kind() != io::ErrorKind::NotFound {
            warn!(path = %file.datapath.display(), %error, "failed to remove superseded upload");
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
