use serde::{Deserialize, Serialize};

use crate::{
    domain::{SessionId, UploadedFile},
    error::ApiError,
};

/// Display form of a parsed table: every cell already rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
}

impl From<&UploadedFile> for FileSummary {
    fn from(file: &UploadedFile) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OutputState {
    Idle,
    Rendered {
        file: FileSummary,
        table: TableView,
        html: String,
    },
    Failed {
        error: ApiError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub data_file: Option<FileSummary>,
    pub header: bool,
    pub output: OutputState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    OutputUpdated { output: OutputState },
}
