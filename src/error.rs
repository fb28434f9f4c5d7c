use crate::channel::Channel;
use crate::worker::WorkerIdentity;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum TallyError {
    ChannelNotFound(Channel),
    DuplicateChannel(Channel),
    RegistryUninitialized,
    ArtifactCreate { path: PathBuf, source: std::io::Error },
    ArtifactOpen { path: PathBuf, source: std::io::Error },
    NamingExhaustion { base_name: String, attempts: u32 },
    RowWidth { expected: usize, actual: usize },
    Geometry(String),
    Config(String),
    Command(String),
    Events(String),
    WorkerPanicked(WorkerIdentity),
    Io(std::io::Error),
    Json(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TallyError>;

impl fmt::Display for TallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TallyError::ChannelNotFound(c) => write!(f, "Channel {} is not registered", c),
            TallyError::DuplicateChannel(c) => write!(f, "Channel {} registered twice", c),
            TallyError::RegistryUninitialized => write!(f, "Channel registry used before initialization"),
            TallyError::ArtifactCreate { path, source } => {
                write!(f, "Cannot create artifact {}: {}", path.display(), source)
            }
            TallyError::ArtifactOpen { path, source } => {
                write!(f, "Cannot open artifact {}: {}", path.display(), source)
            }
            TallyError::NamingExhaustion { base_name, attempts } => write!(
                f,
                "No free output name for {} after {} attempts",
                base_name, attempts
            ),
            TallyError::RowWidth { expected, actual } => write!(
                f,
                "Row has {} values but {} channels are registered",
                actual, expected
            ),
            TallyError::Geometry(e) => write!(f, "Geometry error: {}", e),
            TallyError::Config(e) => write!(f, "Config error: {}", e),
            TallyError::Command(e) => write!(f, "Command error: {}", e),
            TallyError::Events(e) => write!(f, "Event input error: {}", e),
            TallyError::WorkerPanicked(id) => write!(f, "{} panicked before finishing its run", id),
            TallyError::Io(e) => write!(f, "IO error: {}", e),
            TallyError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for TallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TallyError::ArtifactCreate { source, .. } | TallyError::ArtifactOpen { source, .. } => Some(source),
            TallyError::Io(e) => Some(e),
            TallyError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        TallyError::Io(err)
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Json(err)
    }
}
