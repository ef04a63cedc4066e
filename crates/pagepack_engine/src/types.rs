use std::fmt;

use chrono::{DateTime, Utc};
use pagepack_core::ResourceKind;
use url::Url;

/// Where a discovered reference's content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefLocation {
    /// Independent network location.
    Remote(Url),
    /// Embedded content with no location of its own (inline scripts/styles,
    /// the serialized active document).
    Inline { body: String },
}

/// One candidate resource produced by discovery. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    pub kind: ResourceKind,
    /// The reference exactly as it appeared in the document.
    pub raw_ref: String,
    pub location: RefLocation,
}

impl ResourceReference {
    pub fn remote(kind: ResourceKind, raw_ref: impl Into<String>, url: Url) -> Self {
        Self {
            kind,
            raw_ref: raw_ref.into(),
            location: RefLocation::Remote(url),
        }
    }

    pub fn inline(kind: ResourceKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            raw_ref: "inline".to_string(),
            location: RefLocation::Inline { body: body.into() },
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match &self.location {
            RefLocation::Remote(url) => Some(url),
            RefLocation::Inline { .. } => None,
        }
    }
}

/// Resource content as it will be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Result of one retrieval attempt. One-to-one with an attempted reference;
/// never retried within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub reference: ResourceReference,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Retrieved {
        payload: Payload,
        fetched_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
}

impl FetchedResource {
    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            FetchOutcome::Retrieved { payload, .. } => Some(payload),
            FetchOutcome::Failed { .. } => None,
        }
    }
}

/// One entry in the ordered status stream consumed by the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusEvent {
    pub message: String,
    pub progress_percent: Option<u8>,
    pub error: Option<String>,
    pub done: bool,
}

impl StatusEvent {
    pub fn phase(message: impl Into<String>, percent: u8) -> Self {
        Self {
            message: message.into(),
            progress_percent: Some(percent),
            ..Self::default()
        }
    }

    pub fn warning(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress_percent: Some(100),
            done: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress_percent: None,
            error: Some(error.into()),
            done: true,
        }
    }
}

/// Ordered sink for status events; the host UI lives behind this.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// The finished archive: container bytes plus a suggested download name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    pub bytes: Vec<u8>,
    pub suggested_name: String,
    pub entry_count: usize,
}
