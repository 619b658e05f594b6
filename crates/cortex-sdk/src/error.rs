use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

/// Dispatch-layer error. Every variant carries a [`Kind`] so the wire shape
/// `{error: <Kind>, message: <text>}` (spec §6.1) can be produced without
/// inspecting which crate actually failed.
#[derive(Debug)]
pub enum Error {
    UnknownTool(String),
    InvalidParams(serde_json::Error),
    InvalidArgument(String),
    InvalidSession(String),
    DeadlineExceeded(String),
    Store(cortex_store::Error),
    Diagnostics(cortex_diagnostics::Error),
    Graph(cortex_graph::Error),
    Search(cortex_search::Error),
    Nlp(cortex_nlp::Error),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::UnknownTool(_) => Kind::InvalidArgument,
            Error::InvalidParams(_) => Kind::InvalidArgument,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
            Error::InvalidSession(_) => Kind::InvalidSession,
            Error::DeadlineExceeded(_) => Kind::ServiceUnavailable,
            Error::Store(err) => err.kind(),
            Error::Diagnostics(err) => err.kind(),
            Error::Graph(err) => err.kind(),
            Error::Search(err) => err.kind(),
            Error::Nlp(err) => err.kind(),
        }
    }

    /// The `{error, message}` wire shape (spec §6.1).
    #[must_use]
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.kind().as_str(),
            "message": self.to_string(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownTool(name) => write!(f, "unknown tool: {}", name),
            Error::InvalidParams(err) => write!(f, "invalid params: {}", err),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::InvalidSession(msg) => write!(f, "invalid session: {}", msg),
            Error::DeadlineExceeded(op) => write!(f, "deadline exceeded: {}", op),
            Error::Store(err) => write!(f, "{}", err),
            Error::Diagnostics(err) => write!(f, "{}", err),
            Error::Graph(err) => write!(f, "{}", err),
            Error::Search(err) => write!(f, "{}", err),
            Error::Nlp(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidParams(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Diagnostics(err) => Some(err),
            Error::Graph(err) => Some(err),
            Error::Search(err) => Some(err),
            Error::Nlp(err) => Some(err),
            _ => None,
        }
    }
}

impl From<cortex_store::Error> for Error {
    fn from(err: cortex_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<cortex_diagnostics::Error> for Error {
    fn from(err: cortex_diagnostics::Error) -> Self {
        Error::Diagnostics(err)
    }
}

impl From<cortex_graph::Error> for Error {
    fn from(err: cortex_graph::Error) -> Self {
        Error::Graph(err)
    }
}

impl From<cortex_search::Error> for Error {
    fn from(err: cortex_search::Error) -> Self {
        Error::Search(err)
    }
}

impl From<cortex_nlp::Error> for Error {
    fn from(err: cortex_nlp::Error) -> Self {
        Error::Nlp(err)
    }
}
