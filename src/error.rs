use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy for portal queries.
///
/// `filter` fields carry the parameter combination that failed
/// (e.g. `ano=2023 sexo=M cid=C50`) so callers fanning out many
/// requests can tell which one went wrong.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any network call was attempted.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed building HTTP client: {0}")]
    Setup(#[source] reqwest::Error),

    #[error("request failed for {filter}: {source}")]
    Request {
        filter: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("portal returned status {status} for {filter}")]
    Status {
        filter: String,
        status: reqwest::StatusCode,
    },

    /// The response carried neither a result table nor the portal's
    /// "no records" marker. The page layout has likely changed.
    #[error("unrecognized portal response for {filter}; body starts with: {snippet}")]
    PortalFormatChanged { filter: String, snippet: String },

    /// The portal explicitly answered "Nenhum registro" for this filter.
    #[error("no records for {filter}")]
    NoData { filter: String },

    /// Every sub-query of a fan-out failed.
    #[error("all {total} sub-queries failed for {filter}")]
    AllShardsFailed { filter: String, total: usize },
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}
