//! Error types.

use axum::extract::rejection::QueryRejection;
use std::net::IpAddr;
use trust_dns_proto::error::ProtoError;

/// Error enumerates the possible Zone Crab error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when submitted zone content is rejected by `named-checkzone`, or when content
    /// that passed the check could not be activated by a reload and was rolled back. In both
    /// cases the caller should edit the zone and resubmit. Carries the checker diagnostic.
    #[error("bad zone file: {0}")]
    BadZoneFile(String),

    /// Returned when the zone checker fails for a reason other than the zone being malformed,
    /// e.g. the checker binary could not be spawned.
    #[error("error checking the zone: {0}")]
    ZoneFileCheck(String),

    /// Returned when a candidate zone file can't be staged, or the backup/replace step of a
    /// commit hits a filesystem error. Not user correctable.
    #[error("internal file system error")]
    ZoneStaging(#[source] std::io::Error),

    /// Returned when an administrative regeneration of a zone or configuration artifact fails.
    #[error("zone creation failed: {0}")]
    ZoneCreation(String),

    /// Returned when a dynamic update can't locate a safely editable address record, or the
    /// edited zone does not validate.
    #[error("record update failed: {0}")]
    RecordUpdate(String),

    /// Returned when rolling back a failed reload also failed. The running `named` is in an
    /// unknown state and an operator has to step in.
    #[error("fatal inconsistency: {0}")]
    FatalInconsistency(String),

    /// Returned when `named` can't be validated and started even after a full reset.
    #[error("startup failed: {0}")]
    Startup(String),

    /// Returned when a request arrives without the authenticated user header.
    #[error("no authenticated user")]
    Unauthenticated,

    /// Returned when a username is not a single lowercase DNS label.
    #[error("invalid username: \"{0}\"")]
    InvalidUsername(String),

    /// Returned when a dynamic update presents a token no user owns.
    #[error("unknown token")]
    UnknownToken,

    /// Returned when a dynamic update has no IPv4 address to set.
    #[error("{0} is not an IPv4 address")]
    NotIPv4(IpAddr),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The API trusts the
    /// authenticated user header set by a reverse proxy, so it must never be reachable directly.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when clients send a malformed query string.
    #[error(transparent)]
    QueryExtractorRejection(#[from] QueryRejection),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when the JSON config file can't be parsed.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when a template is missing or fails to render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Returned when a DNS name can't be parsed or joined.
    #[error("invalid DNS name")]
    DNSName(#[from] ProtoError),
}

/// `NamedError` enumerates the failures of the external `named` tooling.
#[derive(thiserror::Error, Debug)]
pub enum NamedError {
    #[error("named-checkconf failed: {0}")]
    CheckConf(String),
    #[error("named-checkzone failed: {0}")]
    CheckZone(String),
    #[error("starting named failed: {0}")]
    Start(String),
    #[error("rndc reload failed: {0}")]
    Reload(String),
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl NamedError {
    /// The diagnostic text reported by the tool.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            NamedError::CheckConf(msg)
            | NamedError::CheckZone(msg)
            | NamedError::Start(msg)
            | NamedError::Reload(msg) => msg.clone(),
            NamedError::Spawn { .. } => self.to_string(),
        }
    }
}
