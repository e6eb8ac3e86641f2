//! Control of the external BIND `named` daemon.
//!
//! Zone Crab never parses zone files or serves DNS itself. All static validation
//! (`named-checkconf`, `named-checkzone`), liveness checks, start-up and runtime validation
//! (`rndc reload`) are delegated to the BIND tooling through the [`NamedControl`] trait.
//!
//! [`process::NamedProcess`] drives the real binaries. Every call is bounded by the configured
//! [`NamedConfig::timeout`][crate::config::NamedConfig::timeout]; running out of time fails the
//! operation the same way a non-zero exit does.

use crate::error::NamedError;
use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
pub(crate) mod fake;
pub mod process;

pub use process::NamedProcess;

/// `DynNamedControl` is a shareable handle on a [`NamedControl`] implementation.
pub type DynNamedControl = Arc<dyn NamedControl + Send + Sync>;

#[async_trait::async_trait]
pub trait NamedControl {
    /// Statically check the top-level configuration.
    async fn check_config(&self) -> Result<String, NamedError>;

    /// Statically check `zone_file` as the zone for `origin`, with strict name checking.
    async fn check_zone(&self, origin: &str, zone_file: &Path) -> Result<String, NamedError>;

    /// The pid of the running daemon, if any.
    async fn running_pid(&self) -> Option<u32>;

    /// Start the daemon. Does nothing if it is already running.
    async fn start(&self) -> Result<(), NamedError>;

    /// Ask the running daemon to reload its configuration and zones.
    async fn reload(&self) -> Result<String, NamedError>;
}

/// Check the configuration and the main zone, then start `named`.
///
/// # Errors
///
/// Returns the first failing step's [`NamedError`].
pub async fn check_and_run(
    named: &(dyn NamedControl + Send + Sync),
    origin: &str,
    main_zone: &Path,
) -> Result<(), NamedError> {
    named.check_config().await?;
    named.check_zone(origin, main_zone).await?;
    named.start().await
}
