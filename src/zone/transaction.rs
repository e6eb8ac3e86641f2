//! The validate, commit, verify or roll back sequence behind every user zone write.
//!
//! A [`ZoneTransaction`] is run on its own task by the manager. It owns the per-user lock guard
//! for its whole life, so once started it always reaches one of its terminal outcomes even if
//! the request that started it goes away.

use crate::error::{Error, NamedError};
use crate::named::DynNamedControl;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Notify, OwnedMutexGuard};

pub(super) struct ZoneTransaction {
    pub(super) username: String,
    pub(super) origin: String,
    pub(super) committed: PathBuf,
    pub(super) candidate: PathBuf,
    pub(super) backup: PathBuf,
    pub(super) named: DynNamedControl,
    pub(super) fatal: Arc<Notify>,
    pub(super) _guard: OwnedMutexGuard<()>,
}

impl ZoneTransaction {
    /// Stage `content` as a candidate zone, check it, and commit it if the running server
    /// accepts it.
    pub(super) async fn run(self, content: String) -> Result<(), Error> {
        if let Err(err) = fs::write(&self.candidate, &content).await {
            remove_quietly(&self.candidate).await;
            return Err(Error::ZoneStaging(err));
        }

        match self.named.check_zone(&self.origin, &self.candidate).await {
            Ok(_) => {}
            Err(NamedError::CheckZone(diagnostic)) => {
                remove_quietly(&self.candidate).await;
                tracing::debug!("rejected zone for {}: {diagnostic}", self.username);
                return Err(Error::BadZoneFile(diagnostic));
            }
            Err(err) => {
                remove_quietly(&self.candidate).await;
                tracing::error!("checking zone for {} failed: {err}", self.username);
                return Err(Error::ZoneFileCheck(err.to_string()));
            }
        }

        self.replace_if_reloads().await
    }

    async fn replace_if_reloads(&self) -> Result<(), Error> {
        if let Err(err) = fs::copy(&self.committed, &self.backup).await {
            remove_quietly(&self.candidate).await;
            remove_quietly(&self.backup).await;
            return Err(Error::ZoneStaging(err));
        }
        if let Err(err) = fs::rename(&self.candidate, &self.committed).await {
            remove_quietly(&self.candidate).await;
            remove_quietly(&self.backup).await;
            return Err(Error::ZoneStaging(err));
        }

        let reload_err = match self.named.reload().await {
            Ok(_) => {
                remove_quietly(&self.backup).await;
                tracing::info!("committed zone for {}", self.username);
                return Ok(());
            }
            Err(err) => err,
        };

        let contents = fs::read_to_string(&self.committed).await.unwrap_or_default();
        tracing::error!(
            "zone for {} passed named-checkzone but reload failed: {reload_err}\n{contents}",
            self.username
        );

        if let Err(err) = fs::rename(&self.backup, &self.committed).await {
            return Err(self.fatal(format!("restoring the previous zone failed: {err}")));
        }
        match self.named.reload().await {
            Ok(_) => Err(Error::BadZoneFile(format!(
                "zone seems OK but named could not load it: {}",
                reload_err.diagnostic()
            ))),
            Err(err) => Err(self.fatal(format!(
                "reload after restoring the previous zone failed: {}",
                err.diagnostic()
            ))),
        }
    }

    fn fatal(&self, reason: String) -> Error {
        tracing::error!(
            "VERY BAD SITUATION: failed reverting a reload error for user {}: {reason}",
            self.username
        );
        self.fatal.notify_one();
        Error::FatalInconsistency(reason)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("could not remove {}: {err}", path.display());
        }
    }
}
