//! In-process stand-in for `named` used by the zone manager tests.

use crate::error::NamedError;
use crate::named::NamedControl;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Zone content containing this marker fails `check_zone`.
pub(crate) const BROKEN_MARKER: &str = "BROKEN";

#[derive(Default)]
pub(crate) struct FakeNamed {
    running: AtomicBool,
    /// Number of upcoming `check_config` calls that fail.
    pub(crate) checkconf_failures: AtomicUsize,
    /// Number of upcoming `check_zone` calls that fail to run the checker at all.
    pub(crate) checkzone_spawn_failures: AtomicUsize,
    /// Number of upcoming `reload` calls that fail.
    pub(crate) reload_failures: AtomicUsize,
    pub(crate) reloads: AtomicUsize,
    pub(crate) starts: AtomicUsize,
}

impl FakeNamed {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_checkconf(&self, times: usize) {
        self.checkconf_failures.store(times, Ordering::SeqCst);
    }

    pub(crate) fn fail_checkzone_spawn(&self, times: usize) {
        self.checkzone_spawn_failures.store(times, Ordering::SeqCst);
    }

    pub(crate) fn fail_reload(&self, times: usize) {
        self.reload_failures.store(times, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl NamedControl for FakeNamed {
    async fn check_config(&self) -> Result<String, NamedError> {
        if Self::take_failure(&self.checkconf_failures) {
            return Err(NamedError::CheckConf(
                "/etc/bind/named.conf:3: unknown option 'bogus'".to_string(),
            ));
        }
        Ok(String::new())
    }

    async fn check_zone(&self, origin: &str, zone_file: &Path) -> Result<String, NamedError> {
        if Self::take_failure(&self.checkzone_spawn_failures) {
            return Err(NamedError::Spawn {
                program: "named-checkzone".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        let contents = tokio::fs::read_to_string(zone_file)
            .await
            .map_err(|err| NamedError::CheckZone(err.to_string()))?;
        if contents.contains(BROKEN_MARKER) {
            return Err(NamedError::CheckZone(format!(
                "zone {origin}/IN: loading from master file {} failed: unknown RR type '{BROKEN_MARKER}'",
                zone_file.display()
            )));
        }
        Ok(format!("zone {origin}/IN: loaded serial 1\nOK\n"))
    }

    async fn running_pid(&self) -> Option<u32> {
        self.running.load(Ordering::SeqCst).then_some(4242)
    }

    async fn start(&self) -> Result<(), NamedError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<String, NamedError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.reload_failures) {
            return Err(NamedError::Reload(
                "rndc: 'reload' failed: failure".to_string(),
            ));
        }
        Ok("server reload successful".to_string())
    }
}
