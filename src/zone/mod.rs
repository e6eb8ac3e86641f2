//! The zone configuration manager.
//!
//! Owns the BIND configuration tree under [`Config::bind_dir`][crate::config::Config::bind_dir]
//! and is its only writer:
//!
//! ```text
//! /etc/bind/
//! ├── main-zone            root origin, delegates every user zone
//! ├── custom-records       operator supplied records appended to main-zone
//! ├── named.conf           ─┐
//! ├── named.conf.local      │ regenerated from templates
//! ├── named.conf.rndc       │
//! ├── rndc.conf            ─┘
//! ├── user-zones/<user>    one zone per user, for <user>.<root origin>
//! ├── user-tokens/<user>   dynamic update tokens
//! └── backups/<timestamp>/ taken before a full reset
//! ```
//!
//! User submitted zones are never written over the live file directly. They are staged,
//! checked with `named-checkzone`, swapped in, and kept only if `named` reloads cleanly;
//! otherwise the previous zone is restored. Administrative resets regenerate files from the
//! templates without any checks.

use crate::config::Config;
use crate::error::{Error, NamedError};
use crate::named::{self, DynNamedControl, NamedProcess};
use crate::public_ip::PublicIpResolver;
use crate::template::{
    TemplateData, TemplateRenderer, MAIN_ZONE_TEMPLATE, NAMED_CONF_LOCAL_TEMPLATE,
    NAMED_CONF_RNDC_TEMPLATE, NAMED_CONF_TEMPLATE, RNDC_CONF_TEMPLATE, USER_ZONE_TEMPLATE,
};
use crate::token_store::{DynTokenStore, FileTokenStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard, RwLock};
use trust_dns_client::rr::Name;

pub mod layout;
pub mod record;
mod transaction;


pub use layout::{valid_username, Layout};
use transaction::ZoneTransaction;

/// Size of the generated rndc control channel secret, in bytes.
const RNDC_SECRET_LEN: usize = 32;

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day][hour]");
    static ref BACKUP_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year]-[month]-[day]_[hour]-[minute]-[second]");
}

/// `SharedZoneManager` is the handle on the manager held by the HTTP API.
pub type SharedZoneManager = Arc<ZoneManager>;

pub struct ZoneManager {
    origin: Name,
    layout: Layout,
    renderer: TemplateRenderer,
    named: DynNamedControl,
    public_ip: PublicIpResolver,
    tokens: DynTokenStore,
    /// One lock per username ever seen. Never pruned; users are bounded by their zone files.
    user_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    conf_lock: Mutex<()>,
    fatal: Arc<Notify>,
}

impl ZoneManager {
    /// Build a manager from the process config, driving the real BIND tools.
    ///
    /// # Errors
    ///
    /// See [`ZoneManager::start`].
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let layout = Layout::new(&config.bind_dir);
        let tokens = FileTokenStore::open(layout.user_tokens()).await?;
        Self::start(
            config.origin(),
            layout,
            TemplateRenderer::new(&config.templates_dir),
            Arc::new(NamedProcess::new(config.named.clone())),
            PublicIpResolver::from_config(config),
            Arc::new(RwLock::new(tokens)),
        )
        .await
    }

    /// Build a manager and bring `named` up on the current configuration tree. If the tree
    /// doesn't pass the static checks it is backed up and regenerated from scratch, then
    /// checked once more.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Startup`] if `named` can't be checked and started, even after a full
    /// reset, and [`Error::IO`] if the tree's directories can't be created.
    pub async fn start(
        mut origin: Name,
        layout: Layout,
        renderer: TemplateRenderer,
        named: DynNamedControl,
        public_ip: PublicIpResolver,
        tokens: DynTokenStore,
    ) -> Result<Self, Error> {
        origin.set_fqdn(true);
        tracing::info!("origin {origin}");
        fs::create_dir_all(layout.user_zones()).await?;
        fs::create_dir_all(layout.user_tokens()).await?;

        let manager = Self {
            origin,
            layout,
            renderer,
            named,
            public_ip,
            tokens,
            user_locks: std::sync::Mutex::default(),
            conf_lock: Mutex::default(),
            fatal: Arc::default(),
        };
        manager.bring_up().await?;
        Ok(manager)
    }

    async fn bring_up(&self) -> Result<(), Error> {
        match self.check_and_run().await {
            Ok(()) => {
                tracing::info!("named passed checks and is running");
                return Ok(());
            }
            Err(NamedError::CheckConf(diagnostic)) => {
                tracing::error!("named-checkconf failed:\n{diagnostic}");
            }
            Err(NamedError::CheckZone(diagnostic)) => {
                let contents = fs::read_to_string(self.layout.main_zone())
                    .await
                    .unwrap_or_default();
                tracing::error!("named-checkzone failed for the main zone:\n{diagnostic}");
                tracing::error!("main zone file:\n{contents}");
            }
            Err(err) => return Err(Error::Startup(err.to_string())),
        }

        tracing::info!("doing a backup and full named reset, all previous config is removed");
        self.backup().await;
        let reset = async {
            self.full_reset().await?;
            tracing::info!("trying to start named after reset");
            self.check_and_run()
                .await
                .map_err(|err| Error::Startup(err.to_string()))
        };
        match reset.await {
            Ok(()) => {
                tracing::info!("named passed checks and is running after reset");
                Ok(())
            }
            Err(err) => {
                tracing::error!("failed resetting, can not continue: {err}");
                Err(match err {
                    Error::Startup(_) => err,
                    other => Error::Startup(other.to_string()),
                })
            }
        }
    }

    async fn check_and_run(&self) -> Result<(), NamedError> {
        named::check_and_run(
            self.named.as_ref(),
            &self.origin.to_string(),
            &self.layout.main_zone(),
        )
        .await
    }

    /// Resolves once a zone rollback has failed and `named` is in an unknown state.
    pub async fn fatal(&self) {
        self.fatal.notified().await;
    }

    /// The root origin, dot-terminated.
    #[must_use]
    pub fn origin(&self) -> &Name {
        &self.origin
    }

    #[must_use]
    pub fn user_zone_origin(&self, username: &str) -> String {
        format!("{username}.{}", self.origin)
    }

    fn user_origin_name(&self, username: &str) -> Result<Name, Error> {
        Ok(Name::from_str(username)?.append_domain(&self.origin)?)
    }

    fn user_lock(&self, username: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(username.to_string()).or_default().clone()
    }

    async fn lock_user(&self, username: &str) -> Result<OwnedMutexGuard<()>, Error> {
        if !valid_username(username) {
            return Err(Error::InvalidUsername(username.to_string()));
        }
        Ok(self.user_lock(username).lock_owned().await)
    }

    /// The user's zone file. A user without one gets a fresh zone from the template, and the
    /// delegations and local zone config are regenerated to include it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsername`], [`Error::ZoneCreation`] if a missing zone can't be
    /// generated, or [`Error::IO`] if the zone can't be read.
    pub async fn get_user_zonefile(&self, username: &str) -> Result<String, Error> {
        let _guard = self.lock_user(username).await?;
        self.ensure_user_zone(username).await?;
        Ok(fs::read_to_string(self.layout.user_zone(username)).await?)
    }

    /// Replace the user's zone with `zone_data` if it passes `named-checkzone` and `named`
    /// reloads with it.
    ///
    /// # Errors
    ///
    /// * [`Error::BadZoneFile`] if the zone is rejected by the checker, or rolled back after
    ///   a failed reload.
    /// * [`Error::ZoneStaging`] on filesystem failures.
    /// * [`Error::ZoneFileCheck`] if the checker itself fails.
    /// * [`Error::FatalInconsistency`] if the rollback failed too.
    pub async fn set_user_zonefile(&self, username: &str, zone_data: String) -> Result<(), Error> {
        let guard = self.lock_user(username).await?;
        self.ensure_user_zone(username).await?;
        self.commit(username, zone_data, guard).await
    }

    async fn commit(
        &self,
        username: &str,
        zone_data: String,
        guard: OwnedMutexGuard<()>,
    ) -> Result<(), Error> {
        let transaction = ZoneTransaction {
            username: username.to_string(),
            origin: self.user_zone_origin(username),
            committed: self.layout.user_zone(username),
            candidate: self.layout.candidate_zone(username),
            backup: self.layout.backup_zone(username),
            named: self.named.clone(),
            fatal: self.fatal.clone(),
            _guard: guard,
        };
        tokio::spawn(transaction.run(zone_data))
            .await
            .map_err(|err| Error::ZoneStaging(std::io::Error::new(std::io::ErrorKind::Other, err)))?
    }

    /// Set `hostname`'s address record in the user's zone to `addr`, through the same
    /// check-commit-rollback path as [`ZoneManager::set_user_zonefile`]. Returns the record's
    /// fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordUpdate`] if no single record can be safely edited or the edited
    /// zone is rejected, and [`Error::FatalInconsistency`] if a rollback failed.
    pub async fn update_a_record(
        &self,
        username: &str,
        hostname: &str,
        addr: Ipv4Addr,
    ) -> Result<Name, Error> {
        let guard = self.lock_user(username).await?;
        self.ensure_user_zone(username).await?;
        let origin = self.user_origin_name(username)?;
        let current = fs::read_to_string(self.layout.user_zone(username)).await?;
        let edited = record::set_a_record(&current, &origin, hostname, addr)?;
        let fqdn = record::target_name(&origin, hostname)?;

        match self.commit(username, edited, guard).await {
            Ok(()) => {
                tracing::info!("set {fqdn} to {addr} for {username}");
                Ok(fqdn)
            }
            Err(Error::BadZoneFile(diagnostic) | Error::ZoneFileCheck(diagnostic)) => {
                Err(Error::RecordUpdate(diagnostic))
            }
            Err(err) => Err(err),
        }
    }

    /// Dynamic update authenticated by a user token. Returns the token owner and the
    /// record's fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownToken`] if no user owns `token`, otherwise as
    /// [`ZoneManager::update_a_record`].
    pub async fn update_a_record_with_token(
        &self,
        token: &str,
        hostname: &str,
        addr: Ipv4Addr,
    ) -> Result<(String, Name), Error> {
        let username = self
            .tokens
            .read()
            .await
            .find_user_for_token(token)
            .await?
            .ok_or(Error::UnknownToken)?;
        let fqdn = self.update_a_record(&username, hostname, addr).await?;
        Ok((username, fqdn))
    }

    /// The user's dynamic update token, issued on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsername`] or [`Error::IO`] if the token can't be stored.
    pub async fn user_token(&self, username: &str) -> Result<String, Error> {
        if !valid_username(username) {
            return Err(Error::InvalidUsername(username.to_string()));
        }
        self.tokens.write().await.get_or_create(username).await
    }

    /// Replace the user's dynamic update token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsername`] or [`Error::IO`] if the token can't be stored.
    pub async fn reset_user_token(&self, username: &str) -> Result<String, Error> {
        if !valid_username(username) {
            return Err(Error::InvalidUsername(username.to_string()));
        }
        self.tokens.write().await.reset(username).await
    }

    /// Regenerate the user's zone from the template, discarding its records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsername`] or [`Error::ZoneCreation`].
    pub async fn reset_user_zonefile(&self, username: &str) -> Result<(), Error> {
        let _guard = self.lock_user(username).await?;
        self.regenerate_user_zone(username).await
    }

    async fn ensure_user_zone(&self, username: &str) -> Result<(), Error> {
        if fs::metadata(self.layout.user_zone(username)).await.is_err() {
            tracing::info!("zone file does not exist for user {username}");
            self.regenerate_user_zone(username).await?;
        }
        Ok(())
    }

    /// Caller holds the user's lock.
    async fn regenerate_user_zone(&self, username: &str) -> Result<(), Error> {
        let registered = fs::metadata(self.layout.user_zone(username)).await.is_ok();
        self.write_user_zone(username).await?;
        if !registered {
            self.reset_main_zone().await?;
            self.reset_bind_conf().await?;
        }
        if let Err(err) = self.named.reload().await {
            tracing::warn!("reload after regenerating zone for {username} failed: {err}");
        }
        Ok(())
    }

    async fn write_user_zone(&self, username: &str) -> Result<String, Error> {
        let data = self.zone_data(self.user_zone_origin(username)).await?;
        self.write_zonefile(USER_ZONE_TEMPLATE, &self.layout.user_zone(username), &data)
            .await
    }

    /// Usernames with a zone file, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the user zones directory can't be listed.
    pub async fn find_user_list(&self) -> Result<Vec<String>, Error> {
        let mut users = Vec::new();
        let mut entries = fs::read_dir(self.layout.user_zones()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await.map_or(false, |t| t.is_file()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if valid_username(name) {
                    users.push(name.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }

    /// Operator supplied records for the main zone. Missing or unreadable means none.
    async fn custom_records(&self) -> String {
        fs::read_to_string(self.layout.custom_records())
            .await
            .unwrap_or_default()
    }

    /// Regenerate the main zone, delegating every registered user zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZoneCreation`].
    pub async fn reset_main_zone(&self) -> Result<(), Error> {
        let _conf = self.conf_lock.lock().await;
        let mut data = self.zone_data(self.origin.to_string()).await?;
        data.user_list = self.users_for_regeneration().await?;
        data.custom_records = self.custom_records().await;
        self.write_zonefile(MAIN_ZONE_TEMPLATE, &self.layout.main_zone(), &data)
            .await?;
        Ok(())
    }

    /// Remove every user zone and regenerate a fresh one for each user that had one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZoneCreation`].
    pub async fn reset_all_user_zonefiles(&self) -> Result<(), Error> {
        let users = self.users_for_regeneration().await?;
        let mut guards = Vec::with_capacity(users.len());
        for username in &users {
            guards.push(self.user_lock(username).lock_owned().await);
        }

        let dir = self.layout.user_zones();
        tracing::info!("resetting user zones dir {}", dir.display());
        if let Err(err) = fs::remove_dir_all(&dir).await {
            tracing::error!("error removing user zone dir {}: {err}", dir.display());
        }
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| Error::ZoneCreation(format!("{}: {err}", dir.display())))?;
        for username in &users {
            self.write_user_zone(username).await?;
        }
        Ok(())
    }

    /// Regenerate `named.conf.local`, declaring one zone per registered user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZoneCreation`].
    pub async fn reset_bind_conf(&self) -> Result<(), Error> {
        let _conf = self.conf_lock.lock().await;
        let data = TemplateData {
            origin: self.origin.to_string(),
            root_origin: self.origin.to_string(),
            user_list: self.users_for_regeneration().await?,
            user_zones_dir: self.layout.user_zones().display().to_string(),
            bind_dir: self.layout.bind_dir().display().to_string(),
            ..TemplateData::default()
        };
        self.write_conf(NAMED_CONF_LOCAL_TEMPLATE, &data).await
    }

    /// Generate a new rndc secret and regenerate everything that embeds it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZoneCreation`].
    pub async fn reset_rndc(&self) -> Result<(), Error> {
        let _conf = self.conf_lock.lock().await;
        let mut secret = [0u8; RNDC_SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        let data = TemplateData {
            origin: self.origin.to_string(),
            root_origin: self.origin.to_string(),
            bind_dir: self.layout.bind_dir().display().to_string(),
            user_zones_dir: self.layout.user_zones().display().to_string(),
            rndc_secret: Some(BASE64.encode(secret)),
            ..TemplateData::default()
        };
        self.write_conf(RNDC_CONF_TEMPLATE, &data).await?;
        self.write_conf(NAMED_CONF_RNDC_TEMPLATE, &data).await?;
        self.write_conf(NAMED_CONF_TEMPLATE, &data).await
    }

    /// Regenerate the whole configuration tree. User zones lose their records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZoneCreation`].
    pub async fn full_reset(&self) -> Result<(), Error> {
        self.reset_main_zone().await?;
        self.reset_all_user_zonefiles().await?;
        self.reset_bind_conf().await?;
        self.reset_rndc().await
    }

    /// Best-effort copy of the configuration tree into `backups/<timestamp>/`.
    pub async fn backup(&self) -> Option<PathBuf> {
        // NB: unwrap is safe: known format description for a valid UTC date.
        let timestamp = OffsetDateTime::now_utc().format(&BACKUP_FORMATTER).unwrap();
        let backup_dir = self.layout.backups().join(timestamp);
        if let Err(err) = fs::create_dir_all(&backup_dir).await {
            tracing::error!("failed backup {}: {err}", backup_dir.display());
            return None;
        }

        for file in [
            self.layout.main_zone(),
            self.layout.custom_records(),
            self.layout.named_conf_local(),
        ] {
            if let Some(name) = file.file_name() {
                if let Err(err) = fs::copy(&file, backup_dir.join(name)).await {
                    tracing::error!("failed backing up {}: {err}", file.display());
                }
            }
        }
        let user_zones = backup_dir.join(layout::USER_ZONES_DIR);
        if let Err(err) = copy_dir(&self.layout.user_zones(), &user_zones).await {
            tracing::error!("failed backing up user zones: {err}");
        }
        tracing::info!("backed up configuration to {}", backup_dir.display());
        Some(backup_dir)
    }

    async fn users_for_regeneration(&self) -> Result<Vec<String>, Error> {
        self.find_user_list()
            .await
            .map_err(|err| Error::ZoneCreation(format!("listing users: {err}")))
    }

    async fn zone_data(&self, origin: String) -> Result<TemplateData, Error> {
        let Some(ns_ip) = self.public_ip.public_ip().await else {
            return Err(Error::ZoneCreation("no public IP".to_string()));
        };
        // NB: unwraps are safe: known date format producing values that will always parse as u32.
        let serial: u32 = OffsetDateTime::now_utc()
            .format(&SERIAL_FORMATTER)
            .unwrap()
            .parse()
            .unwrap();
        Ok(TemplateData {
            origin,
            root_origin: self.origin.to_string(),
            ns_ip: Some(ns_ip.to_string()),
            serial,
            ..TemplateData::default()
        })
    }

    async fn write_zonefile(
        &self,
        template: &str,
        zonefile: &Path,
        data: &TemplateData,
    ) -> Result<String, Error> {
        tracing::info!("resetting zone {}", zonefile.display());
        let zone = self
            .renderer
            .render(template, data)
            .map_err(|err| Error::ZoneCreation(format!("{template}: {err}")))?;
        fs::write(zonefile, &zone)
            .await
            .map_err(|err| Error::ZoneCreation(format!("{}: {err}", zonefile.display())))?;
        Ok(zone)
    }

    async fn write_conf(&self, template: &str, data: &TemplateData) -> Result<(), Error> {
        self.renderer
            .write(template, self.layout.bind_dir(), data)
            .await
            .map_err(|err| Error::ZoneCreation(format!("{template}: {err}")))?;
        Ok(())
    }
}

async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to).await?;
    let mut entries = fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::copy(entry.path(), to.join(entry.file_name())).await?;
        }
    }
    Ok(())
}
