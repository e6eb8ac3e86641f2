use std::path::{Path, PathBuf};

pub const MAIN_ZONE_FILE: &str = "main-zone";
pub const CUSTOM_RECORDS_FILE: &str = "custom-records";
pub const NAMED_CONF_LOCAL_FILE: &str = "named.conf.local";
pub const USER_ZONES_DIR: &str = "user-zones";
pub const USER_TOKENS_DIR: &str = "user-tokens";
pub const BACKUPS_DIR: &str = "backups";

/// Suffix of a staged, not yet validated user zone.
pub const CANDIDATE_SUFFIX: &str = "tmp";
/// Suffix of the copy of a committed user zone taken before it is replaced.
pub const BACKUP_SUFFIX: &str = "orig";

/// Paths of the on-disk BIND configuration tree.
#[derive(Debug, Clone)]
pub struct Layout {
    bind_dir: PathBuf,
}

impl Layout {
    #[must_use]
    pub fn new(bind_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_dir: bind_dir.into(),
        }
    }

    #[must_use]
    pub fn bind_dir(&self) -> &Path {
        &self.bind_dir
    }

    #[must_use]
    pub fn main_zone(&self) -> PathBuf {
        self.bind_dir.join(MAIN_ZONE_FILE)
    }

    #[must_use]
    pub fn custom_records(&self) -> PathBuf {
        self.bind_dir.join(CUSTOM_RECORDS_FILE)
    }

    #[must_use]
    pub fn named_conf_local(&self) -> PathBuf {
        self.bind_dir.join(NAMED_CONF_LOCAL_FILE)
    }

    #[must_use]
    pub fn user_zones(&self) -> PathBuf {
        self.bind_dir.join(USER_ZONES_DIR)
    }

    #[must_use]
    pub fn user_tokens(&self) -> PathBuf {
        self.bind_dir.join(USER_TOKENS_DIR)
    }

    #[must_use]
    pub fn backups(&self) -> PathBuf {
        self.bind_dir.join(BACKUPS_DIR)
    }

    #[must_use]
    pub fn user_zone(&self, username: &str) -> PathBuf {
        self.user_zones().join(username)
    }

    #[must_use]
    pub fn candidate_zone(&self, username: &str) -> PathBuf {
        self.user_zones()
            .join(format!("{username}.{CANDIDATE_SUFFIX}"))
    }

    #[must_use]
    pub fn backup_zone(&self, username: &str) -> PathBuf {
        self.user_zones().join(format!("{username}.{BACKUP_SUFFIX}"))
    }
}

/// Whether `username` can name a user zone: a single lowercase DNS label. Usernames double as
/// file names, so anything else is refused.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    (1..=63).contains(&username.len())
        && !username.starts_with('-')
        && !username.ends_with('-')
        && username
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
