//! A directory-backed implementation of the [`TokenStore`][super::TokenStore] trait.
//!
//! Each user's token lives in a file named after the user. The directory is the only state;
//! nothing is cached in memory, so tokens edited by an operator on disk are picked up at once.
//! Tokens are written to a staging file and renamed into place, so a token file is never seen
//! half written.
use crate::error::Error;
use crate::token_store::{generate_token, TokenStore};
use crate::zone::valid_username;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Open the token store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the directory can't be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn token_file(&self, username: &str) -> PathBuf {
        self.dir.join(username)
    }

    fn staging_file(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{username}.tmp"))
    }

    /// Load every stored token, keyed by username. Files that can't be read, or hold no token,
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the token directory itself can't be listed.
    pub async fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        let mut tokens = BTreeMap::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let Some(username) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if !valid_username(&username) {
                continue;
            }
            match fs::read_to_string(entry.path()).await {
                Ok(token) if token.trim().is_empty() => {
                    tracing::warn!("skipping empty token for {username}");
                }
                Ok(token) => {
                    tokens.insert(username, token.trim().to_string());
                }
                Err(err) => tracing::warn!("skipping unreadable token for {username}: {err}"),
            }
        }
        Ok(tokens)
    }

    async fn read(&self, username: &str) -> Result<Option<String>, Error> {
        match fs::read_to_string(self.token_file(username)).await {
            Ok(token) if token.trim().is_empty() => Ok(None),
            Ok(token) => Ok(Some(token.trim().to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::IO(err)),
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn get_or_create(&mut self, username: &str) -> Result<String, Error> {
        match self.read(username).await? {
            Some(token) => Ok(token),
            None => self.reset(username).await,
        }
    }

    async fn reset(&mut self, username: &str) -> Result<String, Error> {
        let token = generate_token();
        let staging = self.staging_file(username);
        if let Err(err) = fs::write(&staging, &token).await {
            let _ = fs::remove_file(&staging).await;
            return Err(Error::IO(err));
        }
        fs::rename(&staging, self.token_file(username)).await?;
        tracing::info!("issued new token for {username}");
        Ok(token)
    }

    async fn delete(&mut self, username: &str) -> Result<(), Error> {
        match fs::remove_file(self.token_file(username)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::IO(err)),
        }
    }

    async fn find_user_for_token(&self, token: &str) -> Result<Option<String>, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        let mut owners = self
            .load()
            .await?
            .into_iter()
            .filter(|(_, user_token)| user_token == token)
            .map(|(username, _)| username);
        let owner = owners.next();
        if let Some(other) = owners.next() {
            tracing::warn!(
                "token shared by {} and {other}, using the former",
                owner.as_deref().unwrap_or_default()
            );
        }
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, FileTokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("user-tokens"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn issued_token_maps_back_to_user() {
        let (_dir, mut store) = store().await;
        let token = store.get_or_create("alice").await.unwrap();
        assert_eq!(store.get_or_create("alice").await.unwrap(), token);
        assert_eq!(
            store.find_user_for_token(&token).await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(store.find_user_for_token("0000-0000").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_then_create_issues_new_token() {
        let (_dir, mut store) = store().await;
        let old = store.get_or_create("bob").await.unwrap();
        store.delete("bob").await.unwrap();
        store.delete("bob").await.unwrap();
        assert_eq!(store.find_user_for_token(&old).await.unwrap(), None);

        let new = store.get_or_create("bob").await.unwrap();
        assert_ne!(old, new);
    }

    #[tokio::test]
    async fn reset_replaces_token() {
        let (_dir, mut store) = store().await;
        let old = store.get_or_create("carol").await.unwrap();
        let new = store.reset("carol").await.unwrap();
        assert_ne!(old, new);
        assert_eq!(store.get_or_create("carol").await.unwrap(), new);
        assert_eq!(store.find_user_for_token(&old).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let (_dir, mut store) = store().await;
        let token = store.get_or_create("dave").await.unwrap();
        std::fs::write(store.token_file("mallory"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::create_dir(store.token_file("subdir")).unwrap();

        let tokens = store.load().await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.get("dave"), Some(&token));
    }

    #[tokio::test]
    async fn blank_token_files_never_authenticate() {
        let (_dir, mut store) = store().await;
        std::fs::write(store.token_file("alice"), "").unwrap();
        std::fs::write(store.token_file("bob"), "  \n").unwrap();

        assert!(store.load().await.unwrap().is_empty());
        for token in ["", " ", "\n"] {
            assert_eq!(store.find_user_for_token(token).await.unwrap(), None);
        }

        let token = store.get_or_create("alice").await.unwrap();
        assert_eq!(token.len(), 19);
        assert_eq!(
            store.find_user_for_token(&token).await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn issuing_leaves_no_staging_file() {
        let (dir, mut store) = store().await;
        store.get_or_create("erin").await.unwrap();
        store.reset("erin").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("user-tokens"))
            .unwrap()
            .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
            .collect();
        assert_eq!(names, vec!["erin"]);

        std::fs::write(store.staging_file("erin"), "0000-0000-0000-0000").unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }
}
