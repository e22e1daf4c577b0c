use crate::error::SessionError;
use crate::models::{AuthResponse, User};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredSession {
    token: String,
    user: User,
}

/// Login state that survives restarts, kept as a small JSON file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    current: Option<StoredSession>,
}

impl SessionStore {
    /// Reads the session file. A missing file is an empty session; a corrupt
    /// one is deleted and also treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match Self::read(&path) {
            Ok(session) => session,
            Err(e) => {
                error!("Error reading stored session {}: {}", path.display(), e);
                if let Err(e) = remove_if_present(&path) {
                    warn!("Could not remove corrupt session file: {}", e);
                }
                None
            }
        };

        if current.is_some() {
            info!("Restored session from {}", path.display());
        }
        Self { path, current }
    }

    fn read(path: &Path) -> Result<Option<StoredSession>, SessionError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.current.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    /// Stores a fresh login and writes it to disk.
    pub fn establish(&mut self, auth: AuthResponse) -> Result<(), SessionError> {
        let session = StoredSession {
            token: auth.token,
            user: auth.user,
        };
        fs::write(&self.path, serde_json::to_string_pretty(&session)?)?;
        self.current = Some(session);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), SessionError> {
        if self.current.take().is_some() {
            info!("Session cleared");
        }
        remove_if_present(&self.path)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
