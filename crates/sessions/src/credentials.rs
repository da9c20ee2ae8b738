//! Credential persistence.
//!
//! Layout under the sessions root:
//!
//! ```text
//! <root>/creds.json          template copied into new sessions
//! <root>/<session_id>/creds.json
//! ```
//!
//! Blobs are opaque JSON. Writes go to a sibling temp file first and are
//! renamed into place so a crash never leaves a half-written blob behind.

use std::path::{Path, PathBuf};

use cb_domain::error::{Error, Result};
use cb_domain::trace::TraceEvent;
use cb_domain::{CredentialBlob, SessionId};

const CREDS_FILE: &str = "creds.json";

/// Storage for per-session credential blobs.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Make sure `session_id` has a blob on disk, seeding it from the
    /// template when absent. Existing blobs are left untouched.
    async fn ensure_exists(&self, session_id: &SessionId) -> Result<()>;

    /// Load the blob for `session_id`, completed to the minimal structure.
    /// A missing or empty file yields the unregistered default.
    async fn load(&self, session_id: &SessionId) -> Result<CredentialBlob>;

    async fn save(&self, session_id: &SessionId, blob: &CredentialBlob) -> Result<()>;

    /// Every session id that has a blob on disk, sorted.
    async fn list(&self) -> Result<Vec<SessionId>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filesystem store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Filesystem-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct FsCredentialStore {
    root: PathBuf,
}

impl FsCredentialStore {
    /// Open the store at `root`, creating the directory and the template
    /// blob if they do not exist yet.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let template = root.join(CREDS_FILE);
        if !tokio::fs::try_exists(&template).await? {
            write_atomic(&template, &CredentialBlob::unregistered()).await?;
            tracing::info!(path = %template.display(), "wrote credential template");
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(session_id.as_str())
    }

    fn creds_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join(CREDS_FILE)
    }

    async fn template(&self) -> Result<CredentialBlob> {
        read_blob(&self.root.join(CREDS_FILE)).await
    }
}

#[async_trait::async_trait]
impl CredentialStore for FsCredentialStore {
    async fn ensure_exists(&self, session_id: &SessionId) -> Result<()> {
        let path = self.creds_path(session_id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        tokio::fs::create_dir_all(self.session_dir(session_id)).await?;
        let template = self.template().await?;
        write_atomic(&path, &template).await?;
        tracing::debug!(session_id = %session_id, "seeded credentials from template");
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> Result<CredentialBlob> {
        read_blob(&self.creds_path(session_id)).await
    }

    async fn save(&self, session_id: &SessionId, blob: &CredentialBlob) -> Result<()> {
        tokio::fs::create_dir_all(self.session_dir(session_id)).await?;
        write_atomic(&self.creds_path(session_id), blob).await?;

        TraceEvent::CredentialsPersisted {
            session_id: session_id.to_string(),
            registered: blob.is_registered(),
        }
        .emit();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(id) = SessionId::parse(name) else {
                continue;
            };
            if tokio::fs::try_exists(entry.path().join(CREDS_FILE)).await? {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn read_blob(path: &Path) -> Result<CredentialBlob> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CredentialBlob::unregistered())
        }
        Err(e) => return Err(Error::Io(e)),
    };
    if raw.trim().is_empty() {
        return Ok(CredentialBlob::unregistered());
    }
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(CredentialBlob::new(value))
}

async fn write_atomic(path: &Path, blob: &CredentialBlob) -> Result<()> {
    let json = serde_json::to_vec_pretty(blob)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
