//! # Filesystem Repo
//!
//! On-disk home of a node: the keystore with its ed25519 identity and the
//! lock file that keeps two daemons from sharing it. Locking happens while
//! options apply, so a second daemon fails before anything is constructed.
//!
//! The metadata store is an in-memory map scoped to the locked repo; the
//! daemon uses it to cache the latest ask seen per provider.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use fs2::FileExt;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use node_assembly::NodeKind;

use crate::types::PeerId;

const KEYSTORE_FILE: &str = "keystore.json";
const LOCK_FILE: &str = "repo.lock";

/// Repo errors.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The repo already holds a keystore.
    #[error("repo at {} is already initialized", path.display())]
    AlreadyInitialized { path: PathBuf },

    /// The repo has no keystore yet; run init first.
    #[error("repo at {} is not initialized", path.display())]
    NotInitialized { path: PathBuf },

    /// Another process holds the repo lock.
    #[error("repo at {} is locked by another process", path.display())]
    Locked { path: PathBuf },

    /// The keystore file exists but cannot be decoded.
    #[error("keystore is corrupt: {reason}")]
    CorruptKeystore { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An unopened repo at a filesystem path.
#[derive(Debug, Clone)]
pub struct FsRepo {
    root: PathBuf,
}

impl FsRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.keystore_path().exists()
    }

    /// Create the repo directory and a fresh keystore. Fails with
    /// [`RepoError::AlreadyInitialized`] if a keystore is already present,
    /// which callers typically tolerate.
    pub fn init(&self) -> Result<(), RepoError> {
        if self.is_initialized() {
            return Err(RepoError::AlreadyInitialized {
                path: self.root.clone(),
            });
        }
        fs::create_dir_all(&self.root)?;
        let keystore = Keystore::generate();
        keystore.write_to(&self.keystore_path())?;
        info!(
            path = %self.root.display(),
            peer_id = %keystore.peer_id(),
            "repo initialized"
        );
        Ok(())
    }

    /// Take the exclusive repo lock and load the keystore.
    pub fn lock(&self, kind: NodeKind) -> Result<LockedRepo, RepoError> {
        if !self.is_initialized() {
            return Err(RepoError::NotInitialized {
                path: self.root.clone(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.root.join(LOCK_FILE))?;
        lock_file.try_lock_exclusive().map_err(|source| {
            if source.kind() == fs2::lock_contended_error().kind() {
                RepoError::Locked {
                    path: self.root.clone(),
                }
            } else {
                RepoError::Io(source)
            }
        })?;

        let keystore = Keystore::read_from(&self.keystore_path())?;
        Ok(LockedRepo {
            inner: Arc::new(LockedRepoInner {
                root: self.root.clone(),
                kind,
                lock_file,
                keystore,
                metadata: MetadataStore::new(),
            }),
        })
    }

    fn keystore_path(&self) -> PathBuf {
        self.root.join(KEYSTORE_FILE)
    }
}

/// A repo held under an exclusive lock. Cheap to clone; all clones share the
/// same lock, keystore and metadata.
#[derive(Clone)]
pub struct LockedRepo {
    inner: Arc<LockedRepoInner>,
}

struct LockedRepoInner {
    root: PathBuf,
    kind: NodeKind,
    lock_file: File,
    keystore: Keystore,
    metadata: MetadataStore,
}

impl LockedRepo {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    #[must_use]
    pub fn keystore(&self) -> &Keystore {
        &self.inner.keystore
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Release the exclusive lock. Called once, from the repo's teardown.
    pub fn release(&self) -> Result<(), RepoError> {
        self.inner.lock_file.unlock()?;
        debug!(path = %self.inner.root.display(), "repo lock released");
        Ok(())
    }
}

/// The node's signing identity, loaded from the repo.
#[derive(Clone)]
pub struct Keystore {
    signing_key: Arc<SigningKey>,
}

#[derive(Serialize, Deserialize)]
struct KeystoreFile {
    secret_key: String,
}

impl Keystore {
    /// Generate a fresh ed25519 identity.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: Arc::new(SigningKey::generate(&mut OsRng)),
        }
    }

    fn write_to(&self, path: &Path) -> Result<(), RepoError> {
        let file = KeystoreFile {
            secret_key: hex::encode(self.signing_key.to_bytes()),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|source| RepoError::CorruptKeystore {
                reason: source.to_string(),
            })?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self, RepoError> {
        let raw = fs::read_to_string(path)?;
        let file: KeystoreFile =
            serde_json::from_str(&raw).map_err(|source| RepoError::CorruptKeystore {
                reason: source.to_string(),
            })?;
        let bytes = hex::decode(&file.secret_key).map_err(|source| RepoError::CorruptKeystore {
            reason: source.to_string(),
        })?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RepoError::CorruptKeystore {
                reason: "secret key must be 32 bytes".to_string(),
            })?;
        Ok(Self {
            signing_key: Arc::new(SigningKey::from_bytes(&secret)),
        })
    }

    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// The node's public identity, derived from the keystore.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub peer_id: PeerId,
    pub public_key: VerifyingKey,
}

impl NodeIdentity {
    #[must_use]
    pub fn new(keystore: &Keystore) -> Self {
        Self {
            peer_id: keystore.peer_id(),
            public_key: keystore.public_key(),
        }
    }
}

/// In-memory key/value store scoped to a locked repo.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: Vec<u8>) {
        self.inner.write().insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
