//! # Identity Registry
//!
//! Every document carries a stable identifier in its `id` metadata key.
//! There is no central database: uniqueness is established by scanning the
//! corpus into an index of `identity -> paths`, optionally confirmed by a
//! remote authority.
//!
//! ## Collisions
//!
//! An identity held by more than one path is a collision. Collisions are
//! reported with every colliding path and never resolved automatically:
//! no winner is picked and nothing is renumbered.
//!
//! ## Assignment
//!
//! Choosing a candidate ([`propose_identity`]) is pure. Committing it
//! ([`IdentityRegistry::assign`]) is effectful and serialized:
//!
//! 1. under the index lock, reserve the first locally unused candidate;
//! 2. release the lock and ask the remote authority, if any;
//! 3. `Available` keeps the reservation, `Taken` drops it and tries the
//!    next attempt, `Unknown` drops it and fails.
//!
//! Remote checks run on a helper thread with a timeout. A timeout counts as
//! `Unknown`. Claims are published to the authority only once the
//! document has been dispatched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::document::{Document, DocumentIdentity};
use crate::error::{Error, FailureKind, Result};
use crate::metadata::TexKeyMap;
use crate::scan::{scan_corpus, ScanFilter};
use crate::settings::{IdentitySettings, RemoteSettings};

/// Environment variable carrying `remote.token` to the authority command
pub const REMOTE_TOKEN_ENV: &str = "TEXCORPUS_REMOTE_TOKEN";

/// Number of hex digits kept from the digest in proposed identities
const PROPOSAL_HEX_DIGITS: usize = 10;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An identity a document wants to hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub identity: DocumentIdentity,
    pub title: String,
    pub path: PathBuf,
}

/// Answer of a remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Available,
    Taken,
    /// Unreachable, timed out, or an unexpected answer
    Unknown,
}

/// An external authority that knows which identities are registered.
pub trait RemoteAuthority: Send + Sync {
    /// Whether `claim.identity` may be held by this document.
    fn check(&self, claim: &Claim) -> RemoteStatus;

    /// Register `claim` with the authority.
    fn publish(&self, claim: &Claim) -> std::result::Result<(), String>;
}

/// Runs `remote.command check|publish <id> <title>`.
///
/// Exit code 0 means available (or published), 1 means taken, anything else
/// is unknown. `remote.token`, when set, is passed in
/// [`REMOTE_TOKEN_ENV`].
#[derive(Debug, Clone)]
pub struct CommandAuthority {
    program: String,
    args: Vec<String>,
    token: Option<String>,
    /// The command is killed when it runs longer than this
    timeout: Option<Duration>,
}

impl CommandAuthority {
    /// Authority for the configured command, or `None` when no command is set.
    pub fn from_settings(settings: &RemoteSettings) -> Option<Self> {
        let command = settings.command.as_deref()?;
        let mut words = command.split_whitespace().map(String::from);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
            token: settings.token.clone(),
            timeout: None,
        })
    }

    /// Kill the command when it has not exited after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `<command> <action> <id> <title>` and return its exit code.
    ///
    /// `None` when the command was killed by a signal or ran past the
    /// timeout. Its output is discarded.
    fn run(&self, action: &str, claim: &Claim) -> std::io::Result<Option<i32>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(action)
            .arg(claim.identity.as_str())
            .arg(&claim.title)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(token) = &self.token {
            command.env(REMOTE_TOKEN_ENV, token);
        }
        let mut child = command.spawn()?;
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?.code());
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    debug!("{} {} {}: {}", self.program, action, claim.identity, status);
                }
                return Ok(status.code());
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} {} {} did not finish within {:?}; killed",
                    self.program, action, claim.identity, timeout
                );
                child.kill()?;
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }
}

impl RemoteAuthority for CommandAuthority {
    fn check(&self, claim: &Claim) -> RemoteStatus {
        match self.run("check", claim) {
            Ok(Some(0)) => RemoteStatus::Available,
            Ok(Some(1)) => RemoteStatus::Taken,
            Ok(code) => {
                warn!(
                    "Remote authority returned {:?} for {}",
                    code, claim.identity
                );
                RemoteStatus::Unknown
            }
            Err(e) => {
                warn!("Could not run remote authority '{}': {}", self.program, e);
                RemoteStatus::Unknown
            }
        }
    }

    fn publish(&self, claim: &Claim) -> std::result::Result<(), String> {
        match self.run("publish", claim) {
            Ok(Some(0)) => Ok(()),
            Ok(code) => Err(format!(
                "remote authority refused to publish {} (exit status {:?})",
                claim.identity, code
            )),
            Err(e) => Err(format!("could not run '{}': {}", self.program, e)),
        }
    }
}

/// Ask `authority` about `claim`, giving up after `timeout`.
pub fn check_remote_with_timeout(
    authority: &Arc<dyn RemoteAuthority>,
    claim: &Claim,
    timeout: Duration,
) -> RemoteStatus {
    let (sender, receiver) = mpsc::channel();
    let worker_authority = Arc::clone(authority);
    let worker_claim = claim.clone();
    thread::spawn(move || {
        // The receiver is gone when the check timed out.
        let _ = sender.send(worker_authority.check(&worker_claim));
    });

    match receiver.recv_timeout(timeout) {
        Ok(status) => status,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "Remote check for {} timed out after {:?}",
                claim.identity, timeout
            );
            RemoteStatus::Unknown
        }
        Err(RecvTimeoutError::Disconnected) => RemoteStatus::Unknown,
    }
}

/// Candidate identity for `path` at `attempt`: the prefix followed by the
/// first hex digits of SHA-256 over the path and the attempt number.
pub fn propose_identity(prefix: &str, path: &Path, attempt: u32) -> DocumentIdentity {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(attempt.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    DocumentIdentity::from_digest(format!("{}{}", prefix.trim(), &digest[..PROPOSAL_HEX_DIGITS]))
}

/// Result of validating an identity against the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Unique,
    /// Other paths holding the same identity
    Collision(Vec<PathBuf>),
}

fn index_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Corpus-wide index of identities
#[derive(Default)]
pub struct IdentityRegistry {
    index: Mutex<BTreeMap<DocumentIdentity, Vec<PathBuf>>>,
    unassigned: Mutex<Vec<PathBuf>>,
    authority: Option<Arc<dyn RemoteAuthority>>,
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("index", &self.index)
            .field("remote_authority", &self.authority.is_some())
            .finish()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authority(mut self, authority: Arc<dyn RemoteAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn authority(&self) -> Option<&Arc<dyn RemoteAuthority>> {
        self.authority.as_ref()
    }

    /// Build the index from every document under `root`.
    pub fn scan(root: &Path, filter: &ScanFilter, keys: &TexKeyMap) -> Result<Self> {
        let paths = scan_corpus(root, filter)?;
        let found: Vec<(PathBuf, Option<DocumentIdentity>)> = paths
            .par_iter()
            .map(|path| {
                let identity = match Document::from_path_with_keys(path, keys.clone()) {
                    Ok(doc) => doc.identity(),
                    Err(e) => {
                        warn!("Could not read {}: {}", path.display(), e);
                        None
                    }
                };
                (path.clone(), identity)
            })
            .collect();

        let registry = Self::new();
        for (path, identity) in found {
            match identity {
                Some(identity) => registry.register(identity, &path)?,
                None => registry.lock_unassigned()?.push(index_key(&path)),
            }
        }
        info!(
            "Indexed {} identities under {}",
            registry.lock_index()?.len(),
            root.display()
        );
        Ok(registry)
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, BTreeMap<DocumentIdentity, Vec<PathBuf>>>> {
        self.index.lock().map_err(|_| Error::LockPoisoned {
            context: "identity index".to_string(),
        })
    }

    fn lock_unassigned(&self) -> Result<MutexGuard<'_, Vec<PathBuf>>> {
        self.unassigned.lock().map_err(|_| Error::LockPoisoned {
            context: "unassigned documents".to_string(),
        })
    }

    /// Record that `path` holds `identity`.
    pub fn register(&self, identity: DocumentIdentity, path: &Path) -> Result<()> {
        let key = index_key(path);
        let mut index = self.lock_index()?;
        let paths = index.entry(identity).or_default();
        if !paths.contains(&key) {
            paths.push(key);
        }
        Ok(())
    }

    /// Paths holding `identity`.
    pub fn paths_of(&self, identity: &DocumentIdentity) -> Result<Vec<PathBuf>> {
        Ok(self.lock_index()?.get(identity).cloned().unwrap_or_default())
    }

    /// Check that no path other than `owner` holds `identity`.
    pub fn validate(&self, identity: &DocumentIdentity, owner: &Path) -> Result<Validation> {
        let owner = index_key(owner);
        let others: Vec<PathBuf> = self
            .paths_of(identity)?
            .into_iter()
            .filter(|p| *p != owner)
            .collect();
        Ok(if others.is_empty() {
            Validation::Unique
        } else {
            Validation::Collision(others)
        })
    }

    /// Every identity held by more than one path.
    pub fn collisions(&self) -> Result<Vec<(DocumentIdentity, Vec<PathBuf>)>> {
        Ok(self
            .lock_index()?
            .iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(id, paths)| (id.clone(), paths.clone()))
            .collect())
    }

    /// Documents found without an identity during the scan.
    pub fn unassigned(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock_unassigned()?.clone())
    }

    /// Number of distinct identities.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock_index()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Update the index after a document moved.
    pub fn relocate(&self, old: &Path, new: &Path) -> Result<()> {
        let old_key = index_key(old);
        let old_absolute = if old.is_absolute() {
            old.to_path_buf()
        } else {
            std::env::current_dir()?.join(old)
        };
        let new_key = index_key(new);
        let mut index = self.lock_index()?;
        for paths in index.values_mut() {
            for path in paths.iter_mut() {
                if *path == old_key || *path == old_absolute {
                    *path = new_key.clone();
                }
            }
        }
        drop(index);
        for path in self.lock_unassigned()?.iter_mut() {
            if *path == old_key || *path == old_absolute {
                *path = new_key.clone();
            }
        }
        Ok(())
    }

    fn release(&self, identity: &DocumentIdentity, owner: &Path) -> Result<()> {
        let owner = index_key(owner);
        let mut index = self.lock_index()?;
        if let Some(paths) = index.get_mut(identity) {
            paths.retain(|p| *p != owner);
            if paths.is_empty() {
                index.remove(identity);
            }
        }
        Ok(())
    }

    /// Assign a new identity to the document at `owner`.
    ///
    /// Fails closed: an authority that cannot answer fails the assignment.
    pub fn assign(
        &self,
        owner: &Path,
        title: &str,
        settings: &IdentitySettings,
    ) -> std::result::Result<DocumentIdentity, FailureKind> {
        let owner_key = index_key(owner);

        for attempt in 0..settings.attempts {
            let candidate = propose_identity(&settings.prefix, &owner_key, attempt);
            {
                let mut index = self.lock_index()?;
                if index.contains_key(&candidate) {
                    debug!("Candidate {} already used locally", candidate);
                    continue;
                }
                index.insert(candidate.clone(), vec![owner_key.clone()]);
            }

            let Some(authority) = &self.authority else {
                self.forget_unassigned(&owner_key)?;
                return Ok(candidate);
            };

            let claim = Claim {
                identity: candidate.clone(),
                title: title.to_string(),
                path: owner_key.clone(),
            };
            match check_remote_with_timeout(authority, &claim, settings.remote_timeout) {
                RemoteStatus::Available => {
                    self.forget_unassigned(&owner_key)?;
                    return Ok(candidate);
                }
                RemoteStatus::Taken => {
                    debug!("Candidate {} is taken remotely", candidate);
                    self.release(&candidate, &owner_key)?;
                }
                RemoteStatus::Unknown => {
                    self.release(&candidate, &owner_key)?;
                    return Err(FailureKind::RemoteUnknown {
                        identity: candidate.to_string(),
                    });
                }
            }
        }

        Err(FailureKind::Identity(format!(
            "no free identity for {} after {} attempts",
            owner.display(),
            settings.attempts
        )))
    }

    /// Next identity `assign` would try, without reserving anything.
    pub fn preview_assignment(&self, owner: &Path, settings: &IdentitySettings) -> Result<Option<DocumentIdentity>> {
        let owner_key = index_key(owner);
        let index = self.lock_index()?;
        Ok((0..settings.attempts)
            .map(|attempt| propose_identity(&settings.prefix, &owner_key, attempt))
            .find(|candidate| !index.contains_key(candidate)))
    }

    fn forget_unassigned(&self, owner: &Path) -> Result<()> {
        self.lock_unassigned()?.retain(|p| p != owner);
        Ok(())
    }
}
