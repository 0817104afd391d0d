//! On-disk credential persistence
//!
//! Secrets are created with an exclusive-create open so an existing file is
//! never overwritten, even by two processes racing on the same role.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use tracing::{debug, info, warn};

use crate::config::CredentialsConfig;
use crate::error::{Error, Result};

use super::identity::{parse_wallet, Role};

/// Outcome of [`CredentialStore::generate`]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    /// A new secret was written
    Created {
        role: Role,
        address: Address,
        path: PathBuf,
    },

    /// The role already has a file; it was left untouched
    AlreadyExists { role: Role, path: PathBuf },
}

impl GenerateOutcome {
    /// Address of a freshly generated credential
    pub fn address(&self) -> Option<Address> {
        match self {
            GenerateOutcome::Created { address, .. } => Some(*address),
            GenerateOutcome::AlreadyExists { .. } => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, GenerateOutcome::Created { .. })
    }
}

/// Where a loaded secret came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Environment(String),
    File(PathBuf),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment(var) => write!(f, "${}", var),
            CredentialSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A usable credential for one role
#[derive(Debug, Clone)]
pub struct LoadedCredential {
    pub role: Role,
    pub source: CredentialSource,
    pub wallet: LocalWallet,
}

impl LoadedCredential {
    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

/// Manages the per-role secret files
#[derive(Debug, Clone)]
pub struct CredentialStore {
    /// Directory holding one file per role
    dir: PathBuf,

    /// Environment variable consulted before the file
    env_overrides: BTreeMap<Role, String>,
}

impl CredentialStore {
    /// Store rooted at `dir` with no environment overrides
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            env_overrides: BTreeMap::new(),
        }
    }

    /// Store as described by the `[credentials]` section
    pub fn from_config(config: &CredentialsConfig) -> Self {
        let mut store = Self::new(&config.dir);
        for (role_name, var) in &config.env_overrides {
            match role_name.parse::<Role>() {
                Ok(role) => store = store.with_env_override(role, var.clone()),
                Err(e) => warn!("Ignoring credential override: {}", e),
            }
        }
        store
    }

    /// Consult `var` before the file for `role`
    pub fn with_env_override(mut self, role: Role, var: impl Into<String>) -> Self {
        self.env_overrides.insert(role, var.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a role
    pub fn path(&self, role: Role) -> PathBuf {
        self.dir.join(role.file_name())
    }

    /// Environment variable that overrides a role, if one is configured
    pub fn env_var(&self, role: Role) -> Option<&str> {
        self.env_overrides.get(&role).map(String::as_str)
    }

    /// Create a fresh secret for `role` unless one already exists.
    ///
    /// Already-exists is a successful no-op. The open file handle is scoped
    /// to this call and dropped on every path.
    pub fn generate(&self, role: Role) -> Result<GenerateOutcome> {
        let path = self.path(role);

        create_private_dir(&self.dir).map_err(|e| Error::CredentialIo {
            role: role.to_string(),
            reason: format!("cannot create {}: {}", self.dir.display(), e),
        })?;

        let mut file = match open_exclusive(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!("{} credential exists at {}, not overwriting", role, path.display());
                return Ok(GenerateOutcome::AlreadyExists { role, path });
            }
            Err(e) => {
                return Err(Error::CredentialIo {
                    role: role.to_string(),
                    reason: format!("cannot create {}: {}", path.display(), e),
                })
            }
        };

        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let secret = hex::encode(wallet.signer().to_bytes());

        if let Err(e) = file.write_all(secret.as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            // The file is ours; leave no half-written secret that would block a retry
            let _ = std::fs::remove_file(&path);
            return Err(Error::CredentialIo {
                role: role.to_string(),
                reason: format!("cannot write {}: {}", path.display(), e),
            });
        }

        let address = wallet.address();
        info!("Generated {} credential at {}", role, path.display());

        Ok(GenerateOutcome::Created {
            role,
            address,
            path,
        })
    }

    /// Load the secret for `role`: environment override first, then the file.
    ///
    /// `Ok(None)` means the role has no signing material at all.
    pub fn load(&self, role: Role) -> Result<Option<LoadedCredential>> {
        self.load_with(role, |var| std::env::var(var).ok())
    }

    pub(crate) fn load_with<F>(&self, role: Role, lookup: F) -> Result<Option<LoadedCredential>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(var) = self.env_var(role) {
            if let Some(secret) = lookup(var).filter(|s| !s.trim().is_empty()) {
                debug!("Loading {} credential from ${}", role, var);
                let wallet = parse_wallet(&secret)?;
                return Ok(Some(LoadedCredential {
                    role,
                    source: CredentialSource::Environment(var.to_string()),
                    wallet,
                }));
            }
        }

        let path = self.path(role);
        let secret = match std::fs::read_to_string(&path) {
            Ok(secret) => secret,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::CredentialIo {
                    role: role.to_string(),
                    reason: format!("cannot read {}: {}", path.display(), e),
                })
            }
        };

        warn_on_loose_permissions(role, &path);

        let wallet = parse_wallet(&secret)?;
        Ok(Some(LoadedCredential {
            role,
            source: CredentialSource::File(path),
            wallet,
        }))
    }
}

#[cfg(unix)]
fn open_exclusive(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_exclusive(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn warn_on_loose_permissions(role: Role, path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "{} credential {} has insecure permissions {:o}. Run 'chmod 600 {}'",
                    role,
                    path.display(),
                    mode & 0o777,
                    path.display()
                );
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (role, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_generate_creates_both_roles_with_distinct_addresses() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("secrets"));

        let deployer = store.generate(Role::Deployer).unwrap();
        let other = store.generate(Role::Other).unwrap();

        assert!(deployer.is_created());
        assert!(other.is_created());
        assert_ne!(deployer.address(), other.address());
        assert!(store.path(Role::Deployer).exists());
        assert!(store.path(Role::Other).exists());
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 2);
    }

    #[test]
    fn test_generate_twice_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        let first = store.generate(Role::Deployer).unwrap();
        let before = std::fs::read(store.path(Role::Deployer)).unwrap();

        let second = store.generate(Role::Deployer).unwrap();
        let after = std::fs::read(store.path(Role::Deployer)).unwrap();

        assert!(first.is_created());
        assert!(matches!(second, GenerateOutcome::AlreadyExists { role: Role::Deployer, .. }));
        assert_eq!(before, after);
    }

    #[test]
    fn test_existing_secret_is_left_untouched() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        std::fs::write(store.path(Role::Other), KEY).unwrap();

        let outcome = store.generate(Role::Other).unwrap();
        assert!(!outcome.is_created());
        assert_eq!(std::fs::read_to_string(store.path(Role::Other)).unwrap(), KEY);
    }

    #[test]
    fn test_roles_do_not_interfere() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        store.generate(Role::Deployer).unwrap();
        let deployer_bytes = std::fs::read(store.path(Role::Deployer)).unwrap();

        assert!(store.generate(Role::Other).unwrap().is_created());
        assert_eq!(std::fs::read(store.path(Role::Deployer)).unwrap(), deployer_bytes);
    }

    #[test]
    fn test_concurrent_generate_has_single_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(CredentialStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let role = if i % 2 == 0 { Role::Deployer } else { Role::Other };
                std::thread::spawn(move || store.generate(role).unwrap())
            })
            .collect();

        let outcomes: Vec<GenerateOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        for role in Role::ALL {
            let created = outcomes
                .iter()
                .filter(|o| matches!(o, GenerateOutcome::Created { role: r, .. } if *r == role))
                .count();
            assert_eq!(created, 1, "exactly one creation for {}", role);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.generate(Role::Deployer).unwrap();

        let mode = std::fs::metadata(store.path(Role::Deployer))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        assert!(store.load_with(Role::Deployer, no_env).unwrap().is_none());
    }

    #[test]
    fn test_load_generated_matches_address() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let outcome = store.generate(Role::Deployer).unwrap();

        let loaded = store.load_with(Role::Deployer, no_env).unwrap().unwrap();
        assert_eq!(Some(loaded.address()), outcome.address());
        assert_eq!(
            loaded.source,
            CredentialSource::File(store.path(Role::Deployer))
        );
    }

    #[test]
    fn test_env_override_takes_precedence() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path()).with_env_override(Role::Deployer, "TEST_PK");
        let file_outcome = store.generate(Role::Deployer).unwrap();

        let loaded = store
            .load_with(Role::Deployer, |var| {
                (var == "TEST_PK").then(|| format!("0x{}", KEY))
            })
            .unwrap()
            .unwrap();

        assert_eq!(loaded.source, CredentialSource::Environment("TEST_PK".into()));
        assert_ne!(Some(loaded.address()), file_outcome.address());
    }

    #[test]
    fn test_corrupt_file_is_invalid_key() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        std::fs::write(store.path(Role::Deployer), "not hex").unwrap();

        let err = store.load_with(Role::Deployer, no_env).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_from_config_reads_overrides() {
        let config = CredentialsConfig::default();
        let store = CredentialStore::from_config(&config);
        assert_eq!(store.env_var(Role::Deployer), Some("DEPLOYER_PK"));
        assert_eq!(store.env_var(Role::Other), Some("OTHER_PK"));
        assert_eq!(CredentialStore::new("x").env_var(Role::Other), None);
    }
}
