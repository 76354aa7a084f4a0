// User registration against the certificate authority of an organization

use crate::{
    ca::{CertificateAuthority, RegistrationRequest},
    error::{RegistrationError, StoreError},
};
use dashmap::DashMap;
use fabric_common::identity::Identity;
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

// Enrolled identities, optionally persisted as one JSON file per user
#[derive(Default)]
pub struct IdentityStore {
    identities: DashMap<String, Arc<Identity>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    directory: Option<PathBuf>,
}

impl IdentityStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    // Open a persistent store, loading every identity already saved in it
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, StoreError> {
        let directory = directory.as_ref();
        let io_err = |path: &Path, source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(directory).map_err(|e| io_err(directory, e))?;
        let store = Self {
            directory: Some(directory.to_path_buf()),
            ..Default::default()
        };

        for entry in fs::read_dir(directory).map_err(|e| io_err(directory, e))? {
            let path = entry.map_err(|e| io_err(directory, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read(&path).map_err(|e| io_err(&path, e))?;
            let identity: Identity =
                serde_json::from_slice(&content).map_err(|source| StoreError::Json {
                    path: path.clone(),
                    source,
                })?;
            debug!("Loaded identity {} from {}", identity, path.display());
            store
                .identities
                .insert(identity.name().to_owned(), Arc::new(identity));
        }

        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Identity>> {
        self.identities.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.identities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    // Persist first so that a failed write leaves the store unchanged
    pub async fn insert(&self, identity: Identity) -> Result<Arc<Identity>, StoreError> {
        if let Some(directory) = self.directory.as_ref() {
            let path = directory.join(format!("{}.json", identity.name()));
            let tmp = path.with_extension("json.tmp");
            let content = serde_json::to_vec_pretty(&identity).map_err(|source| {
                StoreError::Json {
                    path: path.clone(),
                    source,
                }
            })?;
            tokio::fs::write(&tmp, content)
                .await
                .map_err(|source| StoreError::Io {
                    path: tmp.clone(),
                    source,
                })?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
        }

        let identity = Arc::new(identity);
        self.identities
            .insert(identity.name().to_owned(), Arc::clone(&identity));
        Ok(identity)
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
}

// Registers and enrolls users of one organization through its registrar
pub struct MembershipClient {
    ca: Arc<dyn CertificateAuthority>,
    store: Arc<IdentityStore>,
    registrar: Arc<Identity>,
    affiliation: String,
    msp_id: String,
}

impl MembershipClient {
    pub fn new<A: Into<String>, M: Into<String>>(
        ca: Arc<dyn CertificateAuthority>,
        store: Arc<IdentityStore>,
        registrar: Arc<Identity>,
        affiliation: A,
        msp_id: M,
    ) -> Self {
        Self {
            ca,
            store,
            registrar,
            affiliation: affiliation.into(),
            msp_id: msp_id.into(),
        }
    }

    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    // Register a new user and enroll it. Known names are rejected before
    // contacting the CA, concurrent calls for one name are serialized.
    pub async fn register(&self, username: &str) -> Result<Arc<Identity>, RegistrationError> {
        if !valid_name(username) {
            return Err(RegistrationError::InvalidName(username.to_owned()));
        }

        let lock = self.store.lock_for(username);
        let _guard = lock.lock().await;
        if self.store.contains(username) {
            return Err(RegistrationError::AlreadyRegistered(username.to_owned()));
        }

        let request = RegistrationRequest::client(username, self.affiliation.clone());
        let secret = self
            .ca
            .register(&request, &self.registrar)
            .await
            .map_err(|source| RegistrationError::Register {
                name: username.to_owned(),
                source,
            })?;
        debug!("User {} registered by {}", username, self.registrar);

        let enrollment = self
            .ca
            .enroll(username, &secret)
            .await
            .map_err(|source| RegistrationError::Enroll {
                name: username.to_owned(),
                source,
            })?;

        let identity = Identity::new(username, self.affiliation.clone(), self.msp_id.clone(), enrollment);
        let identity = self.store.insert(identity).await?;
        info!("User {} registered and enrolled", identity);
        Ok(identity)
    }

    // Enroll a bootstrap identity (usually the CA admin) with its known secret.
    // An identity already in the store is reused.
    pub async fn enroll_admin<A: Into<String>, M: Into<String>>(
        ca: &dyn CertificateAuthority,
        store: &IdentityStore,
        name: &str,
        secret: &str,
        affiliation: A,
        msp_id: M,
    ) -> Result<Arc<Identity>, RegistrationError> {
        let lock = store.lock_for(name);
        let _guard = lock.lock().await;
        if let Some(identity) = store.get(name) {
            debug!("Reusing enrolled identity {}", identity);
            return Ok(identity);
        }

        let enrollment = ca
            .enroll(name, secret)
            .await
            .map_err(|source| RegistrationError::Enroll {
                name: name.to_owned(),
                source,
            })?;

        let identity = store
            .insert(Identity::new(name, affiliation, msp_id, enrollment))
            .await?;
        info!("Enrolled {}", identity);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::identity::Enrollment;
    use tempfile::TempDir;

    fn identity(name: &str) -> Identity {
        Identity::new(
            name,
            "org1.department1",
            "ClinicMSP",
            Enrollment {
                private_key_pem: format!("key of {}", name),
                certificate_pem: format!("cert of {}", name),
            },
        )
    }

    #[test]
    fn test_valid_names() {
        assert!(valid_name("user1"));
        assert!(valid_name("alice@clinic.example.com"));
        assert!(!valid_name(""));
        assert!(!valid_name("../etc/passwd"));
        assert!(!valid_name("with space"));
    }

    #[tokio::test]
    async fn test_persistent_store_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let store = IdentityStore::open(dir.path()).unwrap();
            store.insert(identity("user1")).await.unwrap();
            store.insert(identity("user2")).await.unwrap();
            assert_eq!(store.len(), 2);
        }
        assert!(!dir.path().join("user1.json.tmp").exists());

        let store = IdentityStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        let user = store.get("user1").unwrap();
        assert_eq!(user.certificate_pem(), "cert of user1");
        assert_eq!(user.msp_id(), "ClinicMSP");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::open(dir.path().join("identities")).unwrap();
        fs::remove_dir(dir.path().join("identities")).unwrap();

        assert!(matches!(
            store.insert(identity("user1")).await,
            Err(StoreError::Io { .. })
        ));
        assert!(!store.contains("user1"));
    }

    #[test]
    fn test_invalid_identity_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), b"{").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        assert!(matches!(
            IdentityStore::open(dir.path()),
            Err(StoreError::Json { .. })
        ));
    }
}
