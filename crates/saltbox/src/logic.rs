use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use saltbox_core::util::digest_fingerprint;
use saltbox_core::{HashError, HashRecord, HashScheme, Secret};
use saltbox_protocol::{Operation, Request};
use saltbox_storage::{StorageEngine, StorageError};
use tracing::{debug, info, warn};

use crate::authz::AuthorizationChecker;
use crate::error::ServiceError;

/// Result of an update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new digest now stored.
    Updated(String),
    /// The current secret did not verify; nothing was written.
    Unauthorized,
}

/// What create, verify, update and delete mean, independent of where records
/// are stored.
///
/// Implementations declare the operations they provide; operations left out
/// keep the default bodies, and a service refuses logic that leaves any out.
/// Secrets are taken by value and dropped, zeroed, when the call returns.
#[async_trait]
pub trait CredentialLogic: fmt::Debug + Send + Sync {
    fn operations(&self) -> &[Operation];

    /// Problems with this logic's own configuration.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    async fn create(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
    ) -> Result<String, ServiceError> {
        let _ = (engine, owner, key, secret);
        Err(ServiceError::Unsupported("create"))
    }

    async fn verify(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
    ) -> Result<bool, ServiceError> {
        let _ = (engine, owner, key, secret);
        Err(ServiceError::Unsupported("verify"))
    }

    async fn update(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
        new_secret: Secret,
    ) -> Result<UpdateOutcome, ServiceError> {
        let _ = (engine, owner, key, secret, new_secret);
        Err(ServiceError::Unsupported("update"))
    }

    async fn delete(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Option<Secret>,
    ) -> Result<bool, ServiceError> {
        let _ = (engine, owner, key, secret);
        Err(ServiceError::Unsupported("delete"))
    }
}

/// The standard create/verify/update/delete semantics.
///
/// New digests use the preferred `scheme`. A successful verify against a digest
/// produced under another scheme writes an upgraded digest back, using the same
/// compare-and-swap as `update`.
#[derive(Clone)]
pub struct StandardLogic {
    scheme: HashScheme,
    authorizer: Option<Arc<dyn AuthorizationChecker>>,
}

impl StandardLogic {
    pub fn new(scheme: HashScheme) -> Self {
        Self {
            scheme,
            authorizer: None,
        }
    }

    /// Allows ownerless deletes the checker approves.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn AuthorizationChecker>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn scheme(&self) -> &HashScheme {
        &self.scheme
    }

    /// The stored digest, or `None` if there is no record.
    ///
    /// An owner or key the engine refuses as malformed cannot name a record.
    async fn fetch(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
    ) -> Result<Option<String>, ServiceError> {
        match engine.exchange(Request::verify(owner, key)).await {
            Ok(resp) => resp.into_digest().map(Some).ok_or_else(|| {
                ServiceError::Protocol("verify response carried no digest".to_string())
            }),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(StorageError::Malformed(detail)) => {
                debug!(owner, key, detail = %detail, "lookup refused as malformed");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_back(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        stored: String,
        upgraded: String,
    ) -> Result<(), ServiceError> {
        let fingerprint = digest_fingerprint(&upgraded);
        match engine
            .exchange(Request::update(owner, key, stored, upgraded))
            .await
        {
            Ok(_) => {
                info!(owner, key, digest = %fingerprint, "upgraded digest to preferred scheme");
                Ok(())
            }
            Err(e @ (StorageError::Conflict { .. } | StorageError::NotFound { .. })) => {
                // Someone else changed the record first; their write stands.
                warn!(owner, key, error = %e, "skipped digest upgrade");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for StandardLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardLogic")
            .field("scheme", &self.scheme)
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialLogic for StandardLogic {
    fn operations(&self) -> &[Operation] {
        &Operation::ALL
    }

    fn validate(&self) -> Vec<String> {
        match self.scheme.validate() {
            Ok(()) => Vec::new(),
            Err(e) => vec![format!("logic scheme is unusable: {e}")],
        }
    }

    async fn create(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
    ) -> Result<String, ServiceError> {
        let record = HashRecord::from_secret(owner, key, secret, self.scheme)?;
        let digest = record.into_digest().ok_or(HashError::NoDigest)?;

        engine
            .exchange(Request::create(owner, key, digest.clone()))
            .await?;
        info!(owner, key, digest = %digest_fingerprint(&digest), "created record");
        Ok(digest)
    }

    async fn verify(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
    ) -> Result<bool, ServiceError> {
        let Some(stored) = self.fetch(engine, owner, key).await? else {
            debug!(owner, key, "verify on missing record");
            return Ok(false);
        };

        let mut record = HashRecord::from_digest(owner, key, stored.clone(), self.scheme);
        let check = record.verify_and_upgrade(Some(&secret))?;
        drop(secret);

        if let Some(upgraded) = check.upgraded {
            self.write_back(engine, owner, key, stored, upgraded).await?;
        }
        debug!(owner, key, verified = check.verified, "verified record");
        Ok(check.verified)
    }

    async fn update(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Secret,
        new_secret: Secret,
    ) -> Result<UpdateOutcome, ServiceError> {
        let stored = self
            .fetch(engine, owner, key)
            .await?
            .ok_or_else(|| ServiceError::RecordNotFound {
                owner: owner.to_string(),
                key: key.to_string(),
            })?;

        let current = HashRecord::from_digest(owner, key, stored.clone(), self.scheme);
        if !current.verify(Some(&secret))? {
            info!(owner, key, "update refused: secret did not verify");
            return Ok(UpdateOutcome::Unauthorized);
        }
        drop(secret);

        let next = HashRecord::from_secret(owner, key, new_secret, self.scheme)?;
        let digest = next.into_digest().ok_or(HashError::NoDigest)?;

        match engine
            .exchange(Request::update(owner, key, stored, digest.clone()))
            .await
        {
            Ok(_) => {
                info!(owner, key, digest = %digest_fingerprint(&digest), "updated record");
                Ok(UpdateOutcome::Updated(digest))
            }
            Err(StorageError::Conflict { .. }) => {
                warn!(owner, key, "update refused: record changed after verification");
                Ok(UpdateOutcome::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(
        &self,
        engine: &dyn StorageEngine,
        owner: &str,
        key: &str,
        secret: Option<Secret>,
    ) -> Result<bool, ServiceError> {
        let Some(secret) = secret else {
            let authorized = match &self.authorizer {
                Some(checker) => checker.is_authorized(owner, key).await,
                None => false,
            };
            if !authorized {
                warn!(owner, key, "ownerless delete refused");
                return Err(ServiceError::Unauthorized {
                    owner: owner.to_string(),
                    key: key.to_string(),
                });
            }
            engine.exchange(Request::delete(owner, key, None)).await?;
            info!(owner, key, "deleted record without secret");
            return Ok(true);
        };

        let stored = self
            .fetch(engine, owner, key)
            .await?
            .ok_or_else(|| ServiceError::RecordNotFound {
                owner: owner.to_string(),
                key: key.to_string(),
            })?;

        let current = HashRecord::from_digest(owner, key, stored.clone(), self.scheme);
        if !current.verify(Some(&secret))? {
            info!(owner, key, "delete refused: secret did not verify");
            return Ok(false);
        }
        drop(secret);

        match engine
            .exchange(Request::delete(owner, key, Some(stored)))
            .await
        {
            Ok(_) => {
                info!(owner, key, "deleted record");
                Ok(true)
            }
            Err(StorageError::Conflict { .. }) => {
                warn!(owner, key, "delete refused: record changed after verification");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
