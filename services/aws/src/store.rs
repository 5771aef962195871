use crate::credential::{Credential, Identity};
use cloudcall_core::{Context, Error, ProvideCredential, Result, SigningCredential};
use log::debug;
use std::fmt::{self, Debug};
use tokio::sync::Mutex;

/// CredentialStore caches the credential produced by a provider chain.
///
/// Resolution is single-flight: callers queue on one async lock, the first
/// one refreshes an expired snapshot and the others reuse it.
pub struct CredentialStore {
    provider: Box<dyn ProvideCredential<Credential = Credential>>,
    cached: Mutex<Option<Credential>>,
}

impl Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a store backed by `provider`.
    pub fn new(provider: impl ProvideCredential<Credential = Credential>) -> Self {
        Self {
            provider: Box::new(provider),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid credential, running the provider when the cached one
    /// is missing or about to expire.
    pub async fn resolve(&self, ctx: &Context) -> Result<Credential> {
        let mut cached = self.cached.lock().await;
        if let Some(cred) = cached.as_ref().filter(|c| c.is_valid()) {
            return Ok(cred.clone());
        }

        debug!("credential missing or expired, refreshing");
        let Some(cred) = self.provider.provide_credential(ctx).await? else {
            return Err(Error::credential_not_found(
                "no valid credential found in any credential source",
            )
            .with_context("hint: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY or configure a profile"));
        };
        if !cred.is_valid() {
            return Err(Error::credential_invalid(
                "credential source returned an incomplete or expired credential",
            ));
        }

        *cached = Some(cred.clone());
        Ok(cred)
    }

    /// Drop the cached credential so the next [`resolve`](Self::resolve)
    /// reloads it.
    ///
    /// `rejected` is the access key the service refused. If another caller
    /// already replaced it, the newer credential is kept.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        if cached
            .as_ref()
            .is_some_and(|c| c.access_key_id == rejected || rejected.is_empty())
        {
            debug!("invalidating cached credential");
            *cached = None;
        }
    }

    /// Record the caller identity on the cached credential if it still uses
    /// `access_key_id`.
    pub async fn set_identity(&self, access_key_id: &str, identity: Identity) {
        let mut cached = self.cached.lock().await;
        if let Some(cred) = cached
            .as_mut()
            .filter(|c| c.access_key_id == access_key_id)
        {
            cred.identity = Some(identity);
        }
    }
}
