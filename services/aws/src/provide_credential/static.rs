use crate::Credential;
use async_trait::async_trait;
use cloudcall_core::{Context, ProvideCredential, Result};

/// StaticCredentialProvider always yields the same key pair.
///
/// [`DefaultCredentialProvider`](super::DefaultCredentialProvider) puts it
/// in front of every other source when [`Config`](crate::Config) carries
/// keys.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Create a provider for the given key pair.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            credential: Credential::new(access_key_id, secret_access_key),
        }
    }

    /// Attach a session token to the key pair.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.credential.session_token = Some(token.to_string());
        self
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(self.credential.clone()))
    }
}
