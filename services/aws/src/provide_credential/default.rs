use crate::provide_credential::{
    EnvCredentialProvider, ImdsCredentialProvider, ProfileCredentialProvider,
    StaticCredentialProvider,
};
use crate::{Config, Credential};
use async_trait::async_trait;
use cloudcall_core::{Context, ProvideCredential, ProvideCredentialChain, Result};

/// DefaultCredentialProvider is a loader that will try to load credential via default chains.
///
/// Resolution order:
///
/// 1. Static keys set on [`Config`]
/// 2. Environment variables
/// 3. Shared profile files (`~/.aws/credentials`, `~/.aws/config`)
/// 4. EC2 IMDSv2
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Build the chain described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut chain = ProvideCredentialChain::new();

        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            let mut provider = StaticCredentialProvider::new(ak, sk);
            if let Some(token) = &config.session_token {
                provider = provider.with_session_token(token);
            }
            chain = chain.push(provider);
        }

        chain = chain.push(EnvCredentialProvider::new()).push(
            ProfileCredentialProvider::new()
                .with_profile(&config.profile)
                .with_config_file(&config.config_file)
                .with_credentials_file(&config.shared_credentials_file),
        );

        if !config.ec2_metadata_disabled {
            chain = chain.push(ImdsCredentialProvider::new().with_endpoint(&config.imds_endpoint));
        }

        Self { chain }
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}
