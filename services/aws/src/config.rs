use crate::constants::*;
use crate::retry::RetryConfig;
use cloudcall_core::Context;

/// Config for aws services.
#[derive(Clone, Debug)]
pub struct Config {
    /// `region` will be loaded from:
    ///
    /// - env value: [`AWS_REGION`]
    /// - env value: [`AWS_DEFAULT_REGION`]
    /// - default to: `us-east-1`
    pub region: String,
    /// `profile` will be loaded from:
    ///
    /// - env value: [`AWS_PROFILE`]
    /// - env value: [`AWS_DEFAULT_PROFILE`]
    /// - default to: `default`
    pub profile: String,
    /// `config_file` will be load from:
    ///
    /// - env value: [`AWS_CONFIG_FILE`]
    /// - default to: `~/.aws/config`
    pub config_file: String,
    /// `shared_credentials_file` will be loaded from:
    ///
    /// - env value: [`AWS_SHARED_CREDENTIALS_FILE`]
    /// - default to: `~/.aws/credentials`
    pub shared_credentials_file: String,
    /// Static access key id. Only set explicitly, never read from env.
    pub access_key_id: Option<String>,
    /// Static secret access key. Only set explicitly, never read from env.
    pub secret_access_key: Option<String>,
    /// Static session token. Only set explicitly, never read from env.
    pub session_token: Option<String>,
    /// `ec2_metadata_disabled` value will be loaded from:
    ///
    /// - env value: [`AWS_EC2_METADATA_DISABLED`]
    pub ec2_metadata_disabled: bool,
    /// `imds_endpoint` value will be loaded from:
    ///
    /// - env value: [`AWS_EC2_METADATA_SERVICE_ENDPOINT`]
    /// - default to: `http://169.254.169.254`
    pub imds_endpoint: String,
    /// Retry settings applied to every retry-safe call.
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: "default".to_string(),
            config_file: "~/.aws/config".to_string(),
            shared_credentials_file: "~/.aws/credentials".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            ec2_metadata_disabled: false,
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the environment of `ctx`.
    pub fn from_env(ctx: &Context) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = ctx.env_first(&[AWS_REGION, AWS_DEFAULT_REGION]) {
            cfg.region = v;
        }
        if let Some(v) = ctx.env_first(&[AWS_PROFILE, AWS_DEFAULT_PROFILE]) {
            cfg.profile = v;
        }
        if let Some(v) = ctx.env_var(AWS_CONFIG_FILE) {
            cfg.config_file = v;
        }
        if let Some(v) = ctx.env_var(AWS_SHARED_CREDENTIALS_FILE) {
            cfg.shared_credentials_file = v;
        }
        cfg.ec2_metadata_disabled = ctx.env_flag(AWS_EC2_METADATA_DISABLED);
        if let Some(v) = ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT) {
            cfg.imds_endpoint = v.trim_end_matches('/').to_string();
        }

        cfg
    }

    /// Set the default region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the profile name.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Use a fixed access key pair ahead of every other credential source.
    pub fn with_static_credential(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self.session_token = session_token;
        self
    }

    /// Set the retry settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
