use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use cloudcall_core::{Context, Error, ProvideCredential, Result};
use ini::Ini;
use log::debug;

/// ProfileCredentialProvider loads AWS credentials from the shared profile files.
///
/// The shared credentials file is read first, then the config file:
///
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`), where every
///   profile except `default` lives in a `[profile <name>]` section
///
/// The profile to use is determined by:
/// 1. The `AWS_PROFILE` environment variable
/// 2. The `AWS_DEFAULT_PROFILE` environment variable
/// 3. The profile specified via `with_profile()`
/// 4. Default to "default"
#[derive(Debug)]
pub struct ProfileCredentialProvider {
    profile: String,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

impl Default for ProfileCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self {
            profile: "default".to_string(),
            config_file: None,
            credentials_file: None,
        }
    }

    /// Set the profile name to use.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn profile(&self, ctx: &Context) -> String {
        ctx.env_first(&[AWS_PROFILE, AWS_DEFAULT_PROFILE])
            .unwrap_or_else(|| self.profile.clone())
    }

    fn credentials_path(&self, ctx: &Context) -> String {
        self.credentials_file
            .clone()
            .or_else(|| ctx.env_var(AWS_SHARED_CREDENTIALS_FILE))
            .unwrap_or_else(|| "~/.aws/credentials".to_string())
    }

    fn config_path(&self, ctx: &Context) -> String {
        self.config_file
            .clone()
            .or_else(|| ctx.env_var(AWS_CONFIG_FILE))
            .unwrap_or_else(|| "~/.aws/config".to_string())
    }
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let profile = self.profile(ctx);

        let path = self.credentials_path(ctx);
        if let Some(cred) = load_from_file(ctx, &path, &profile).await? {
            return Ok(Some(cred));
        }

        let section = match profile.as_str() {
            "default" => "default".to_string(),
            x => format!("profile {x}"),
        };
        let path = self.config_path(ctx);
        load_from_file(ctx, &path, &section).await
    }
}

/// Load the key pair stored in `section` of the ini file at `path`.
///
/// Missing files and sections are not errors, a file that cannot be parsed is.
async fn load_from_file(ctx: &Context, path: &str, section: &str) -> Result<Option<Credential>> {
    let Some(expanded_path) = ctx.expand_home_dir(path) else {
        debug!("failed to expand homedir for path: {path}");
        return Ok(None);
    };

    let content = match ctx.file_read_as_string(&expanded_path).await {
        Ok(content) => content,
        Err(err) => {
            debug!("failed to read profile file {expanded_path}: {err:?}");
            return Ok(None);
        }
    };

    let conf = Ini::load_from_str(&content).map_err(|e| {
        Error::config_invalid("failed to parse profile file")
            .with_context(format!("path: {expanded_path}"))
            .with_source(anyhow::Error::new(e))
    })?;

    let Some(props) = conf.section(Some(section)) else {
        debug!("section [{section}] not found in {expanded_path}");
        return Ok(None);
    };

    match (
        props.get("aws_access_key_id"),
        props.get("aws_secret_access_key"),
    ) {
        (Some(ak), Some(sk)) => {
            let mut cred = Credential::new(ak, sk);
            cred.session_token = props.get("aws_session_token").map(|s| s.to_string());
            Ok(Some(cred))
        }
        _ => Ok(None),
    }
}
