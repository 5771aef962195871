// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::constants::{AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN};
use crate::Credential;
use async_trait::async_trait;
use cloudcall_core::{Context, ProvideCredential, Result};

/// Reads keys from `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`.
///
/// Both must be set and non-empty, otherwise the provider yields nothing and
/// the chain moves on. `AWS_SESSION_TOKEN` is picked up when present.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for EnvCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>> {
        let Some(access_key_id) = ctx.env_first(&[AWS_ACCESS_KEY_ID]) else {
            return Ok(None);
        };
        let Some(secret_access_key) = ctx.env_first(&[AWS_SECRET_ACCESS_KEY]) else {
            log::debug!("{AWS_ACCESS_KEY_ID} is set without {AWS_SECRET_ACCESS_KEY}, skipping");
            return Ok(None);
        };

        let mut cred = Credential::new(access_key_id, secret_access_key);
        cred.session_token = ctx.env_first(&[AWS_SESSION_TOKEN]);
        Ok(Some(cred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudcall_core::StaticEnv;
    use test_case::test_case;

    fn ctx_with(envs: &[(&str, &str)]) -> Context {
        let envs = envs.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: envs.collect(),
        })
    }

    #[tokio::test]
    async fn test_keys_and_token() -> anyhow::Result<()> {
        let ctx = ctx_with(&[
            (AWS_ACCESS_KEY_ID, "test_access_key"),
            (AWS_SECRET_ACCESS_KEY, "test_secret_key"),
            (AWS_SESSION_TOKEN, "test_session_token"),
        ]);

        let cred = EnvCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .expect("credential must be loaded");
        assert_eq!(cred.access_key_id, "test_access_key");
        assert_eq!(cred.secret_access_key, "test_secret_key");
        assert_eq!(cred.session_token.as_deref(), Some("test_session_token"));

        Ok(())
    }

    #[test_case(&[] ; "no variables")]
    #[test_case(&[(AWS_ACCESS_KEY_ID, "test_access_key")] ; "only access key")]
    #[test_case(&[(AWS_SECRET_ACCESS_KEY, "test_secret_key")] ; "only secret key")]
    #[test_case(&[(AWS_ACCESS_KEY_ID, ""), (AWS_SECRET_ACCESS_KEY, "test_secret_key")] ; "empty access key")]
    #[tokio::test]
    async fn test_incomplete_keys(envs: &[(&str, &str)]) -> anyhow::Result<()> {
        let ctx = ctx_with(envs);

        let cred = EnvCredentialProvider::new().provide_credential(&ctx).await?;
        assert!(cred.is_none());

        Ok(())
    }
}
