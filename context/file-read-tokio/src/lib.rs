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

//! Tokio-based file reading for cloudcall.
//!
//! `TokioFileRead` implements the `FileRead` trait from `cloudcall_core`.
//! Profile based credential providers use it to load the shared
//! credentials and config files.
//!
//! ## Example
//!
//! ```no_run
//! use cloudcall_core::{Context, OsEnv};
//! use cloudcall_file_read_tokio::TokioFileRead;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = Context::new()
//!         .with_file_read(TokioFileRead)
//!         .with_env(OsEnv);
//!
//!     match ctx.file_read_as_string("/home/alice/.aws/credentials").await {
//!         Ok(content) => println!("Read {} bytes", content.len()),
//!         Err(e) => eprintln!("Failed to read file: {}", e),
//!     }
//! }
//! ```

use async_trait::async_trait;
use cloudcall_core::{Error, FileRead, Result};

/// Tokio-based implementation of the `FileRead` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileRead;

#[async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| {
            Error::unexpected("failed to read file")
                .with_context(format!("path: {path}"))
                .with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudcall_core::Context;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_existing_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[default]").unwrap();
        let path = f.path().to_string_lossy().to_string();

        let ctx = Context::new().with_file_read(TokioFileRead);
        let content = ctx.file_read_as_string(&path).await.unwrap();
        assert_eq!(content, "[default]\n");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").to_string_lossy().to_string();

        let err = TokioFileRead.file_read(&path).await.unwrap_err();
        assert_eq!(err.context(), [format!("path: {path}")]);
    }
}
