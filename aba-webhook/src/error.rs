// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("failed to load TLS certificate {cert_file} or key {key_file}: {source}")]
    Tls {
        cert_file: String,
        key_file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("webhook server failed: {0}")]
    Serve(#[from] std::io::Error),
}

pub type WebhookResult<T> = result::Result<T, WebhookError>;
