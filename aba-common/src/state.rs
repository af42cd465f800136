// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use crate::config::{AppConfig, StorageConfig, WebhookConfig};

// Shared, read-only process state handed to request handlers
#[derive(Clone, Default, Debug)]
pub struct State {
    pub config: AppConfig,
}

impl State {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.config.storage
    }

    pub fn webhook(&self) -> &WebhookConfig {
        &self.config.webhook
    }
}
