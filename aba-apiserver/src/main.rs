// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

mod cli;
mod commands;

use std::sync::Arc;
use std::process;
use clap::Parser;
use clap::CommandFactory;
use rustls::crypto::aws_lc_rs;

use aba_common::config::{AppConfig, AppConfigBuilder};
use aba_common::state::State;
use aba_common::telemetry::{error, info, setup_logging, LogFormat};
use aba_storage::api::v1alpha1::tidb_config::TidbConfig;
use aba_storage::backend::configmap::create_k8s_client;
use aba_storage::EntryStore;
use aba_webhook::server;

use crate::cli::{CliArgs, Commands};

fn load_config(args: &CliArgs) -> AppConfig {
    let mut builder = AppConfigBuilder::default();
    if let Some(path) = &args.config {
        builder.with_file(path);
    }
    builder
        .with_env()
        .with_override_option("storage.namespace", args.namespace.as_deref())
        .build()
        .unwrap_or_else(|e| {
            error!(
                event = "Error",
                error = %e,
            );
            process::exit(1);
        })
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let Some(cmd) = &args.cmd else {
        let mut cmd = CliArgs::command();
        let _ = cmd.print_help();
        process::exit(1);
    };

    match cmd {
        Commands::Webhook => setup_logging(LogFormat::Json),
        _ => setup_logging(LogFormat::Compact),
    }

    // Load configuration
    let config = load_config(&args);

    if let Commands::Webhook = cmd {
        // Install the default aws_lc_rs crypto provider
        let _ = aws_lc_rs::default_provider().install_default();

        info!(
            event = "Starting",
            version = env!("CARGO_PKG_VERSION"),
        );

        // Run Webhook server
        let state = Arc::new(State::new(config));
        server::run(state).await.unwrap_or_else(|e| {
            error!(
                event = "Error",
                error = %e,
            );
            process::exit(1);
        });
        info!(event = "Stopped");
        return;
    }

    let client = create_k8s_client().await.unwrap_or_else(|e| {
        error!(
            event = "Error",
            error = %e,
        );
        process::exit(1);
    });
    let store = EntryStore::<TidbConfig>::with_config_maps(client, &config.storage);

    let result = match cmd {
        Commands::Get { key, resource_version, ignore_not_found } => {
            commands::get(&store, key, resource_version, *ignore_not_found).await
        },
        Commands::List { prefix, selector, field_selector } => {
            commands::list(&store, prefix, selector, field_selector).await
        },
        Commands::Count { prefix } => commands::count(&store, prefix).await,
        Commands::Create { file, ttl } => commands::create(&store, file, *ttl).await,
        Commands::Delete { key, uid } => commands::delete(&store, key, uid.as_deref()).await,
        Commands::Scale { key, replicas } => commands::scale(&store, key, *replicas).await,
        Commands::Watch { target, resource_version, selector } => {
            commands::watch(&store, target, resource_version, selector).await
        },
        Commands::Webhook => Ok(()),
    };

    if let Err(e) = result {
        error!(
            event = "Error",
            error = %e,
        );
        process::exit(1);
    }
}
