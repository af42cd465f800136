// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[
    clap(
        name = "aba-apiserver",
        version,
        author,
        about = "TiDB configuration objects stored in Kubernetes ConfigMaps"
    )
]
pub struct CliArgs {
    /// Configuration file (json, yaml or toml)
    #[clap(long, short = 'c', global = true, env = "ABA_CONFIG")]
    pub config: Option<String>,
    /// Namespace of the ConfigMaps holding the objects
    #[clap(long, short = 'n', global = true)]
    pub namespace: Option<String>,
    #[clap(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[
        clap(
            name = "webhook",
            about = "Run the admission webhook server",
        )
    ]
    Webhook,
    #[
        clap(
            name = "get",
            about = "Print the object stored under a key",
        )
    ]
    Get {
        /// Key of the object, /{group}/{kind}/{namespace}/{name}
        key: String,
        #[clap(long, default_value = "")]
        resource_version: String,
        /// Print an empty object instead of failing when the key is missing
        #[clap(long)]
        ignore_not_found: bool,
    },
    #[
        clap(
            name = "list",
            about = "Print every object under a key prefix",
        )
    ]
    List {
        /// Prefix of the objects, /{group}/{kind}[/{namespace}]
        prefix: String,
        #[clap(long, short = 'l', default_value = "")]
        selector: String,
        #[clap(long, default_value = "")]
        field_selector: String,
    },
    #[
        clap(
            name = "count",
            about = "Print the number of objects under a key prefix",
        )
    ]
    Count {
        prefix: String,
    },
    #[
        clap(
            name = "create",
            about = "Create a TidbConfig from a YAML file",
        )
    ]
    Create {
        #[clap(long, short = 'f')]
        file: String,
        /// Time to live in seconds, recorded on the entry
        #[clap(long)]
        ttl: Option<u64>,
    },
    #[
        clap(
            name = "delete",
            about = "Delete the object stored under a key",
        )
    ]
    Delete {
        key: String,
        /// Only delete the object with this uid
        #[clap(long)]
        uid: Option<String>,
    },
    #[
        clap(
            name = "scale",
            about = "Set the replicas of a TidbConfig",
        )
    ]
    Scale {
        key: String,
        #[clap(long)]
        replicas: i32,
    },
    #[
        clap(
            name = "watch",
            about = "Print changes of one object or of every object under a prefix",
        )
    ]
    Watch {
        /// Object key or key prefix
        target: String,
        /// "0" prints the current state first, a version resumes after it
        #[clap(long, default_value = "0")]
        resource_version: String,
        #[clap(long, short = 'l', default_value = "")]
        selector: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_options_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "aba-apiserver",
            "scale",
            "/tidb/tidbconfigs/default/cluster1",
            "--replicas",
            "4",
            "-n",
            "tidb-system",
        ])
        .expect("valid arguments");

        assert_eq!(args.namespace.as_deref(), Some("tidb-system"));
        assert!(matches!(
            args.cmd,
            Some(Commands::Scale { ref key, replicas: 4 }) if key == "/tidb/tidbconfigs/default/cluster1"
        ));
    }

    #[test]
    fn test_watch_defaults_to_current_state() {
        let args = CliArgs::try_parse_from(["aba-apiserver", "watch", "/tidb/tidbconfigs"]).expect("valid arguments");
        assert!(matches!(
            args.cmd,
            Some(Commands::Watch { ref resource_version, .. }) if resource_version == "0"
        ));
    }

    #[test]
    fn test_create_requires_file() {
        assert!(CliArgs::try_parse_from(["aba-apiserver", "create"]).is_err());
    }
}
