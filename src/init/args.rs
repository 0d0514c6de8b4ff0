// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineConfig;
use crate::storage::azure::AzureBlobConfig;
use crate::watcher::WatcherConfig;

#[derive(Debug, Args, Clone)]
pub struct UploaderRun {
    /// Directory to watch for rotated log files
    #[arg(long, env = "LOGSHIP_WATCH_DIR")]
    pub watch_dir: PathBuf,

    /// Storage provider
    #[arg(
        long,
        env = "LOGSHIP_STORAGE_PROVIDER",
        default_value = "azureblob"
    )]
    pub storage_provider: String,

    /// Destination container
    #[arg(long, env = "LOGSHIP_CONTAINER", default_value = "logs")]
    pub container: String,

    /// Create the container before watching
    #[arg(long, env = "LOGSHIP_CREATE_CONTAINER", default_value = "false")]
    pub create_container: bool,

    /// Maximum concurrent uploads
    #[arg(long, env = "LOGSHIP_MAX_CONCURRENT_UPLOADS", default_value = "1")]
    pub max_concurrent_uploads: usize,

    /// Interval between idle checks
    #[arg(
        long,
        env = "LOGSHIP_TICK_INTERVAL",
        default_value = "2s",
        value_parser = humantime::parse_duration
    )]
    pub tick_interval: Duration,

    /// Silence between file events before the session is finalized
    #[arg(
        long,
        env = "LOGSHIP_IDLE_THRESHOLD",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub idle_threshold: Duration,

    /// Comma-separated path suffixes to ignore (transient editor files)
    #[arg(
        long,
        env = "LOGSHIP_IGNORE_SUFFIXES",
        default_value = ".swp",
        value_delimiter = ','
    )]
    pub ignore_suffixes: Vec<String>,

    #[command(flatten)]
    pub azure: AzureBlobArgs,
}

#[derive(Debug, Args, Clone, Default)]
pub struct AzureBlobArgs {
    /// Azure storage account name
    #[arg(
        long("azure-storage-account"),
        env = "LOGSHIP_AZURE_STORAGE_ACCOUNT"
    )]
    pub account: Option<String>,

    /// Azure storage access key (base64)
    #[arg(
        long("azure-storage-access-key"),
        env = "LOGSHIP_AZURE_STORAGE_ACCESS_KEY"
    )]
    pub access_key: Option<String>,

    /// Azure blob service endpoint override (azurite, sovereign clouds)
    #[arg(long("azure-endpoint"), env = "LOGSHIP_AZURE_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl AzureBlobArgs {
    pub fn to_config(&self) -> AzureBlobConfig {
        AzureBlobConfig {
            account: self.account.clone().unwrap_or_default(),
            access_key: self.access_key.clone().unwrap_or_default(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl From<&UploaderRun> for PipelineConfig {
    fn from(args: &UploaderRun) -> Self {
        PipelineConfig {
            directory: args.watch_dir.clone(),
            provider: args.storage_provider.clone(),
            container: args.container.clone(),
            ensure_container: args.create_container,
            max_concurrent_uploads: args.max_concurrent_uploads,
            tick_interval: args.tick_interval,
            idle_threshold: args.idle_threshold,
            event_buffer: 1,
            watcher: WatcherConfig {
                ignore_suffixes: args.ignore_suffixes.clone(),
            },
        }
    }
}
