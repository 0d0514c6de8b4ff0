// SPDX-License-Identifier: Apache-2.0

//! Storage provider registration for process startup.

use crate::init::args::UploaderRun;
use crate::storage::azure::{AzureBlobClient, AZURE_BLOB_PROVIDER};
use crate::storage::{ProviderRegistry, StorageBackend};

/// Build the registry of storage providers available to this build.
/// Registration happens once here, before any pipeline starts.
pub fn build_registry(args: &UploaderRun) -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    let azure_config = args.azure.to_config();
    registry.register(
        AZURE_BLOB_PROVIDER,
        Box::new(move || {
            AzureBlobClient::connect(azure_config.clone())
                .map(|client| Box::new(client) as Box<dyn StorageBackend>)
        }),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        run: UploaderRun,
    }

    #[test]
    fn azure_provider_registered() {
        let cli = TestCli::parse_from([
            "logship",
            "--watch-dir",
            "/var/log/import",
            "--azure-storage-account",
            "devaccount",
            "--azure-storage-access-key",
            "c2VjcmV0LWtleQ==",
        ]);

        let registry = build_registry(&cli.run);
        assert!(registry.lookup(AZURE_BLOB_PROVIDER).is_ok());
    }

    #[test]
    fn missing_credentials_fail_at_lookup() {
        let cli = TestCli::parse_from(["logship", "--watch-dir", "/var/log/import"]);

        let registry = build_registry(&cli.run);
        let err = registry.lookup(AZURE_BLOB_PROVIDER).unwrap_err();
        assert!(matches!(err, StorageError::Setup(_)));
    }
}
