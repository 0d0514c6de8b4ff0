// SPDX-License-Identifier: Apache-2.0

//! Configuration for the Azure Blob backend.

/// Account identity and access credential for the blob service,
/// supplied at backend construction rather than per call.
#[derive(Debug, Clone, Default)]
pub struct AzureBlobConfig {
    /// Storage account name
    pub account: String,
    /// Base64-encoded shared access key
    pub access_key: String,
    /// Service endpoint override (defaults to the public Azure endpoint
    /// derived from the account name; set this for azurite or sovereign
    /// clouds)
    pub endpoint: Option<String>,
}

impl AzureBlobConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.account.is_empty() {
            return Err("Azure storage account must be specified".to_string());
        }

        if self.access_key.is_empty() {
            return Err("Azure storage access key must be specified".to_string());
        }

        Ok(())
    }

    /// Resolve the service endpoint for this account.
    pub fn endpoint_or_default(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.account),
        }
    }
}
