// SPDX-License-Identifier: Apache-2.0

//! Azure Blob storage backend.
//!
//! Connection setup happens once in [`AzureBlobClient::connect`]: the
//! signing credential is derived from the account key, the service
//! endpoint is resolved, and the HTTP client is built. A failed
//! `connect` is surfaced to the caller; nothing is retried here.

pub mod auth;
pub mod config;

pub use auth::SharedKeyCredential;
pub use config::AzureBlobConfig;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use std::time::Duration;
use tracing::debug;

use crate::storage::{OperationResponse, StorageBackend, StorageError};

/// Provider name the blob backend registers under.
pub const AZURE_BLOB_PROVIDER: &str = "azureblob";

const STORAGE_SERVICE_VERSION: &str = "2021-08-06";
const UPLOAD_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug)]
pub struct AzureBlobClient {
    credential: SharedKeyCredential,
    endpoint: String,
    endpoint_path: String,
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl AzureBlobClient {
    /// Build a connected client: derive the signing credential, resolve
    /// the endpoint and construct the request pipeline. This is the
    /// one-time setup step; all errors surface here rather than on the
    /// first upload.
    pub fn connect(config: AzureBlobConfig) -> Result<Self, StorageError> {
        config.validate().map_err(StorageError::Setup)?;

        init_crypto_provider()?;

        let credential = SharedKeyCredential::new(&config.account, &config.access_key)?;

        let endpoint = config.endpoint_or_default();
        let uri: Uri = endpoint
            .parse()
            .map_err(|e| StorageError::Setup(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(StorageError::Setup(format!(
                "endpoint must be an absolute URL: {}",
                endpoint
            )));
        }
        let endpoint_path = uri.path().trim_end_matches('/').to_string();

        let client = build_client()?;

        debug!(endpoint = %endpoint, "Connected Azure blob client");

        Ok(Self {
            credential,
            endpoint,
            endpoint_path,
            client,
        })
    }

    /// Issue a signed PUT and return the raw response status. Transport
    /// failures are errors; any HTTP status, success or not, is an `Ok`.
    async fn put(
        &self,
        resource: &str,
        query: &[(&str, &str)],
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Result<OperationResponse, StorageError> {
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_str(&body.len().to_string())
                .map_err(|e| StorageError::InvalidRequest(e.to_string()))?,
        );
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string())
                .map_err(|e| StorageError::InvalidRequest(e.to_string()))?,
        );
        headers.insert(
            "x-ms-version",
            HeaderValue::from_static(STORAGE_SERVICE_VERSION),
        );

        let sign_path = format!("{}{}", self.endpoint_path, resource);
        let authorization =
            self.credential
                .authorization(&Method::PUT, &sign_path, query, &headers)?;
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| StorageError::InvalidRequest(e.to_string()))?,
        );

        let mut url = format!("{}{}", self.endpoint, resource);
        for (i, (name, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(name);
            url.push('=');
            url.push_str(value);
        }

        let mut builder = Request::builder().method(Method::PUT).uri(url);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        match self.client.request(request).await {
            Err(e) => Err(StorageError::Transport(e.to_string())),
            Ok(response) => {
                let (head, body) = response.into_parts();
                // drain so the connection can be reused
                let _ = body.collect().await;
                Ok(OperationResponse::new(head.status))
            }
        }
    }
}

#[async_trait]
impl StorageBackend for AzureBlobClient {
    async fn create_container(
        &self,
        container: &str,
    ) -> Result<OperationResponse, StorageError> {
        if container.is_empty() {
            return Err(StorageError::InvalidRequest(
                "container name is empty".to_string(),
            ));
        }

        let resource = format!("/{}", container);
        self.put(
            &resource,
            &[("restype", "container")],
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
    }

    async fn upload_object(
        &self,
        container: &str,
        object: &str,
        data: Bytes,
    ) -> Result<OperationResponse, StorageError> {
        if container.is_empty() || object.is_empty() {
            return Err(StorageError::InvalidRequest(
                "container or object name is empty".to_string(),
            ));
        }

        let resource = format!("/{}/{}", container, object);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(UPLOAD_CONTENT_TYPE));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));

        self.put(&resource, &[], headers, data).await
    }
}

fn build_client(
) -> Result<HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>, StorageError> {
    let tls_config = rustls::ClientConfig::builder()
        .with_native_roots()
        .map_err(|e| StorageError::Setup(format!("failed to load TLS roots: {}", e)))?
        .with_no_client_auth();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .build();

    let client = hyper_util::client::legacy::Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(https);

    Ok(client)
}

fn init_crypto_provider() -> Result<(), StorageError> {
    if CryptoProvider::get_default().is_none() {
        // a concurrent caller may win the install race, that is fine
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
            && CryptoProvider::get_default().is_none()
        {
            return Err(StorageError::Setup(
                "failed to initialize crypto library".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AzureBlobConfig {
        AzureBlobConfig {
            account: "devaccount".to_string(),
            access_key: "c2VjcmV0LWtleQ==".to_string(),
            endpoint: None,
        }
    }

    #[test]
    fn connect_with_valid_config() {
        let client = AzureBlobClient::connect(valid_config()).unwrap();
        assert_eq!(client.endpoint, "https://devaccount.blob.core.windows.net");
        assert_eq!(client.endpoint_path, "");
        assert_eq!(client.credential.account(), "devaccount");
    }

    #[test]
    fn connect_keeps_endpoint_override_path() {
        let mut config = valid_config();
        config.endpoint = Some("http://127.0.0.1:10000/devaccount".to_string());

        let client = AzureBlobClient::connect(config).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:10000/devaccount");
        assert_eq!(client.endpoint_path, "/devaccount");
    }

    #[test]
    fn connect_rejects_bad_key() {
        let mut config = valid_config();
        config.access_key = "%%%".to_string();

        let err = AzureBlobClient::connect(config).unwrap_err();
        assert!(matches!(err, StorageError::Setup(_)));
    }

    #[test]
    fn connect_rejects_relative_endpoint() {
        let mut config = valid_config();
        config.endpoint = Some("devaccount.example.net/base".to_string());

        let err = AzureBlobClient::connect(config).unwrap_err();
        assert!(matches!(err, StorageError::Setup(_)));
    }

    #[tokio::test]
    async fn empty_names_rejected_before_any_request() {
        let client = AzureBlobClient::connect(valid_config()).unwrap();

        let err = client.create_container("").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRequest(_)));

        let err = client
            .upload_object("logs", "", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRequest(_)));
    }
}
