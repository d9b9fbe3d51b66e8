//! S3-compatible object store adapter.
//!
//! Uploads and fetches raw PDF bytes with the S3 REST API, signing every
//! request with AWS Signature V4 (`hmac` + `sha2`, no vendor SDK). A custom
//! endpoint can be configured for S3-compatible services (MinIO, LocalStack)
//! and for tests; the standard virtual-host address is used otherwise.

use crate::config::get_config;
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

type HmacSha256 = Hmac<Sha256>;

const DATE_STAMP: &[FormatItem<'_>] = format_description!("[year][month][day]");
const AMZ_DATE: &[FormatItem<'_>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Errors returned while interacting with the object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Request did not complete within the configured timeout.
    #[error("Object store request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before a response was received.
    #[error("Object store request failed: {0}")]
    Http(String),
    /// Store responded with an unexpected status code.
    #[error("Object store returned {status} for key '{key}': {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: u16,
        /// Object key the request addressed.
        key: String,
        /// Response body associated with the failure.
        body: String,
    },
}

impl StorageError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// Signed HTTP client for a single bucket.
pub struct ObjectStore {
    pub(crate) client: Client,
    pub(crate) bucket: String,
    pub(crate) region: String,
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    pub(crate) endpoint_url: Option<String>,
}

impl ObjectStore {
    /// Construct a store client from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let client = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for object store");
        Self {
            client,
            bucket: config.s3_bucket.clone(),
            region: config.aws_region.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            endpoint_url: config.s3_endpoint_url.clone(),
        }
    }

    /// Store raw bytes under `key`.
    pub async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.send_object_request(Method::PUT, key, Some(bytes.clone())),
            StorageError::is_transient,
        )
        .await?;
        tracing::debug!(key, size = bytes.len(), "Object stored");
        Ok(())
    }

    /// Fetch the raw bytes stored under `key`.
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.send_object_request(Method::GET, key, None),
            StorageError::is_transient,
        )
        .await
    }

    /// Public retrieval URL for an uploaded object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme(), self.host(), encode_key(key))
    }

    async fn send_object_request(
        &self,
        method: Method,
        key: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, StorageError> {
        let host = self.host();
        let encoded_key = encode_key(key);
        let url = format!("{}://{}/{}", self.scheme(), host, encoded_key);

        let now = OffsetDateTime::now_utc();
        let date_stamp = now.format(DATE_STAMP).expect("date stamp format");
        let amz_date = now.format(AMZ_DATE).expect("amz date format");

        let payload_hash = hex_sha256(body.as_deref().unwrap_or_default());

        // Headers must be sorted for the canonical request.
        let headers = [
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = format!(
            "{}\n/{}\n\n{}\n{}\n{}",
            method.as_str(),
            encoded_key,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&self.secret_access_key, &date_stamp, &self.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key_id
        );

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date);
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        let response = request.send().await.map_err(StorageError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error = StorageError::UnexpectedStatus {
                status,
                key: key.to_string(),
                body,
            };
            tracing::error!(key, error = %error, "Object store request failed");
            return Err(error);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(StorageError::from_reqwest)?
            .to_vec();
        Ok(bytes)
    }

    fn host(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    fn scheme(&self) -> &'static str {
        match &self.endpoint_url {
            Some(endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        }
    }
}

/// URI-encode an object key per RFC 3986, preserving path separators.
fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Encode all characters except unreserved ones: `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(segment: &str) -> String {
    let mut encoded = String::new();
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key:
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, "s3")
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::PUT, MockServer};

    fn store_for(server: &MockServer) -> ObjectStore {
        ObjectStore {
            client: Client::builder()
                .user_agent("pdfchat-test")
                .build()
                .expect("client"),
            bucket: "docs".into(),
            region: "us-east-1".into(),
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            endpoint_url: Some(server.base_url()),
        }
    }

    #[test]
    fn public_url_uses_virtual_host_addressing() {
        let store = ObjectStore {
            client: Client::new(),
            bucket: "docs".into(),
            region: "eu-west-2".into(),
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            endpoint_url: None,
        };
        assert_eq!(
            store.public_url("report_482913.pdf"),
            "https://docs.s3.eu-west-2.amazonaws.com/report_482913.pdf"
        );
    }

    #[test]
    fn keys_with_reserved_characters_are_encoded() {
        assert_eq!(encode_key("annual report.pdf"), "annual%20report.pdf");
        assert_eq!(encode_key("a/b c.pdf"), "a/b%20c.pdf");
    }

    #[test]
    fn signing_key_is_deterministic() {
        let first = derive_signing_key("secret", "20260825", "us-east-1");
        let second = derive_signing_key("secret", "20260825", "us-east-1");
        assert_eq!(first, second);
        assert_ne!(first, derive_signing_key("other", "20260825", "us-east-1"));
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_signed_requests() {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/report_123456.pdf")
                    .header_exists("authorization")
                    .header_exists("x-amz-date");
                then.status(200);
            })
            .await;
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/report_123456.pdf");
                then.status(200).body("%PDF-1.7");
            })
            .await;

        let store = store_for(&server);
        store
            .put_object("report_123456.pdf", b"%PDF-1.7".to_vec())
            .await
            .expect("put");
        let bytes = store.get_object("report_123456.pdf").await.expect("get");

        put.assert();
        get.assert();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn denied_access_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/denied.pdf");
                then.status(403).body("SignatureDoesNotMatch");
            })
            .await;

        let store = store_for(&server);
        let error = store
            .put_object("denied.pdf", b"data".to_vec())
            .await
            .expect_err("forbidden");
        match error {
            StorageError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("SignatureDoesNotMatch"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
