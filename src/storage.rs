//! S3-compatible object store for raw uploaded files.
//!
//! Puts and gets objects using the S3 REST API with AWS Signature V4
//! authentication, supporting custom endpoints for S3-compatible services
//! (MinIO, LocalStack). Uses only pure-Rust dependencies (`hmac`, `sha2`)
//! for signing.
//!
//! Credentials are read from environment variables:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Blob put/get against one bucket.
pub struct ObjectStore {
    config: StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl ObjectStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config,
            creds,
            client,
        })
    }

    /// Store an object under the configured prefix. Overwrites silently, as
    /// S3 puts do.
    pub async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let full_key = self.full_key(key);
        let (url, headers) = self.signed_request("PUT", &full_key, bytes);

        let mut req = self.client.put(&url).body(bytes.to_vec());
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = req.send().await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to put s3://{}/{}: {}",
                self.config.bucket,
                full_key,
                e
            )
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                full_key,
                body.chars().take(500).collect::<String>()
            );
        }

        Ok(())
    }

    /// Fetch an object's bytes.
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let full_key = self.full_key(key);
        let (url, headers) = self.signed_request("GET", &full_key, b"");

        let mut req = self.client.get(&url);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = req.send().await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to get s3://{}/{}: {}",
                self.config.bucket,
                full_key,
                e
            )
        })?;

        if !resp.status().is_success() {
            bail!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                full_key
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }

    fn full_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), key)
        }
    }

    /// Compute the endpoint host and URL scheme for the configured bucket.
    fn host_and_scheme(&self) -> (String, &'static str) {
        if let Some(ref endpoint) = self.config.endpoint_url {
            let scheme = if endpoint.starts_with("http://") {
                "http"
            } else {
                "https"
            };
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            (host, scheme)
        } else {
            (
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
                "https",
            )
        }
    }

    /// Build a SigV4-signed request URL and header set for one object.
    ///
    /// With a custom endpoint the bucket is path-style
    /// (`/{bucket}/{key}`); otherwise virtual-hosted style (`/{key}`).
    fn signed_request(&self, method: &str, key: &str, payload: &[u8]) -> (String, Vec<(String, String)>) {
        let (host, scheme) = self.host_and_scheme();

        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = if self.config.endpoint_url.is_some() {
            format!("/{}/{}", self.config.bucket, encoded_key)
        } else {
            format!("/{}", encoded_key)
        };

        let now = chrono::Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut out_headers = vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-content-sha256".to_string(), payload_hash),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(ref token) = self.creds.session_token {
            out_headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let url = format!("{}://{}{}", scheme, host, canonical_uri);
        (url, out_headers)
    }
}

// ============ AWS SigV4 Helpers ============

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

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, leaving unreserved characters
/// (`A-Z a-z 0-9 - _ . ~`) intact.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_encode_leaves_unreserved_intact() {
        assert_eq!(uri_encode("report-2026_final.txt"), "report-2026_final.txt");
    }

    #[test]
    fn uri_encode_escapes_spaces_and_unicode() {
        assert_eq!(uri_encode("a b"), "a%20b");
        assert_eq!(uri_encode("é"), "%C3%A9");
    }

    #[test]
    fn signing_key_is_deterministic() {
        let a = derive_signing_key("secret", "20260831", "us-east-1", "s3");
        let b = derive_signing_key("secret", "20260831", "us-east-1", "s3");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn known_sigv4_signing_key_vector() {
        // Example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }
}
