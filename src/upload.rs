//! Azure Blob Storage replica of the artifact.
//!
//! Uploads the exact bytes written locally with a single `Put Blob` request
//! signed with the account's Shared Key. The local file stays the source of
//! truth: a failed upload is logged by the pipeline and the run continues.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! account = "publicdata"
//! container = "feeds"
//! blob = "missing-children.json"
//! # endpoint_url = "http://127.0.0.1:10000/devstoreaccount1"   # Azurite
//! ```
//!
//! The base64 account key comes from `AZURE_STORAGE_ACCOUNT_KEY`. Without
//! it (or without a `[storage]` section) the uploader is never built.
//!
//! # Authentication
//!
//! [Shared Key](https://learn.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
//! over the string built by [`string_to_sign`]:
//!
//! ```text
//! PUT\n\n\n<Content-Length>\n\n<Content-Type>\n\n\n\n\n\n\n
//! x-ms-blob-cache-control:<cache control>\n
//! x-ms-blob-content-type:<content type>\n
//! x-ms-blob-type:BlockBlob\n
//! x-ms-date:<RFC 1123 date>\n
//! x-ms-version:<api version>\n
//! /<account>/<container>/<blob>
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::StorageConfig;
use crate::http;
use crate::traits::ArtifactUploader;

type HmacSha256 = Hmac<Sha256>;

/// Storage REST API version sent as `x-ms-version`.
pub const API_VERSION: &str = "2021-08-06";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub struct BlobUploader {
    config: StorageConfig,
    key: Vec<u8>,
    client: reqwest::Client,
}

impl BlobUploader {
    /// `account_key` is the base64 string from the portal; it is decoded here
    /// so a malformed key fails at startup instead of on every run.
    pub fn new(config: &StorageConfig, account_key: &str) -> Result<Self> {
        let key = BASE64
            .decode(account_key.trim())
            .context("AZURE_STORAGE_ACCOUNT_KEY is not valid base64")?;
        Ok(Self {
            config: config.clone(),
            key,
            client: http::client(config.timeout_secs)?,
        })
    }

    pub fn url(&self) -> String {
        let base = match self.config.endpoint_url {
            Some(ref endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}", self.config.account, self.config.service),
        };
        format!(
            "{}/{}/{}",
            base,
            http::uri_encode(&self.config.container),
            http::encode_path(&self.config.blob)
        )
    }

    /// Headers and `Authorization` value for a PUT of `len` bytes at `now`.
    pub fn signed_headers(&self, len: usize, now: DateTime<Utc>) -> Vec<(String, String)> {
        let request = PutBlob {
            account: &self.config.account,
            container: &self.config.container,
            blob: &self.config.blob,
            content_length: len,
            content_type: CONTENT_TYPE,
            cache_control: &self.config.cache_control,
            date: rfc1123(now),
        };
        let signature = sign(&self.key, &string_to_sign(&request));

        vec![
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ("x-ms-blob-cache-control".to_string(), request.cache_control.to_string()),
            ("x-ms-blob-content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
            ("x-ms-date".to_string(), request.date.clone()),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
            (
                "Authorization".to_string(),
                format!("SharedKey {}:{}", self.config.account, signature),
            ),
        ]
    }
}

#[async_trait]
impl ArtifactUploader for BlobUploader {
    fn target(&self) -> String {
        format!("{}/{}/{}", self.config.account, self.config.container, self.config.blob)
    }

    async fn upload(&self, bytes: &[u8]) -> Result<()> {
        let url = self.url();
        let mut req = self.client.put(&url).body(bytes.to_vec());
        for (name, value) in self.signed_headers(bytes.len(), Utc::now()) {
            req = req.header(name, value);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to PUT blob {}", self.target()))?;

        let status = resp.status();
        if !status.is_success() {
            let excerpt = http::body_excerpt(resp).await;
            bail!("Put Blob failed (HTTP {}): {}", status, excerpt);
        }

        debug!(blob = %self.target(), bytes = bytes.len(), "blob uploaded");
        Ok(())
    }
}

/// Inputs to the Shared Key string for one `Put Blob`.
#[derive(Debug, Clone)]
pub struct PutBlob<'a> {
    pub account: &'a str,
    pub container: &'a str,
    pub blob: &'a str,
    pub content_length: usize,
    pub content_type: &'a str,
    pub cache_control: &'a str,
    pub date: String,
}

pub fn string_to_sign(req: &PutBlob<'_>) -> String {
    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    let content_length = if req.content_length == 0 {
        String::new()
    } else {
        req.content_length.to_string()
    };
    let standard = format!(
        "PUT\n\n\n{}\n\n{}\n\n\n\n\n\n\n",
        content_length, req.content_type
    );

    let mut ms_headers = [
        ("x-ms-blob-cache-control", req.cache_control.to_string()),
        ("x-ms-blob-content-type", req.content_type.to_string()),
        ("x-ms-blob-type", "BlockBlob".to_string()),
        ("x-ms-date", req.date.clone()),
        ("x-ms-version", API_VERSION.to_string()),
    ];
    ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = ms_headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_resource = format!("/{}/{}/{}", req.account, req.container, req.blob);

    format!("{}{}{}", standard, canonical_headers, canonical_resource)
}

/// Base64 HMAC-SHA256 of `string_to_sign` under the decoded account key.
pub fn sign(key: &[u8], string_to_sign: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// `Tue, 19 Aug 2025 10:00:00 GMT`
pub fn rfc1123(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn storage() -> StorageConfig {
        StorageConfig {
            account: "publicdata".into(),
            container: "feeds".into(),
            blob: "missing-children.json".into(),
            service: "blob.core.windows.net".into(),
            endpoint_url: None,
            cache_control: "public, max-age=300".into(),
            timeout_secs: 5,
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 19, 10, 0, 0).unwrap()
    }

    #[test]
    fn formats_rfc1123() {
        assert_eq!(rfc1123(fixed_time()), "Tue, 19 Aug 2025 10:00:00 GMT");
    }

    #[test]
    fn string_to_sign_layout() {
        let req = PutBlob {
            account: "publicdata",
            container: "feeds",
            blob: "missing-children.json",
            content_length: 42,
            content_type: CONTENT_TYPE,
            cache_control: "public, max-age=300",
            date: rfc1123(fixed_time()),
        };
        let expected = "PUT\n\n\n42\n\napplication/json; charset=utf-8\n\n\n\n\n\n\n\
x-ms-blob-cache-control:public, max-age=300\n\
x-ms-blob-content-type:application/json; charset=utf-8\n\
x-ms-blob-type:BlockBlob\n\
x-ms-date:Tue, 19 Aug 2025 10:00:00 GMT\n\
x-ms-version:2021-08-06\n\
/publicdata/feeds/missing-children.json";
        assert_eq!(string_to_sign(&req), expected);
    }

    #[test]
    fn signature_is_hmac_of_decoded_key() {
        // Independent computation with the same primitives.
        let key = b"super-secret-account-key";
        let sig = sign(key, "hello");
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(b"hello");
        assert_eq!(sig, BASE64.encode(mac.finalize().into_bytes()));
        assert_eq!(BASE64.decode(&sig).unwrap().len(), 32);
        assert_ne!(sign(b"other", "hello"), sig);
    }

    #[test]
    fn uploader_decodes_key_and_signs() {
        let key_b64 = BASE64.encode(b"super-secret-account-key");
        let uploader = BlobUploader::new(&storage(), &key_b64).unwrap();
        let headers = uploader.signed_headers(42, fixed_time());

        let auth = &headers.iter().find(|(k, _)| k == "Authorization").unwrap().1;
        let req = PutBlob {
            account: "publicdata",
            container: "feeds",
            blob: "missing-children.json",
            content_length: 42,
            content_type: CONTENT_TYPE,
            cache_control: "public, max-age=300",
            date: rfc1123(fixed_time()),
        };
        let expected = sign(b"super-secret-account-key", &string_to_sign(&req));
        assert_eq!(auth, &format!("SharedKey publicdata:{}", expected));

        for name in ["x-ms-blob-type", "x-ms-date", "x-ms-version", "x-ms-blob-content-type"] {
            assert!(headers.iter().any(|(k, _)| k == name), "missing {}", name);
        }
    }

    #[test]
    fn rejects_non_base64_key() {
        assert!(BlobUploader::new(&storage(), "not base64!!").is_err());
    }

    #[test]
    fn url_uses_account_host_or_endpoint() {
        let key = BASE64.encode(b"k");
        let uploader = BlobUploader::new(&storage(), &key).unwrap();
        assert_eq!(
            uploader.url(),
            "https://publicdata.blob.core.windows.net/feeds/missing-children.json"
        );

        let mut cfg = storage();
        cfg.endpoint_url = Some("http://127.0.0.1:10000/devstoreaccount1/".into());
        let uploader = BlobUploader::new(&cfg, &key).unwrap();
        assert_eq!(
            uploader.url(),
            "http://127.0.0.1:10000/devstoreaccount1/feeds/missing-children.json"
        );
    }
}
