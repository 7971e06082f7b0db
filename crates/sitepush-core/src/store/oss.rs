//! Aliyun OSS client
//!
//! Speaks the subset of the OSS REST API the publisher needs: bucket listing,
//! object HEAD/PUT/DELETE, multi-object delete and the `?website`
//! sub-resource. Requests are signed with the V1 header scheme:
//!
//! ```text
//! Authorization: OSS <AccessKeyId>:base64(hmac-sha1(secret, StringToSign))
//! StringToSign = VERB \n Content-MD5 \n Content-Type \n Date \n CanonicalizedResource
//! ```

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use ring::hmac;
use serde::Deserialize;
use url::Url;

use super::{ListPage, ObjectHead, RemoteObject, RemoteStore, StoreError, StoreResult};
use crate::config::OssSettings;

/// Objects requested per listing page (the API maximum).
pub const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct OssStore {
    client: reqwest::Client,
    base_url: Url,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
}

impl OssStore {
    /// Build a client for the bucket described by `settings`.
    ///
    /// Without an explicit endpoint the virtual-hosted URL
    /// `https://<bucket>.<region>.aliyuncs.com` is used.
    pub fn new(settings: &OssSettings) -> anyhow::Result<Self> {
        let base = match settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => endpoint.to_string(),
            None => format!(
                "https://{}.{}.aliyuncs.com",
                settings.bucket, settings.region
            ),
        };
        let base_url = Url::parse(&base)
            .map_err(|e| anyhow::anyhow!("Invalid OSS endpoint '{}': {}", base, e))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("sitepush/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url,
            bucket: settings.bucket.clone(),
            access_key_id: settings.access_key_id.clone(),
            access_key_secret: settings.access_key_secret.clone(),
        })
    }

    fn object_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in name.split('/') {
                segments.push(segment);
            }
        }
        url
    }

    fn bucket_url(&self, sub_resource: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(sub_resource);
        url
    }

    fn authorization(&self, string_to_sign: &str) -> String {
        format!(
            "OSS {}:{}",
            self.access_key_id,
            sign(&self.access_key_secret, string_to_sign)
        )
    }

    async fn send(&self, request: SignedRequest<'_>) -> StoreResult<reqwest::Response> {
        let date = http_date(Utc::now());
        let body_md5 = request.body.as_deref().map(content_md5).unwrap_or_default();
        let string_to_sign = string_to_sign(
            request.method.as_str(),
            &body_md5,
            request.content_type.unwrap_or(""),
            &date,
            &request.resource,
        );

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header("Date", &date)
            .header("Authorization", self.authorization(&string_to_sign));
        if let Some(content_type) = request.content_type {
            builder = builder.header("Content-Type", content_type);
        }
        if !body_md5.is_empty() {
            builder = builder.header("Content-MD5", &body_md5);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::trace!(method = %request.method, url = %request.url, "oss request");
        builder.send().await.map_err(|source| StoreError::Transport {
            url: request.url.to_string(),
            source,
        })
    }

    async fn expect_success(
        operation: &str,
        response: reqwest::Response,
    ) -> StoreResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            operation: operation.to_string(),
            status,
            message: error_message(&body),
        })
    }

    fn canonical_object(&self, name: &str) -> String {
        format!("/{}/{}", self.bucket, name)
    }

    fn canonical_bucket(&self, sub_resource: Option<&str>) -> String {
        match sub_resource {
            Some(sub) => format!("/{}/?{}", self.bucket, sub),
            None => format!("/{}/", self.bucket),
        }
    }
}

struct SignedRequest<'a> {
    method: Method,
    url: Url,
    resource: String,
    content_type: Option<&'a str>,
    body: Option<Vec<u8>>,
}

#[async_trait]
impl RemoteStore for OssStore {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, marker: Option<&str>) -> StoreResult<ListPage> {
        let mut url = self.bucket_url(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("max-keys", &LIST_PAGE_SIZE.to_string());
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        let response = self
            .send(SignedRequest {
                method: Method::GET,
                url,
                resource: self.canonical_bucket(None),
                content_type: None,
                body: None,
            })
            .await?;
        let response = Self::expect_success("ListObjects", response).await?;
        let body = response.text().await.map_err(|e| StoreError::Decode {
            what: "ListObjects response".to_string(),
            reason: e.to_string(),
        })?;
        parse_list_page(&body)
    }

    async fn get(&self, name: &str) -> StoreResult<ObjectHead> {
        let response = self
            .send(SignedRequest {
                method: Method::HEAD,
                url: self.object_url(name),
                resource: self.canonical_object(name),
                content_type: None,
                body: None,
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        let response = Self::expect_success("HeadObject", response).await?;
        let header = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode {
                what: format!("Last-Modified of {}", name),
                reason: "header missing".to_string(),
            })?;
        let last_modified = parse_http_date(header).ok_or_else(|| StoreError::Decode {
            what: format!("Last-Modified of {}", name),
            reason: format!("unrecognised date '{}'", header),
        })?;
        Ok(ObjectHead {
            name: name.to_string(),
            last_modified,
        })
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let response = self
            .send(SignedRequest {
                method: Method::DELETE,
                url: self.object_url(name),
                resource: self.canonical_object(name),
                content_type: None,
                body: None,
            })
            .await?;
        Self::expect_success("DeleteObject", response).await?;
        Ok(())
    }

    async fn delete_multi(&self, names: &[String]) -> StoreResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let response = self
            .send(SignedRequest {
                method: Method::POST,
                url: self.bucket_url(Some("delete")),
                resource: self.canonical_bucket(Some("delete")),
                content_type: Some("application/xml"),
                body: Some(delete_request_body(names).into_bytes()),
            })
            .await?;
        Self::expect_success("DeleteMultipleObjects", response).await?;
        Ok(())
    }

    async fn put(&self, name: &str, local_path: &Path) -> StoreResult<()> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        let response = self
            .send(SignedRequest {
                method: Method::PUT,
                url: self.object_url(name),
                resource: self.canonical_object(name),
                content_type: Some(content_type_for(name)),
                body: Some(body),
            })
            .await?;
        Self::expect_success("PutObject", response).await?;
        Ok(())
    }

    async fn put_website(&self, index_page: &str, error_page: &str) -> StoreResult<()> {
        let response = self
            .send(SignedRequest {
                method: Method::PUT,
                url: self.bucket_url(Some("website")),
                resource: self.canonical_bucket(Some("website")),
                content_type: Some("application/xml"),
                body: Some(website_request_body(index_page, error_page).into_bytes()),
            })
            .await?;
        Self::expect_success("PutBucketWebsite", response).await?;
        Ok(())
    }
}

/// Assemble the V1 string-to-sign (no `x-oss-*` headers are sent).
fn string_to_sign(
    verb: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    resource: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        verb, content_md5, content_type, date, resource
    )
}

fn sign(secret: &str, string_to_sign: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret.as_bytes());
    let tag = hmac::sign(&key, string_to_sign.as_bytes());
    BASE64.encode(tag.as_ref())
}

fn content_md5(body: &[u8]) -> String {
    BASE64.encode(md5::compute(body).0)
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_marker: Option<String>,
    #[serde(default)]
    contents: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
    last_modified: String,
}

fn parse_list_page(body: &str) -> StoreResult<ListPage> {
    let result: ListBucketResult =
        quick_xml::de::from_str(body).map_err(|e| StoreError::Decode {
            what: "ListObjects response".to_string(),
            reason: e.to_string(),
        })?;

    let objects = result
        .contents
        .into_iter()
        .map(|entry| {
            DateTime::parse_from_rfc3339(&entry.last_modified)
                .map(|modified| RemoteObject::new(entry.key.clone(), modified.with_timezone(&Utc)))
                .map_err(|e| StoreError::Decode {
                    what: format!("LastModified of {}", entry.key),
                    reason: e.to_string(),
                })
        })
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(ListPage {
        objects,
        is_truncated: result.is_truncated,
        next_marker: result.next_marker.filter(|m| !m.is_empty()),
    })
}

fn delete_request_body(names: &[String]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Delete><Quiet>true</Quiet>",
    );
    for name in names {
        body.push_str("<Object><Key>");
        body.push_str(&quick_xml::escape::escape(name.as_str()));
        body.push_str("</Key></Object>");
    }
    body.push_str("</Delete>");
    body
}

fn website_request_body(index_page: &str, error_page: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><WebsiteConfiguration>\
         <IndexDocument><Suffix>{}</Suffix></IndexDocument>\
         <ErrorDocument><Key>{}</Key></ErrorDocument>\
         </WebsiteConfiguration>",
        quick_xml::escape::escape(index_page),
        quick_xml::escape::escape(error_page)
    )
}

/// Pull `<Message>` out of an OSS error document, falling back to the raw body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct OssError {
        code: String,
        message: String,
    }

    match quick_xml::de::from_str::<OssError>(body) {
        Ok(err) => format!("{} ({})", err.message, err.code),
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

/// Content type by file extension; browsers need the right one for html/css/js.
fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
