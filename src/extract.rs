//! Document text extraction.
//!
//! [`FileExtractor`] turns a source path into plain UTF-8 text. Sources
//! are local filesystem paths or `s3://bucket/key` URIs; formats are
//! dispatched on the file extension:
//!
//! | Extension | Handling | Failure kind |
//! |-----------|----------|--------------|
//! | `.pdf` | `pdf-extract`, optional 1-indexed page range | `PDF_PROCESSING_ERROR` |
//! | `.docx` | ZIP + `word/document.xml` text runs | `DOCX_PROCESSING_ERROR` |
//! | `.md`, `.txt` | UTF-8 decode | `FILE_DECODING_ERROR` |
//! | other | — | `UNSUPPORTED_FILE_TYPE` |
//!
//! S3 objects are fetched with an AWS SigV4-signed GET (pure-Rust
//! `hmac` + `sha2` signing, credentials from the environment); fetch
//! failures surface as `OBJECT_STORE_ERROR` and transient ones are
//! retried under the shared policy.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, Result, StructuredError};
use crate::retry::{retry_async, RetryPolicy};

/// Decompressed ceiling for a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Inclusive, 1-indexed PDF page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start == 0 || end < start {
            return Err(StructuredError::invalid_input(format!(
                "page range must be 1-indexed with start <= end, got {start}..{end}"
            )));
        }
        Ok(Self { start, end })
    }
}

/// Source-to-text seam the ingestion pipeline depends on.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve `source` (local path or `s3://bucket/key`) and extract
    /// its plain text. `pages` narrows PDF extraction and is ignored
    /// for other formats.
    async fn extract(&self, source: &str, pages: Option<PageRange>) -> Result<String>;
}

/// Extractor over the local filesystem and S3.
pub struct FileExtractor {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new(RetryPolicy::from_timeout(
            std::time::Duration::from_secs(30),
            3,
        ))
    }
}

impl FileExtractor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    async fn load_bytes(&self, source: &str) -> Result<Vec<u8>> {
        if let Some(rest) = source.strip_prefix("s3://") {
            let (bucket, key) = parse_s3_path(rest, source)?;
            return self.fetch_s3_object(&bucket, &key).await;
        }

        if source.contains("://") {
            return Err(StructuredError::invalid_input(format!(
                "unsupported source scheme: {source}"
            )));
        }

        let path = Path::new(source);
        match std::fs::metadata(path) {
            Err(_) => Err(StructuredError::new(
                ErrorKind::FileNotFound,
                format!("file not found: {source}"),
            )),
            Ok(meta) if !meta.is_file() => Err(StructuredError::invalid_input(format!(
                "not a regular file: {source}"
            ))),
            Ok(_) => tokio::fs::read(path).await.map_err(|e| {
                StructuredError::invalid_input(format!("failed to read {source}"))
                    .with_details(e.to_string())
            }),
        }
    }

    /// Signed S3 GET, retried on network faults and 429/5xx.
    async fn fetch_s3_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let creds = AwsCredentials::from_env()?;
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        retry_async(
            &self.policy,
            |err: &S3Error| matches!(err, S3Error::Transient(_)),
            || s3_get(&self.client, &creds, &region, bucket, key),
        )
        .await
        .map_err(|err| match err {
            S3Error::Fatal(e) => e,
            S3Error::Transient(detail) => StructuredError::new(
                ErrorKind::ObjectStore,
                format!("failed to fetch s3://{bucket}/{key} after retries"),
            )
            .with_details(detail),
        })
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    async fn extract(&self, source: &str, pages: Option<PageRange>) -> Result<String> {
        let bytes = self.load_bytes(source).await?;

        let ext = extension_of(source).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => extract_pdf(&bytes, pages),
            Some("docx") => extract_docx(&bytes),
            Some("md") | Some("txt") => String::from_utf8(bytes).map_err(|e| {
                StructuredError::new(
                    ErrorKind::FileDecoding,
                    format!("{source} is not valid UTF-8"),
                )
                .with_details(e.to_string())
            }),
            other => Err(StructuredError::new(
                ErrorKind::UnsupportedFileType,
                match other {
                    Some(ext) => format!("unsupported file type: .{ext}"),
                    None => format!("cannot determine file type of {source}"),
                },
            )),
        }
    }
}

fn extension_of(source: &str) -> Option<&str> {
    let name = source.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Split the remainder of an `s3://` URI into bucket and key.
fn parse_s3_path(rest: &str, source: &str) -> Result<(String, String)> {
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(StructuredError::invalid_input(format!(
            "S3 path must be s3://bucket/key, got {source}"
        ))),
    }
}

// ============ Format extraction ============

fn extract_pdf(bytes: &[u8], pages: Option<PageRange>) -> Result<String> {
    let pdf_err = |e: pdf_extract::OutputError| {
        StructuredError::new(ErrorKind::PdfProcessing, "failed to extract PDF text")
            .with_details(e.to_string())
    };

    match pages {
        None => pdf_extract::extract_text_from_mem(bytes).map_err(pdf_err),
        Some(range) => {
            let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(pdf_err)?;
            if range.start > page_texts.len() {
                return Err(StructuredError::invalid_input(format!(
                    "page range starts at {} but the document has {} pages",
                    range.start,
                    page_texts.len()
                )));
            }
            let end = range.end.min(page_texts.len());
            Ok(page_texts[range.start - 1..end].join("\n"))
        }
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx_err = |detail: String| {
        StructuredError::new(ErrorKind::DocxProcessing, "failed to extract DOCX text")
            .with_details(detail)
    };

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| docx_err(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| docx_err("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| docx_err(e.to_string()))?;
    }
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_err("word/document.xml exceeds size limit".to_string()));
    }

    extract_text_runs(&doc_xml).map_err(docx_err)
}

/// Collect the contents of `w:t` text-run elements, separating runs
/// with spaces so words from adjacent runs do not fuse.
fn extract_text_runs(xml: &[u8]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

// ============ S3 (AWS SigV4) ============

type HmacSha256 = Hmac<Sha256>;

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            StructuredError::new(
                ErrorKind::ObjectStore,
                "AWS_ACCESS_KEY_ID environment variable not set",
            )
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            StructuredError::new(
                ErrorKind::ObjectStore,
                "AWS_SECRET_ACCESS_KEY environment variable not set",
            )
        })?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

enum S3Error {
    Transient(String),
    Fatal(StructuredError),
}

impl std::fmt::Display for S3Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            S3Error::Transient(detail) => write!(f, "{detail}"),
            S3Error::Fatal(err) => write!(f, "{err}"),
        }
    }
}

/// One signed GetObject request.
async fn s3_get(
    client: &reqwest::Client,
    creds: &AwsCredentials,
    region: &str,
    bucket: &str,
    key: &str,
) -> std::result::Result<Vec<u8>, S3Error> {
    let host = match std::env::var("AWS_ENDPOINT_URL") {
        Ok(endpoint) => endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string(),
        Err(_) => format!("{bucket}.s3.{region}.amazonaws.com"),
    };

    let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    let url = format!("https://{host}/{encoded_key}");

    let now = Utc::now();
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();

    let canonical_request = format!(
        "GET\n/{encoded_key}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let credential_scope = format!("{date_stamp}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    );

    let mut request = client
        .get(&url)
        .header("Authorization", &authorization)
        .header("x-amz-content-sha256", &payload_hash)
        .header("x-amz-date", &amz_date);
    if let Some(ref token) = creds.session_token {
        request = request.header("x-amz-security-token", token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| S3Error::Transient(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail: String = body.chars().take(500).collect();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(S3Error::Transient(format!(
                "S3 GetObject failed (HTTP {status}): {detail}"
            )));
        }
        return Err(S3Error::Fatal(
            StructuredError::new(
                ErrorKind::ObjectStore,
                format!("S3 GetObject failed (HTTP {status}) for s3://{bucket}/{key}"),
            )
            .with_details(detail),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| S3Error::Transient(format!("failed to read object body: {e}")))?;
    Ok(bytes.to_vec())
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

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// SigV4 key derivation chain: date, region, service, "aws4_request".
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding for SigV4 canonical requests.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}
