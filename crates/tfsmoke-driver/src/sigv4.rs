//! AWS Signature Version 4 for already-built `reqwest` requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Request;
use sha2::{Digest, Sha256};

use crate::credentials::AwsCredentials;
use crate::error::DriverError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Credential scope for one day, region and service.
struct Scope<'a> {
    date: String,
    region: &'a str,
    service: &'a str,
}

impl Scope<'_> {
    fn signing_key(&self, secret: &str) -> Vec<u8> {
        [self.date.as_str(), self.region, self.service, "aws4_request"]
            .iter()
            .fold(format!("AWS4{}", secret).into_bytes(), |key, part| hmac(&key, part))
    }
}

impl std::fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/aws4_request", self.date, self.region, self.service)
    }
}

/// Sign `req` in place at `now`.
///
/// Every header already on the request is covered by the signature, together
/// with `host`, `x-amz-date`, `x-amz-content-sha256` and the session token.
/// Set `Content-Type` and `X-Amz-Target` before calling. Requests carrying a
/// query string are not supported; every call here is a `POST /`.
pub(crate) fn sign_request(
    req: &mut Request,
    creds: &AwsCredentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<(), DriverError> {
    if req.url().query().is_some() {
        return Err(DriverError::Internal(format!(
            "cannot sign {}: query strings are not supported",
            req.url()
        )));
    }

    let body = req.body().and_then(|b| b.as_bytes()).unwrap_or_default();
    let payload_hash = hex::encode(Sha256::digest(body));
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

    let host = match (req.url().host_str(), req.url().port()) {
        (Some(h), Some(p)) => format!("{}:{}", h, p),
        (Some(h), None) => h.to_string(),
        (None, _) => {
            return Err(DriverError::Internal(format!("cannot sign {}: no host", req.url())));
        }
    };

    let headers = req.headers_mut();
    headers.insert("x-amz-date", header_value(&timestamp)?);
    headers.insert("x-amz-content-sha256", header_value(&payload_hash)?);
    if let Some(token) = &creds.session_token {
        headers.insert("x-amz-security-token", header_value(token)?);
    }

    let mut canonical: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            let value = String::from_utf8_lossy(v.as_bytes()).trim().to_string();
            (k.as_str().to_string(), value)
        })
        .collect();
    canonical.insert("host".into(), host);

    let signed_headers = canonical.keys().map(String::as_str).collect::<Vec<_>>().join(";");
    let canonical_headers: String =
        canonical.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect();
    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        req.method(),
        req.url().path(),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = Scope { date: now.format("%Y%m%d").to_string(), region, service };
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let signature = hex::encode(hmac(&scope.signing_key(&creds.secret_access_key), &string_to_sign));

    let authorization = format!(
        "{} Credential={}/{},SignedHeaders={},Signature={}",
        ALGORITHM, creds.access_key_id, scope, signed_headers, signature
    );
    req.headers_mut()
        .insert(HeaderName::from_static("authorization"), header_value(&authorization)?);
    Ok(())
}

fn header_value(v: &str) -> Result<HeaderValue, DriverError> {
    HeaderValue::from_str(v).map_err(|e| DriverError::Internal(format!("invalid header value: {}", e)))
}
