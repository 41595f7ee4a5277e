// src/sink/sheets.rs
//! Google Sheets v4 values API, authenticated with a service-account key
//! (RS256 JWT grant).

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::{known_ids_from_rows, LedgerSink};
use crate::config::SheetsConfig;
use crate::error::CallError;
use crate::model::{SheetRow, SHEET_HEADER};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh this long before the token actually expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct GoogleSheetsSink {
    http: reqwest::Client,
    sheet_id: String,
    worksheet: String,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsSink {
    pub fn from_config(cfg: &SheetsConfig, http: reqwest::Client) -> anyhow::Result<Self> {
        let key = load_key(&cfg.service_account_json)?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service account private_key is not a valid RSA PEM")?;
        Ok(Self {
            http,
            sheet_id: cfg.sheet_id.clone(),
            worksheet: cfg.worksheet.clone(),
            key,
            signing_key,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, CallError> {
        let mut guard = self.token.lock().await;
        if let Some(t) = guard.as_ref() {
            if Instant::now() < t.refresh_at {
                return Ok(t.value.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| CallError::permanent(format!("sheets-auth: signing JWT: {e}")))?;

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("sheets-auth", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status("sheets-auth", status, &body));
        }
        let tok: TokenResp = resp
            .json()
            .await
            .map_err(|e| CallError::permanent(format!("sheets-auth: decoding token: {e}")))?;

        let lifetime = Duration::from_secs(tok.expires_in).saturating_sub(TOKEN_SLACK);
        *guard = Some(CachedToken {
            value: tok.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        tracing::debug!(target: "sheets", expires_in = tok.expires_in, "access token refreshed");
        Ok(tok.access_token)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<url::Url, CallError> {
        let mut u = url::Url::parse(SHEETS_BASE)
            .map_err(|e| CallError::permanent(format!("sheets: base url: {e}")))?;
        u.path_segments_mut()
            .map_err(|_| CallError::permanent("sheets: base url cannot be a base"))?
            .push(&self.sheet_id)
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(u)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, CallError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(self.values_url(range, "")?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("sheets-read", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status("sheets-read", status, &body));
        }
        let vr: ValueRange = resp
            .json()
            .await
            .map_err(|e| CallError::permanent(format!("sheets-read: decoding: {e}")))?;
        Ok(vr.values)
    }

    async fn append_values(&self, values: Vec<Vec<String>>) -> Result<(), CallError> {
        let token = self.access_token().await?;
        let mut u = self.values_url(&a1_range(&self.worksheet, "A1"), ":append")?;
        u.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let resp = self
            .http
            .post(u)
            .bearer_auth(token)
            .json(&json!({ "values": values }))
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("sheets-append", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status("sheets-append", status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerSink for GoogleSheetsSink {
    async fn ensure_header(&self) -> Result<(), CallError> {
        let first = self.get_values(&a1_range(&self.worksheet, "A1:H1")).await?;
        if first.iter().any(|r| r.iter().any(|c| !c.trim().is_empty())) {
            return Ok(());
        }
        tracing::info!(target: "sheets", worksheet = %self.worksheet, "writing header row");
        self.append_values(vec![SHEET_HEADER.iter().map(|s| s.to_string()).collect()])
            .await
    }

    async fn read_known_ids(&self) -> Result<HashSet<String>, CallError> {
        let rows = self.get_values(&a1_range(&self.worksheet, "A:G")).await?;
        let ids = known_ids_from_rows(&rows);
        tracing::debug!(target: "sheets", rows = rows.len(), known = ids.len(), "ledger read");
        Ok(ids)
    }

    async fn append_row(&self, row: &SheetRow) -> Result<(), CallError> {
        self.append_values(vec![row.to_cells()]).await
    }
}

fn load_key(path: &Path) -> anyhow::Result<ServiceAccountKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading service account key {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing service account key {}", path.display()))
}

/// `'My Tab'!A:G`; plain names are left unquoted.
fn a1_range(worksheet: &str, cells: &str) -> String {
    if worksheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{worksheet}!{cells}")
    } else {
        format!("'{}'!{cells}", worksheet.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_quotes_when_needed() {
        assert_eq!(a1_range("Sheet1", "A:G"), "Sheet1!A:G");
        assert_eq!(a1_range("AI News", "A1"), "'AI News'!A1");
        assert_eq!(a1_range("Bob's", "A1"), "'Bob''s'!A1");
    }

    #[test]
    fn key_file_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        std::fs::write(&path, r#"{"client_email":"x@y.iam.gserviceaccount.com"}"#).unwrap();
        let err = load_key(&path).unwrap_err().to_string();
        assert!(err.contains("sa.json"), "{err}");
        assert!(load_key(&dir.path().join("missing.json")).is_err());
    }
}
