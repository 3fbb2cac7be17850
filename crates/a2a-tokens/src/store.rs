use a2a_core::types::TokenId;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{instrument, warn};

use crate::error::{Result, TokenError};
use crate::types::{RateWindows, Token, TokenSpec, ValidationFailure};

const WIRE_PREFIX: &str = "fed_";

/// Single JSON document, one row per token, keyed by [`TokenId`].
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Document {
    tokens: HashMap<String, Token>,
}

/// File-backed, single-writer-per-process token store.
///
/// Atomic write, no partial files, targeting a single small JSON document
/// since the whole token set fits comfortably in memory and is read far more
/// often than it's written.
pub struct TokenStore {
    path: PathBuf,
    doc: RwLock<Document>,
}

impl TokenStore {
    /// Load `path`, tolerating a missing file (fresh install) but failing on
    /// a file that exists and fails to parse — recovering a corrupt token
    /// store is an operator decision, not something to paper over silently.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(TokenError::Io(e)),
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    #[instrument(skip(self, spec), fields(owner = %spec.owner, tier = %spec.tier))]
    pub fn create(&self, spec: TokenSpec) -> Result<(String, Token)> {
        let id = TokenId::new();
        let wire = generate_wire_token();
        let secret_hash = digest(&wire);
        let (allowed_topics, allowed_goals, disclosure, notify, rate_limits) = spec.resolve();

        let token = Token {
            id: id.clone(),
            secret_hash,
            name: spec.name,
            owner: spec.owner,
            tier: spec.tier,
            allowed_topics,
            allowed_goals,
            disclosure,
            notify,
            max_calls: spec.max_calls,
            calls_made: 0,
            rate_limits,
            windows: RateWindows::default(),
            created_at: Utc::now(),
            expires_at: spec.expires_at,
            last_used: None,
            revoked: false,
            linked_contact_id: spec.linked_contact_id,
        };

        {
            let mut doc = self.doc.write().expect("token store lock poisoned");
            doc.tokens.insert(id.as_str().to_string(), token.clone());
            self.persist(&doc)?;
        }

        Ok((format!("{WIRE_PREFIX}{wire}"), token))
    }

    /// Validate a wire token and, on success, return the matching record.
    /// Does not meter the call — callers invoke [`Self::meter`] once the
    /// turn actually runs.
    #[instrument(skip(self, wire_token))]
    pub fn validate(&self, wire_token: &str) -> Result<std::result::Result<Token, ValidationFailure>> {
        let hash = digest(wire_token.strip_prefix(WIRE_PREFIX).unwrap_or(wire_token));
        let doc = self.doc.read().expect("token store lock poisoned");
        let found = doc.tokens.values().find(|t| t.secret_hash == hash).cloned();
        drop(doc);

        let Some(token) = found else {
            return Ok(Err(ValidationFailure::NotFound));
        };
        if token.revoked {
            return Ok(Err(ValidationFailure::Revoked));
        }
        if let Some(exp) = token.expires_at {
            if Utc::now() >= exp {
                return Ok(Err(ValidationFailure::Expired));
            }
        }
        if let Some(max) = token.max_calls {
            if token.calls_made >= max {
                return Ok(Err(ValidationFailure::CallBudgetExceeded));
            }
        }
        if let Some(window) = self.rate_limited(&token) {
            return Ok(Err(ValidationFailure::RateLimited { window }));
        }
        Ok(Ok(token))
    }

    /// Atomically advance usage counters for a successful call. Persists
    /// before returning so a crash between meter and response never loses
    /// the accounting (the worst case is double-counting, not undercounting).
    #[instrument(skip(self))]
    pub fn meter(&self, id: &TokenId) -> Result<Token> {
        let mut doc = self.doc.write().expect("token store lock poisoned");
        let token = doc
            .tokens
            .get_mut(id.as_str())
            .ok_or_else(|| TokenError::NotFound(id.to_string()))?;

        roll_windows(&mut token.windows);
        token.windows.minute_count += 1;
        token.windows.hour_count += 1;
        token.windows.day_count += 1;
        token.calls_made += 1;
        token.last_used = Some(Utc::now());
        let updated = token.clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub fn revoke(&self, id: &TokenId) -> Result<()> {
        let mut doc = self.doc.write().expect("token store lock poisoned");
        if let Some(token) = doc.tokens.get_mut(id.as_str()) {
            token.revoked = true;
        }
        self.persist(&doc)?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &TokenId) -> Option<Token> {
        self.doc
            .read()
            .expect("token store lock poisoned")
            .tokens
            .get(id.as_str())
            .cloned()
    }

    pub fn list(&self) -> Vec<Token> {
        self.doc
            .read()
            .expect("token store lock poisoned")
            .tokens
            .values()
            .cloned()
            .collect()
    }

    /// Checks and, on a pass, **advances** the wall-clock windows — reset
    /// happens here so a later [`Self::meter`] call increments a window that
    /// already reflects the current bucket.
    fn rate_limited(&self, token: &Token) -> Option<&'static str> {
        let mut windows = token.windows.clone();
        roll_windows(&mut windows);
        if let Some(limit) = token.rate_limits.per_minute {
            if windows.minute_count >= limit {
                return Some("minute");
            }
        }
        if let Some(limit) = token.rate_limits.per_hour {
            if windows.hour_count >= limit {
                return Some("hour");
            }
        }
        if let Some(limit) = token.rate_limits.per_day {
            if windows.day_count >= limit {
                return Some("day");
            }
        }
        None
    }

    /// Write-to-temp-then-rename so a reader never observes a partially
    /// written document, with owner-only file permissions since the
    /// document holds secret hashes (not plaintext, but still sensitive).
    fn persist(&self, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = tempfile::Builder::new()
            .prefix(".tokens-")
            .suffix(".json.tmp")
            .tempfile_in(self.path.parent().unwrap_or_else(|| Path::new(".")))?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tmp.as_file().metadata()?.permissions();
            perms.set_mode(0o600);
            tmp.as_file().set_permissions(perms)?;
        }

        tmp.persist(&self.path).map_err(|e| {
            warn!(error = %e, "failed to persist token store");
            TokenError::Io(e.error)
        })?;
        Ok(())
    }
}

fn roll_windows(windows: &mut RateWindows) {
    let now = Utc::now();
    let minute_bucket = now.format("%Y-%m-%dT%H:%M").to_string();
    let hour_bucket = now.format("%Y-%m-%dT%H").to_string();
    let day_bucket = now.format("%Y-%m-%d").to_string();

    if windows.minute_bucket.as_deref() != Some(minute_bucket.as_str()) {
        windows.minute_bucket = Some(minute_bucket);
        windows.minute_count = 0;
    }
    if windows.hour_bucket.as_deref() != Some(hour_bucket.as_str()) {
        windows.hour_bucket = Some(hour_bucket);
        windows.hour_count = 0;
    }
    if windows.day_bucket.as_deref() != Some(day_bucket.as_str()) {
        windows.day_bucket = Some(day_bucket);
        windows.day_count = 0;
    }
}

fn generate_wire_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url(&bytes)
}

fn digest(wire_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(wire_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn base64_url(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_core::types::Tier;

    fn spec(owner: &str) -> TokenSpec {
        TokenSpec {
            name: "friend-bot".to_string(),
            owner: owner.to_string(),
            tier: Tier::Friends,
            ..Default::default()
        }
    }

    #[test]
    fn wire_token_is_never_recoverable_from_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let (wire, token) = store.create(spec("alice")).unwrap();
        assert!(wire.starts_with(WIRE_PREFIX));
        assert_ne!(token.secret_hash, wire);
        let reloaded = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let stored = reloaded.find_by_id(&token.id).unwrap();
        assert_ne!(stored.secret_hash, wire);
    }

    #[test]
    fn validate_rejects_revoked_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let (wire, token) = store.create(spec("bob")).unwrap();
        store.revoke(&token.id).unwrap();
        let result = store.validate(&wire).unwrap();
        assert_eq!(result.unwrap_err(), ValidationFailure::Revoked);
    }

    #[test]
    fn call_budget_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let mut s = spec("carl");
        s.max_calls = Some(1);
        let (wire, token) = store.create(s).unwrap();
        assert!(store.validate(&wire).unwrap().is_ok());
        store.meter(&token.id).unwrap();
        let result = store.validate(&wire).unwrap();
        assert_eq!(result.unwrap_err(), ValidationFailure::CallBudgetExceeded);
    }
}
