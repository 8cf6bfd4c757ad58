//! Per-content read tokens.
//!
//! At most one token is live per content id. Issuing again replaces it, so
//! only the latest token verifies. Tokens also lapse after a fixed TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::debug;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct IssuedToken {
    token: String,
    issued_at: Instant,
}

#[derive(Debug, Clone)]
pub struct GatewayAuth {
    tokens: Arc<RwLock<HashMap<String, IssuedToken>>>,
    ttl: Duration,
}

impl GatewayAuth {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Issue a fresh token for `content_id`, replacing any earlier one.
    pub async fn issue(&self, content_id: &str) -> String {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);

        self.tokens.write().await.insert(
            content_id.to_string(),
            IssuedToken {
                token: token.clone(),
                issued_at: Instant::now(),
            },
        );
        debug!(cid = %content_id, "Issued gateway token");
        token
    }

    /// Whether `presented` is the current, unexpired token for `content_id`.
    pub async fn verify(&self, content_id: &str, presented: &str) -> bool {
        let tokens = self.tokens.read().await;
        let Some(issued) = tokens.get(content_id) else {
            return false;
        };
        if issued.issued_at.elapsed() >= self.ttl {
            return false;
        }
        constant_time_eq(issued.token.as_bytes(), presented.as_bytes())
    }

    /// Drop every token past its TTL.
    pub async fn purge_expired(&self) {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, issued| issued.issued_at.elapsed() < self.ttl);
        let removed = before - tokens.len();
        if removed > 0 {
            debug!(removed, "Purged expired gateway tokens");
        }
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}
