//! Gateway authentication: RFC 6238 TOTP enrolment plus session-token
//! bookkeeping for the resulting `Unconfigured -> Configured -> Active`
//! state machine.
//!
//! Hand-rolled rather than pulled from a crate, the same way the teacher
//! hand-rolls its own nonce/challenge exchange in `ws/handshake.rs` instead
//! of reaching for an auth framework — TOTP here is ~40 lines of HMAC-SHA1
//! over the existing `hmac`/`sha1` workspace deps, and base32 is a simple
//! enough bit-packing job that importing a crate for it would be the
//! unidiomatic choice, not the idiomatic one.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

const TOTP_STEP_SECS: i64 = 30;
const TOTP_DIGITS: u32 = 6;
const TOTP_SKEW_STEPS: i64 = 1;
const SECRET_BYTES: usize = 20;
const TOKEN_BYTES: usize = 32;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub fn base32_encode(data: &[u8]) -> String {
    let mut bits: u32 = 0;
    let mut bit_count: u32 = 0;
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    for &byte in data {
        bits = (bits << 8) | byte as u32;
        bit_count += 8;
        while bit_count >= 5 {
            bit_count -= 5;
            out.push(BASE32_ALPHABET[((bits >> bit_count) & 0x1f) as usize] as char);
        }
    }
    if bit_count > 0 {
        out.push(BASE32_ALPHABET[((bits << (5 - bit_count)) & 0x1f) as usize] as char);
    }
    out
}

fn hotp(secret: &[u8], counter: u64) -> u32 {
    type HmacSha1 = Hmac<Sha1>;
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);
    truncated % 10u32.pow(TOTP_DIGITS)
}

/// Accepts a code valid for the current 30s step or either neighbor, to
/// absorb clock drift between the gateway host and the authenticator app.
fn verify_totp(secret: &[u8], code: &str, now: DateTime<Utc>) -> bool {
    let counter = now.timestamp() / TOTP_STEP_SECS;
    for skew in -TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS {
        let step = counter + skew;
        if step < 0 {
            continue;
        }
        let expected = hotp(secret, step as u64);
        if format!("{expected:0width$}", width = TOTP_DIGITS as usize) == code {
            return true;
        }
    }
    false
}

fn provisioning_uri(secret_b32: &str, issuer: &str, account: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret_b32}&issuer={issuer}&algorithm=SHA1&digits={TOTP_DIGITS}&period={TOTP_STEP_SECS}"
    )
}

pub struct AuthSession {
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unconfigured,
    Configured,
}

/// Owns the TOTP secret and the set of live session tokens. One instance
/// per process — this build is single-user and loopback-only, so there is
/// no per-account partitioning to do.
pub struct AuthSessionStore {
    secret: RwLock<Option<Vec<u8>>>,
    pending_secret: RwLock<Option<Vec<u8>>>,
    sessions: DashMap<String, AuthSession>,
    idle_timeout: Duration,
}

impl AuthSessionStore {
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            secret: RwLock::new(None),
            pending_secret: RwLock::new(None),
            sessions: DashMap::new(),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        }
    }

    pub fn state(&self) -> AuthState {
        if self.secret.read().unwrap().is_some() {
            AuthState::Configured
        } else {
            AuthState::Unconfigured
        }
    }

    /// Generate a fresh secret and stash it as pending — it only becomes
    /// the live secret once the caller proves possession of it by posting
    /// back a valid code (`verify_and_activate`). Calling this again before
    /// confirming discards the previous pending secret.
    pub fn begin_setup(&self, issuer: &str, account: &str) -> (String, String) {
        let mut raw = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let encoded = base32_encode(&raw);
        *self.pending_secret.write().unwrap() = Some(raw.to_vec());
        let uri = provisioning_uri(&encoded, issuer, account);
        (encoded, uri)
    }

    /// Verify a TOTP code against the pending secret (completing setup) or
    /// the already-confirmed one (ordinary login), minting a session token
    /// on success.
    pub fn verify_and_activate(&self, code: &str) -> Option<String> {
        let now = Utc::now();

        let pending = self.pending_secret.read().unwrap().clone();
        if let Some(secret) = pending {
            if verify_totp(&secret, code, now) {
                *self.secret.write().unwrap() = Some(secret);
                *self.pending_secret.write().unwrap() = None;
                return Some(self.mint_token());
            }
        }

        let confirmed = self.secret.read().unwrap().clone();
        if let Some(secret) = confirmed {
            if verify_totp(&secret, code, now) {
                return Some(self.mint_token());
            }
        }

        None
    }

    fn mint_token(&self) -> String {
        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);
        let now = Utc::now();
        self.sessions.insert(token.clone(), AuthSession { created_at: now, last_active: now });
        token
    }

    /// Validate a bearer/query token, refreshing its idle-timeout clock.
    /// Evicts and rejects a token that has gone idle past the configured
    /// timeout instead of trusting a stale presence.
    pub fn touch(&self, token: &str) -> bool {
        let Some(mut entry) = self.sessions.get_mut(token) else {
            return false;
        };
        let now = Utc::now();
        let idle = now.signed_duration_since(entry.last_active).to_std().unwrap_or_default();
        if idle > self.idle_timeout {
            drop(entry);
            self.sessions.remove(token);
            return false;
        }
        entry.last_active = now;
        true
    }

    pub fn logout(&self, token: &str) {
        self.sessions.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_then_matching_code_activates_and_mints_a_token() {
        let store = AuthSessionStore::new(3600);
        assert_eq!(store.state(), AuthState::Unconfigured);

        let (secret_b32, uri) = store.begin_setup("aegis", "local");
        assert!(uri.starts_with("otpauth://totp/"));

        let raw = {
            let mut bits = 0u32;
            let mut bit_count = 0u32;
            let mut out = Vec::new();
            for c in secret_b32.chars() {
                let val = BASE32_ALPHABET.iter().position(|&b| b as char == c).unwrap() as u32;
                bits = (bits << 5) | val;
                bit_count += 5;
                if bit_count >= 8 {
                    bit_count -= 8;
                    out.push(((bits >> bit_count) & 0xff) as u8);
                }
            }
            out
        };
        let code = format!("{:06}", hotp(&raw, (Utc::now().timestamp() / TOTP_STEP_SECS) as u64));

        let token = store.verify_and_activate(&code).expect("valid code should activate");
        assert_eq!(store.state(), AuthState::Configured);
        assert!(store.touch(&token));
    }

    #[test]
    fn wrong_code_does_not_activate() {
        let store = AuthSessionStore::new(3600);
        store.begin_setup("aegis", "local");
        assert!(store.verify_and_activate("000000").is_none());
    }

    #[test]
    fn logout_removes_the_token_immediately() {
        let store = AuthSessionStore::new(3600);
        store.begin_setup("aegis", "local");
        let raw = store.pending_secret.read().unwrap().clone().unwrap();
        let code = format!("{:06}", hotp(&raw, (Utc::now().timestamp() / TOTP_STEP_SECS) as u64));
        let token = store.verify_and_activate(&code).unwrap();
        store.logout(&token);
        assert!(!store.touch(&token));
    }

    #[test]
    fn idle_token_is_evicted() {
        let store = AuthSessionStore::new(0);
        store.begin_setup("aegis", "local");
        let raw = store.pending_secret.read().unwrap().clone().unwrap();
        let code = format!("{:06}", hotp(&raw, (Utc::now().timestamp() / TOTP_STEP_SECS) as u64));
        let token = store.verify_and_activate(&code).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!store.touch(&token));
    }
}
