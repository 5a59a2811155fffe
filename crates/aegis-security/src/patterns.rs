//! Shared regex tables for secret detection, used by the input validator,
//! the egress filter, and (via re-export) the audit log's redaction pass.
//!
//! Grounded verbatim on `original_source/src/constants.py::SENSITIVE_PATTERNS`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Patterns matching API keys, tokens, and other credential shapes that
/// must never appear in logs or outgoing network traffic.
pub static SENSITIVE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("openai_key", Regex::new(r"sk-[a-zA-Z0-9\-]{20,}").unwrap()),
        ("anthropic_key", Regex::new(r"sk-ant-[a-zA-Z0-9\-]{20,}").unwrap()),
        ("google_api_key", Regex::new(r"AIza[a-zA-Z0-9\-_]{35}").unwrap()),
        ("github_token", Regex::new(r"ghp_[a-zA-Z0-9]{36}").unwrap()),
        ("gitlab_token", Regex::new(r"glpat-[a-zA-Z0-9\-]{20}").unwrap()),
        ("slack_token", Regex::new(r"xox[bpas]-[a-zA-Z0-9\-]+").unwrap()),
        ("private_key", Regex::new(r"-----BEGIN.*PRIVATE KEY-----").unwrap()),
        ("credit_card", Regex::new(r"[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{4}").unwrap()),
        ("email", Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()),
        ("aws_access_key_id", Regex::new(r"AKIA[0-9A-Z]{16}").unwrap()),
        ("aws_secret_env", Regex::new(r"AWS_SECRET_ACCESS_KEY\s*=\s*\S+").unwrap()),
        ("aws_access_key_env", Regex::new(r"AWS_ACCESS_KEY_ID\s*=\s*\S+").unwrap()),
        ("azure_key_env", Regex::new(r"AZURE_[A-Z_]*KEY\s*=\s*\S+").unwrap()),
        ("gcp_credential", Regex::new(r"gcp_[a-zA-Z0-9\-_]{20,}").unwrap()),
    ]
});

/// Scan `text` against every sensitive pattern, returning the names of the
/// ones that matched. Pure function shared by validator/egress/audit so
/// all three agree on what counts as a secret.
pub fn scan_for_secrets(text: &str) -> Vec<&'static str> {
    SENSITIVE_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .collect()
}

/// Replace every substring matching a sensitive pattern with the literal
/// `[REDACTED]`, leaving the surrounding text untouched — used where the
/// caller needs the rest of a field to survive (e.g. audit log entries),
/// as opposed to `scan_for_secrets`, which only reports what matched.
pub fn redact_secrets(text: &str) -> String {
    let mut out = text.to_string();
    for (_, re) in SENSITIVE_PATTERNS.iter() {
        out = re.replace_all(&out, "[REDACTED]").into_owned();
    }
    out
}
