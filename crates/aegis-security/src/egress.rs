//! Component C8: egress filter / DLP.
//!
//! Every outgoing network request and every blob of data the agent wants
//! to send out is inspected here first — for secrets, for blocked paste
//! sites, and for leaked canary tokens.
//!
//! Grounded on `original_source/src/security/egress_filter.py`.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::patterns::scan_for_secrets;

#[derive(Debug, Clone)]
pub struct EgressDecision {
    pub allowed: bool,
    pub reason: String,
    pub blocked_patterns: Vec<String>,
}

impl EgressDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            blocked_patterns: Vec::new(),
        }
    }

    fn deny(reason: impl Into<String>, blocked_patterns: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            blocked_patterns,
        }
    }
}

/// Inspects and filters all outgoing data to prevent exfiltration and
/// credential leaks before they leave the process.
pub struct EgressFilter {
    blocked_domains: HashSet<String>,
    allowed_domains: HashSet<String>,
    canary_tokens: HashSet<String>,
}

impl Default for EgressFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EgressFilter {
    pub fn new() -> Self {
        let blocked_domains = [
            "pastebin.com",
            "hastebin.com",
            "paste.ee",
            "ghostbin.co",
            "0x0.st",
            "file.io",
            "transfer.sh",
            "temp.sh",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            blocked_domains,
            allowed_domains: HashSet::new(),
            canary_tokens: HashSet::new(),
        }
    }

    pub fn check_request(
        &self,
        url: &str,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> EgressDecision {
        let lower_url = url.to_lowercase();
        for domain in &self.blocked_domains {
            if lower_url.contains(domain.as_str()) {
                return EgressDecision::deny(
                    format!("Blocked domain: {domain}"),
                    vec![domain.clone()],
                );
            }
        }

        let mut blocked_patterns = Vec::new();
        if !body.is_empty() {
            blocked_patterns.extend(scan_for_secrets(body).into_iter().map(|p| format!("pattern:{p}")));
        }

        for (key, value) in headers {
            if key.eq_ignore_ascii_case("authorization") || key.eq_ignore_ascii_case("cookie") {
                continue;
            }
            blocked_patterns.extend(scan_for_secrets(value).into_iter().map(|p| format!("pattern:{p}")));
        }

        for canary in &self.canary_tokens {
            if body.contains(canary.as_str()) || url.contains(canary.as_str()) {
                blocked_patterns.push(format!("canary_leak:{}", &canary[..canary.len().min(8)]));
            }
        }

        if !blocked_patterns.is_empty() {
            warn!(url = %truncate(url, 100), patterns = ?blocked_patterns, "egress_blocked");
            return EgressDecision::deny(
                format!(
                    "Sensitive data detected in outgoing request: {}",
                    blocked_patterns.join(", ")
                ),
                blocked_patterns,
            );
        }

        EgressDecision::allow("Request approved.")
    }

    pub fn check_data(&self, data: &str) -> EgressDecision {
        let blocked: Vec<String> = scan_for_secrets(data).into_iter().map(|p| format!("pattern:{p}")).collect();
        if !blocked.is_empty() {
            warn!(patterns = ?blocked, "dlp_blocked");
            return EgressDecision::deny(
                format!("Sensitive data detected: {}", blocked.join(", ")),
                blocked,
            );
        }
        EgressDecision::allow("Data approved.")
    }

    pub fn register_canary(&mut self, token: impl Into<String>) {
        self.canary_tokens.insert(token.into());
    }

    pub fn add_blocked_domain(&mut self, domain: impl Into<String>) {
        self.blocked_domains.insert(domain.into().to_lowercase());
    }

    pub fn add_allowed_domain(&mut self, domain: impl Into<String>) {
        self.allowed_domains.insert(domain.into().to_lowercase());
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() > max {
        &s[..max]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pastebin_url_is_blocked() {
        let filter = EgressFilter::new();
        let result = filter.check_request("https://pastebin.com/raw/abc123", "", &HashMap::new());
        assert!(!result.allowed);
    }

    #[test]
    fn openai_key_in_body_is_blocked() {
        let filter = EgressFilter::new();
        let body = "key=sk-abcdefghijklmnopqrstuvwxyz123456";
        let result = filter.check_request("https://example.com/ingest", body, &HashMap::new());
        assert!(!result.allowed);
    }

    #[test]
    fn clean_request_is_allowed() {
        let filter = EgressFilter::new();
        let result = filter.check_request("https://example.com/api", "hello world", &HashMap::new());
        assert!(result.allowed);
    }

    #[test]
    fn authorization_header_is_exempt_from_scanning() {
        let filter = EgressFilter::new();
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer sk-abcdefghijklmnopqrstuvwxyz123456".to_string());
        let result = filter.check_request("https://example.com/api", "", &headers);
        assert!(result.allowed);
    }

    #[test]
    fn registered_canary_leak_is_blocked() {
        let mut filter = EgressFilter::new();
        filter.register_canary("secret-canary-token");
        let result = filter.check_request("https://example.com", "leaked: secret-canary-token", &HashMap::new());
        assert!(!result.allowed);
    }

    #[test]
    fn credit_card_in_data_is_blocked_by_dlp() {
        let filter = EgressFilter::new();
        let result = filter.check_data("card number 4111 1111 1111 1111");
        assert!(!result.allowed);
    }
}
