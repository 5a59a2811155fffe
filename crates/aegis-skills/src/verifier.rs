//! Component C9's signature gate: third-party skills must hash-match a
//! trusted set (or a validated signature, once the signing utility
//! exists) before the registry will load them. Built-in skills are
//! trusted by construction.
//!
//! Grounded on `original_source/src/security/skill_verifier.py`.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Result, SkillError};

const CHUNK_SIZE: usize = 8192;

pub struct SkillVerifier {
    require_signatures: bool,
    trusted_hashes: HashSet<String>,
}

impl SkillVerifier {
    pub fn new(require_signatures: bool) -> Self {
        Self {
            require_signatures,
            trusted_hashes: HashSet::new(),
        }
    }

    pub fn trust_hash(&mut self, hash: impl Into<String>) {
        self.trusted_hashes.insert(hash.into());
    }

    /// Hash a skill file and check it against the trusted set (or an
    /// explicit expected hash, when the caller already knows one).
    pub fn verify_skill_file(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        if !path.exists() {
            return Err(SkillError::FileNotFound(path.display().to_string()));
        }

        let actual = compute_hash(path)?;

        if let Some(expected) = expected_hash {
            if actual != expected {
                warn!(
                    path = %path.display(),
                    expected = &expected[..expected.len().min(16)],
                    actual = &actual[..actual.len().min(16)],
                    "skill_hash_mismatch"
                );
                return Ok(false);
            }
            return Ok(true);
        }

        if self.trusted_hashes.contains(&actual) {
            return Ok(true);
        }

        if self.require_signatures {
            warn!(path = %path.display(), hash = &actual[..actual.len().min(16)], "skill_unverified");
            return Ok(false);
        }

        Ok(true)
    }

    pub fn compute_skill_hash(&self, path: &Path) -> Result<String> {
        compute_hash(path)
    }

    /// Reject any archive member path that could escape the extraction
    /// directory — absolute paths or any `..` component are fatal.
    pub fn check_archive_member(&self, member: &str) -> Result<()> {
        if member.starts_with('/') || member.starts_with('\\') {
            return Err(SkillError::PathTraversal(member.to_string()));
        }
        if member.split(['/', '\\']).any(|part| part == "..") {
            return Err(SkillError::PathTraversal(member.to_string()));
        }
        Ok(())
    }
}

fn compute_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(content: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("aegis-skill-test-{}.txt", unique()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    fn unique() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        format!(
            "{}-{:?}",
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos(),
            std::thread::current().id()
        )
    }

    #[test]
    fn trusted_hash_passes_verification() {
        let path = scratch_file(b"skill code");
        let verifier = {
            let mut v = SkillVerifier::new(true);
            let hash = v.compute_skill_hash(&path).unwrap();
            v.trust_hash(hash);
            v
        };
        assert!(verifier.verify_skill_file(&path, None).unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unsigned_skill_is_refused_when_signatures_required() {
        let path = scratch_file(b"unknown skill");
        let verifier = SkillVerifier::new(true);
        assert!(!verifier.verify_skill_file(&path, None).unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unsigned_skill_allowed_when_signatures_not_required() {
        let path = scratch_file(b"unknown skill");
        let verifier = SkillVerifier::new(false);
        assert!(verifier.verify_skill_file(&path, None).unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn mismatched_expected_hash_fails() {
        let path = scratch_file(b"skill code");
        let verifier = SkillVerifier::new(true);
        assert!(!verifier.verify_skill_file(&path, Some("deadbeef")).unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn path_traversal_member_is_rejected() {
        let verifier = SkillVerifier::new(true);
        assert!(verifier.check_archive_member("../../etc/passwd").is_err());
        assert!(verifier.check_archive_member("/etc/passwd").is_err());
        assert!(verifier.check_archive_member("skills/good.py").is_ok());
    }
}
