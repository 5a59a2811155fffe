//! aegis-skills — component C9: the skill registry and the verifier that
//! gates third-party skills behind a trusted-hash check before the
//! registry will load them.

pub mod error;
pub mod registry;
pub mod skill;
pub mod verifier;

pub use error::{Result, SkillError};
pub use registry::SkillRegistry;
pub use skill::{Skill, SkillMetadata, SkillResult};
pub use verifier::SkillVerifier;
