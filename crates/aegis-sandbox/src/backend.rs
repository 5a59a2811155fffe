//! Sandbox backend detection and per-backend command construction.
//!
//! Mirrors the layered fallback the original Python implementation used
//! (`detect_best_sandbox`): prefer an OS-level confinement mechanism and
//! fall back to a plain subprocess (with the safety pre-flight as the only
//! guard) when nothing stronger is installed.

use std::path::PathBuf;

/// Which isolation mechanism `Sandbox::execute` will use to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackend {
    /// Linux namespaces via `bwrap` (bubblewrap).
    Bubblewrap,
    /// macOS `sandbox-exec` with a generated `.sb` profile.
    AppleSandbox,
    /// Container runtime (`docker run --rm`).
    Container,
    /// Bare subprocess — no OS-level confinement beyond the pre-flight deny
    /// list and resource limits enforced at the process level.
    Subprocess,
}

impl SandboxBackend {
    /// Probe the host for the strongest backend available, in priority order:
    /// bubblewrap (Linux) > sandbox-exec (macOS) > docker > subprocess.
    pub fn detect_best() -> Self {
        if cfg!(target_os = "linux") && binary_exists("bwrap") {
            return SandboxBackend::Bubblewrap;
        }
        if cfg!(target_os = "macos") && binary_exists("sandbox-exec") {
            return SandboxBackend::AppleSandbox;
        }
        if binary_exists("docker") {
            return SandboxBackend::Container;
        }
        SandboxBackend::Subprocess
    }
}

fn binary_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Build the `bwrap` argv that wraps `cmd` for execution.
///
/// Mirrors `original_source/src/security/sandbox.py::_exec_bubblewrap`:
/// read-only root bind, fresh `/tmp` and `/dev`, namespace unshare, explicit
/// writable-dir binds, and a tmpfs shadow over any sensitive path that
/// exists under the caller's home directory.
pub fn bubblewrap_argv(
    cmd: &str,
    writable_dirs: &[String],
    allow_network: bool,
    cwd: Option<&str>,
) -> Vec<String> {
    let mut argv: Vec<String> = vec![
        "--ro-bind".into(),
        "/".into(),
        "/".into(),
        "--tmpfs".into(),
        "/tmp".into(),
        "--dev".into(),
        "/dev".into(),
        "--proc".into(),
        "/proc".into(),
        "--unshare-all".into(),
        "--die-with-parent".into(),
    ];

    for dir in writable_dirs {
        argv.push("--bind".into());
        argv.push(dir.clone());
        argv.push(dir.clone());
    }

    if let Some(home) = std::env::var("HOME").ok() {
        for sensitive in aegis_core::config::SENSITIVE_PATHS {
            let path = PathBuf::from(&home).join(sensitive);
            if path.exists() {
                argv.push("--tmpfs".into());
                argv.push(path.to_string_lossy().into_owned());
            }
        }
    }

    if !allow_network {
        argv.push("--unshare-net".into());
    }

    if let Some(dir) = cwd {
        argv.push("--chdir".into());
        argv.push(dir.to_string());
    }

    argv.push("--".into());
    argv.push("sh".into());
    argv.push("-c".into());
    argv.push(cmd.to_string());
    argv
}

/// Generate an Apple `sandbox-exec` profile body for the given config.
///
/// Mirrors `_generate_apple_profile`: deny-by-default, allow exec/fork/read,
/// explicit writable-dir allow rules, explicit sensitive-path deny rules,
/// and a network allow/deny toggle.
pub fn apple_sandbox_profile(writable_dirs: &[String], allow_network: bool) -> String {
    let mut profile = String::from(
        "(version 1)\n(deny default)\n(allow process-exec)\n(allow process-fork)\n(allow sysctl-read)\n(allow file-read*)\n",
    );
    for dir in writable_dirs {
        profile.push_str(&format!("(allow file-write* (subpath \"{dir}\"))\n"));
    }
    if let Some(home) = std::env::var("HOME").ok() {
        for sensitive in aegis_core::config::SENSITIVE_PATHS {
            let path = PathBuf::from(&home).join(sensitive);
            if path.exists() {
                profile.push_str(&format!(
                    "(deny file-read* (subpath \"{}\"))\n",
                    path.to_string_lossy()
                ));
            }
        }
    }
    if allow_network {
        profile.push_str("(allow network*)\n");
    } else {
        profile.push_str("(deny network*)\n");
    }
    profile
}

/// Build the `docker run` argv for container-backed execution.
///
/// Mirrors `_exec_docker`: ephemeral container, no privilege escalation,
/// read-only root with a small writable `/tmp`, and a memory ceiling.
pub fn docker_argv(cmd: &str, max_memory_mb: u64, allow_network: bool, cwd: Option<&str>) -> Vec<String> {
    let mut argv: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--network".into(),
        if allow_network { "bridge".into() } else { "none".into() },
        format!("--memory={max_memory_mb}m"),
        "--cpus=1".into(),
        "--read-only".into(),
        "--tmpfs".into(),
        "/tmp:rw,noexec,nosuid,size=100m".into(),
        "--security-opt".into(),
        "no-new-privileges".into(),
    ];

    if let Some(dir) = cwd {
        argv.push("-v".into());
        argv.push(format!("{dir}:{dir}:ro"));
        argv.push("-w".into());
        argv.push(dir.to_string());
    }

    argv.push("alpine:latest".into());
    argv.push("sh".into());
    argv.push("-c".into());
    argv.push(cmd.to_string());
    argv
}
