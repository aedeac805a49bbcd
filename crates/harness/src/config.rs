//! Environment-derived settings for the harness.

use std::process::Command;

use anyhow::{Context, Result};

/// Registry prefix for the `telepresence-k8s` image used by the
/// existing-deployment operation. Overridable for testing against a
/// locally built image.
#[must_use]
pub fn registry() -> String {
    std::env::var("TELEPRESENCE_REGISTRY").unwrap_or_else(|_| "datawire".to_string())
}

/// The kubectl binary all cluster access goes through.
#[must_use]
pub fn kubectl() -> String {
    std::env::var("TELEPRESENCE_KUBECTL").unwrap_or_else(|_| "kubectl".to_string())
}

/// The Python interpreter used to execute the probe script inside the
/// inject-tcp and vpn-tcp execution contexts.
#[must_use]
pub fn python() -> String {
    std::env::var("TELEPRESENCE_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

/// Locate the telepresence CLI under test.
///
/// `TELEPRESENCE_BINARY` takes precedence so a run can target a build that
/// is not first on `$PATH`.
///
/// # Errors
///
/// Returns an error if no binary can be found.
pub fn telepresence_binary() -> Result<std::path::PathBuf> {
    if let Ok(path) = std::env::var("TELEPRESENCE_BINARY") {
        return Ok(std::path::PathBuf::from(path));
    }
    which::which("telepresence").context("telepresence not found on $PATH")
}

/// Ask the telepresence CLI under test for its version.
///
/// The existing-deployment operation pins its image to this version so the
/// cluster side matches the client under test. Resolves the binary through
/// [`telepresence_binary`] so a `TELEPRESENCE_BINARY` override pins against
/// the same build that gets invoked.
///
/// # Errors
///
/// Returns an error if the CLI cannot be found or exits non-zero.
pub fn telepresence_version() -> Result<String> {
    let binary = telepresence_binary()?;
    let output = Command::new(&binary)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {} --version", binary.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} --version failed: {}",
            binary.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
