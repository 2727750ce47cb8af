//! Deadline-bound invocation of the `git` CLI as an argv list, never a shell string.

use crate::error::RuleError;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Run `git <args>` in `cwd`, honoring `deadline`. Output is captured as raw
/// bytes; truncation (by the caller) happens on bytes before any parsing.
pub async fn run_git(
    cwd: &Path,
    args: &[&str],
    deadline: Duration,
) -> Result<Vec<u8>, RuleError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    cmd.current_dir(cwd);
    cmd.kill_on_drop(true);
    cmd.stdin(std::process::Stdio::piped());

    let output = tokio::time::timeout(deadline, cmd.output())
        .await
        .map_err(|_| RuleError::Timeout)?
        .map_err(RuleError::Io)?;

    if !output.status.success() {
        return Err(RuleError::Subprocess(format!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(output.stdout)
}

/// Truncate raw bytes to at most `max_size_kb` kilobytes.
pub fn truncate_kb(bytes: Vec<u8>, max_size_kb: usize) -> Vec<u8> {
    let max_bytes = max_size_kb.saturating_mul(1024);
    if bytes.len() <= max_bytes {
        bytes
    } else {
        let mut bytes = bytes;
        bytes.truncate(max_bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn runs_git_and_captures_stdout() {
        let dir = TempDir::new().unwrap();
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let out = run_git(dir.path(), &["rev-parse", "--is-inside-work-tree"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim(), "true");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let err = run_git(dir.path(), &["rev-parse", "nonexistent-rev"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Subprocess(_)));
    }

    #[tokio::test]
    async fn deadline_elapsed_is_timeout() {
        let dir = TempDir::new().unwrap();
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        // `git hash-object --stdin` blocks waiting for stdin input that never
        // arrives under timeout, giving us a deterministic hang.
        let err = run_git(
            dir.path(),
            &["hash-object", "--stdin"],
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn truncate_kb_caps_byte_length() {
        let data = vec![b'x'; 5000];
        let truncated = truncate_kb(data, 1);
        assert_eq!(truncated.len(), 1024);
    }

    #[test]
    fn truncate_kb_is_noop_under_limit() {
        let data = vec![b'x'; 100];
        let truncated = truncate_kb(data.clone(), 50);
        assert_eq!(truncated, data);
    }
}
