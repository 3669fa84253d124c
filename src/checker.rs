//! Invocation of the external refinement checker.
//!
//! The checker is always run as `<binary> --quiet <assertions>`. Two strategies
//! exist because the Windows build of the checker must be launched from its
//! own installation directory with a forced locale, while on POSIX hosts it
//! is resolved from `PATH`. The strategy is picked once by [`for_host`].
//!
//! Invocation never returns an error: every failure is folded into a
//! [`CheckerResult`] whose text is embedded in the compiled prompt.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Flag that suppresses the checker's progress chatter.
pub const QUIET_FLAG: &str = "--quiet";

/// Normalized outcome of one checker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerResult {
    pub success: bool,
    pub text: String,
}

impl CheckerResult {
    fn passed(stdout: &[u8]) -> Self {
        Self {
            success: true,
            text: String::from_utf8_lossy(stdout).trim().to_string(),
        }
    }

    fn failed(text: String) -> Self {
        Self {
            success: false,
            text,
        }
    }
}

/// Runs the checker against one assertions file.
pub trait CheckerInvoker: Send + Sync {
    fn invoke(&self, assertions: &Path) -> CheckerResult;

    /// Human-readable description of what will be executed.
    fn describe(&self) -> String;
}

/// Choose the invocation strategy for the current platform.
pub fn for_host(binary: &str, windows_path: &Path, locale: &str) -> Arc<dyn CheckerInvoker> {
    if cfg!(windows) {
        Arc::new(WindowsChecker::new(windows_path.to_path_buf(), locale))
    } else {
        Arc::new(PosixChecker::new(binary))
    }
}

/// Checker resolved by logical name from `PATH`.
#[derive(Debug, Clone)]
pub struct PosixChecker {
    binary: String,
}

impl PosixChecker {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn spawn_error(&self, cause: impl std::fmt::Display) -> CheckerResult {
        CheckerResult::failed(format!("Error running {}: {cause}", self.binary_label()))
    }

    fn binary_label(&self) -> String {
        binary_label(Path::new(&self.binary))
    }
}

impl CheckerInvoker for PosixChecker {
    fn invoke(&self, assertions: &Path) -> CheckerResult {
        let resolved = match which::which(&self.binary) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(binary = %self.binary, error = %err, "checker not found");
                return self.spawn_error(err);
            }
        };
        tracing::debug!(
            binary = %resolved.display(),
            assertions = %assertions.display(),
            "invoke checker"
        );
        match Command::new(&resolved)
            .arg(QUIET_FLAG)
            .arg(assertions)
            .output()
        {
            Ok(output) => map_output(&output),
            Err(err) => self.spawn_error(err),
        }
    }

    fn describe(&self) -> String {
        match which::which(&self.binary) {
            Ok(path) => format!("{} {QUIET_FLAG} <assertions>", path.display()),
            Err(_) => format!("{} {QUIET_FLAG} <assertions> (not found on PATH)", self.binary),
        }
    }
}

/// Checker installed at a fixed path that must run from its own directory.
#[derive(Debug, Clone)]
pub struct WindowsChecker {
    exe_path: PathBuf,
    locale: String,
}

impl WindowsChecker {
    pub fn new(exe_path: PathBuf, locale: impl Into<String>) -> Self {
        Self {
            exe_path,
            locale: locale.into(),
        }
    }

    fn spawn_error(&self, cause: impl std::fmt::Display) -> CheckerResult {
        CheckerResult::failed(format!(
            "Error running {}: {cause}",
            binary_label(&self.exe_path)
        ))
    }
}

impl CheckerInvoker for WindowsChecker {
    fn invoke(&self, assertions: &Path) -> CheckerResult {
        // Resolve before leaving the caller's working directory.
        let assertions = match absolutize(assertions) {
            Ok(path) => path,
            Err(err) => return self.spawn_error(err),
        };
        let Some(install_dir) = self.exe_path.parent() else {
            return self.spawn_error(format!(
                "no installation directory for {}",
                self.exe_path.display()
            ));
        };
        let _cwd = match WorkingDirGuard::enter(install_dir) {
            Ok(guard) => guard,
            Err(err) => return self.spawn_error(err),
        };
        tracing::debug!(
            binary = %self.exe_path.display(),
            assertions = %assertions.display(),
            locale = %self.locale,
            "invoke checker from installation directory"
        );
        match Command::new(&self.exe_path)
            .arg(QUIET_FLAG)
            .arg(&assertions)
            .env("LC_ALL", &self.locale)
            .output()
        {
            Ok(output) => map_output(&output),
            Err(err) => self.spawn_error(err),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} {QUIET_FLAG} <assertions> (cwd: install dir, LC_ALL={})",
            self.exe_path.display(),
            self.locale
        )
    }
}

fn map_output(output: &Output) -> CheckerResult {
    tracing::info!(
        exit_code = ?output.status.code(),
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "checker finished"
    );
    if output.status.success() {
        CheckerResult::passed(&output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        CheckerResult::failed(format!("Error: {}", stderr.trim()))
    }
}

fn binary_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

// The working directory is process-wide; only one guard may hold it.
static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Switches the process working directory and restores it on drop.
struct WorkingDirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDirGuard {
    fn enter(dir: &Path) -> std::io::Result<Self> {
        let lock = CWD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let original = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self {
            original,
            _lock: lock,
        })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(err) = env::set_current_dir(&self.original) {
            tracing::error!(
                original = %self.original.display(),
                error = %err,
                "failed to restore working directory"
            );
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn posix_success_is_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "refines", "printf 'Result: Passed\\n'");
        let result = PosixChecker::new(script.display().to_string()).invoke(Path::new("a.csp"));
        assert_eq!(
            result,
            CheckerResult {
                success: true,
                text: "Result: Passed".to_string()
            }
        );
    }

    #[test]
    fn posix_passes_quiet_flag_and_assertions_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "refines", "echo \"$1|$2\"");
        let result =
            PosixChecker::new(script.display().to_string()).invoke(Path::new("/w/x-assertions.csp"));
        assert_eq!(result.text, "--quiet|/w/x-assertions.csp");
    }

    #[test]
    fn posix_nonzero_exit_embeds_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "refines", "echo 'bad file' >&2; exit 1");
        let result = PosixChecker::new(script.display().to_string()).invoke(Path::new("a.csp"));
        assert_eq!(
            result,
            CheckerResult {
                success: false,
                text: "Error: bad file".to_string()
            }
        );
    }

    #[test]
    fn posix_missing_binary_is_failure_text() {
        let result = PosixChecker::new("/nonexistent/dir/refines").invoke(Path::new("a.csp"));
        assert!(!result.success);
        assert!(
            result.text.starts_with("Error running refines: "),
            "{}",
            result.text
        );
    }

    // Single test: it is the only one in this binary that changes the
    // process working directory.
    #[test]
    fn windows_strategy_restores_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("FDR").join("bin");
        fs::create_dir_all(&install).unwrap();
        let install = install.canonicalize().unwrap();

        let ok = write_script(&install, "ok.exe", "echo \"$LC_ALL $(pwd) $1\"");
        let bad = write_script(&install, "bad.exe", "echo 'bad file' >&2; exit 1");
        let missing = install.join("missing.exe");

        let before = env::current_dir().unwrap();

        let result = WindowsChecker::new(ok, "C").invoke(Path::new("/w/a-assertions.csp"));
        assert!(result.success);
        assert_eq!(
            result.text,
            format!("C {} --quiet", install.display())
        );
        assert_eq!(env::current_dir().unwrap(), before);

        let result = WindowsChecker::new(bad, "C").invoke(Path::new("/w/a-assertions.csp"));
        assert_eq!(result.text, "Error: bad file");
        assert_eq!(env::current_dir().unwrap(), before);

        let result = WindowsChecker::new(missing, "C").invoke(Path::new("/w/a-assertions.csp"));
        assert!(!result.success);
        assert!(result.text.starts_with("Error running missing: "), "{}", result.text);
        assert_eq!(env::current_dir().unwrap(), before);
    }
}
