use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Nothing listens on the discard port, so every remote call fails fast.
pub const UNREACHABLE_GATEWAY: &str = "http://127.0.0.1:9";

/// Runs the `weekly` binary inside a temporary directory with its own
/// database, pointed at an unreachable gateway.
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("weekly-test.db");

        Self { temp_dir, db_path }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("weekly").expect("Failed to find weekly binary");
        cmd.current_dir(self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env("WEEKLY_DATABASE_PATH", &self.db_path)
            .env("WEEKLY_GATEWAY_URL", UNREACHABLE_GATEWAY)
            .env("WEEKLY_REQUEST_TIMEOUT_SECS", "1");
        cmd
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }
}

pub mod assertions {
    use predicates::prelude::*;

    pub fn offline_warning() -> impl Predicate<str> {
        predicate::str::contains("Could not reach the remote store")
    }

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }

    pub fn success_mark() -> impl Predicate<str> {
        predicate::str::contains("✓")
    }
}
