//! Shared project fixture for integration tests.
//!
//! Builds a throwaway SLEEC project with a fake checker and a fake LM
//! command so the binary can be driven end to end without FDR or network.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const RULESET: &str = "def_start\n  event BatteryLow\n  event ReturnHome\ndef_end\n\nrule_start\n  R1 when BatteryLow then ReturnHome\nrule_end\n";

const FAKE_CHECKER: &str = r#"#!/bin/sh
if [ -n "$FAKE_CHECKER_FAIL" ]; then
  echo "cannot load $2" >&2
  exit 3
fi
echo "checked $1 $(basename "$2")"
echo "SLEECRule2Rule4 Result: Failed"
"#;

const FAKE_LM: &str = r#"#!/bin/sh
cat > "$1"
echo "  report from $SLEEC_MODEL  "
"#;

pub struct Project {
    pub dir: TempDir,
}

impl Project {
    /// Ruleset, generated assertions and two system models.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        fs::write(root.join("robot.sleec"), RULESET).expect("write ruleset");
        fs::write(root.join("zeta.sleec"), "rule_start\nrule_end\n").expect("write ruleset");
        fs::write(root.join("arm.rct"), "module Arm\n").expect("write model");
        fs::write(root.join("system.rct"), "module System\n").expect("write model");
        fs::create_dir_all(root.join("src-gen")).expect("create src-gen");
        fs::write(
            root.join("src-gen/robot-assertions.csp"),
            "assert SLEECRule2Rule4\n",
        )
        .expect("write assertions");
        fs::create_dir_all(root.join("tools")).expect("create tools");
        write_script(&root.join("tools/refines"), FAKE_CHECKER);
        write_script(&root.join("tools/lm"), FAKE_LM);
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Where the fake LM command stores the prompt it received.
    pub fn captured_prompt(&self) -> PathBuf {
        self.root().join("captured-prompt.txt")
    }

    /// A command with the project root, the fake tools and an isolated
    /// config directory.
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_sleec-report"));
        command
            .arg("--root")
            .arg(self.root())
            .env("SLEEC_CHECKER", self.root().join("tools/refines"))
            .env(
                "SLEEC_LM_COMMAND",
                format!(
                    "{} {}",
                    self.root().join("tools/lm").display(),
                    self.captured_prompt().display()
                ),
            )
            .env("HOME", self.root())
            .env("XDG_CONFIG_HOME", self.root().join(".config"))
            .env_remove("RUST_LOG")
            .env_remove("FAKE_CHECKER_FAIL");
        command
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run sleec-report")
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut permissions = fs::metadata(path).expect("stat script").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).expect("chmod script");
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
