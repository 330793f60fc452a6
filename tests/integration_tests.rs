//! CLI tests driving the compiled `mirrorsync` binary.

mod common;

use assert_cmd::Command;
use common::{SyncScenario, git_available, tips};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Binary isolated from the developer's own configuration and environment
fn mirrorsync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mirrorsync").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("MIRRORSYNC_SYNC__CONCURRENCY")
        .env_remove("MIRRORSYNC_SYNC__TARGET_ROOT");
    cmd
}

#[test]
fn test_help_without_subcommand() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_version_flag() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_subcommand() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("mirrorsync "));
}

#[test]
fn test_unknown_subcommand_fails() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn test_dry_run_prints_plan() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .args(["run", "--dry-run", "--source", "https://gitlab.example.com/dso/app1.git"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dso/app1"))
        .stdout(predicate::str::contains("mirror"));
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("mirrorsync.toml"), "[retry]\nmax_attempts = 0\n").unwrap();

    mirrorsync(temp.path())
        .args(["run", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_missing_custom_config_file() {
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .args(["--config", "nowhere.toml", "run", "--dry-run"])
        .assert()
        .code(2);
}

#[test]
fn test_duplicate_targets_rejected_before_any_work() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("mirrorsync.toml"),
        r#"
[[repos]]
name = "one"
source = "https://gitlab.example.com/dso/app1.git"
target = "shared.git"

[[repos]]
name = "two"
source = "https://gitlab.example.com/dso/app2.git"
target = "shared.git"
"#,
    )
    .unwrap();

    mirrorsync(temp.path())
        .args(["run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("shared.git"));
    assert!(!temp.path().join("mirrors").exists());
}

#[test]
fn test_missing_git_binary_is_environment_error() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("mirrorsync.toml"), "[git]\nbinary = \"/nonexistent/bin/git\"\n").unwrap();

    mirrorsync(temp.path())
        .args(["run", "--source", "https://gitlab.example.com/dso/app1.git"])
        .assert()
        .code(3);
}

#[test]
fn test_unset_token_env_is_config_error() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("mirrorsync.toml"),
        r#"
[[repos]]
source = "https://gitlab.example.com/dso/app1.git"
token_env = "MIRRORSYNC_TEST_TOKEN_THAT_IS_NOT_SET"
"#,
    )
    .unwrap();

    mirrorsync(temp.path())
        .env_remove("MIRRORSYNC_TEST_TOKEN_THAT_IS_NOT_SET")
        .args(["run", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("MIRRORSYNC_TEST_TOKEN_THAT_IS_NOT_SET"));
}

#[test]
fn test_run_creates_then_reports_up_to_date() {
    if !git_available() {
        return;
    }
    let scenario = SyncScenario::new();
    let workdir = scenario.path("work");
    fs::create_dir_all(&workdir).unwrap();

    mirrorsync(&workdir)
        .args(["run", "--source", &scenario.source_url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("created"))
        .stdout(predicate::str::contains("Sync succeeded"));

    let mirror = workdir.join("mirrors/source.git");
    assert_eq!(tips(&mirror), scenario.source_tips());

    mirrorsync(&workdir)
        .args(["run", "--source", &scenario.source_url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("up-to-date"));
}

#[test]
fn test_json_report() {
    if !git_available() {
        return;
    }
    let scenario = SyncScenario::new();
    let workdir = scenario.path("work");
    fs::create_dir_all(&workdir).unwrap();

    let output = mirrorsync(&workdir)
        .args(["run", "--json", "--source", &scenario.source_url()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "succeeded");
    assert_eq!(report["summary"]["created"], 1);
    assert_eq!(report["tasks"][0]["outcome"], "created");
    assert_eq!(report["tasks"][0]["name"], "source");
}

#[test]
fn test_mismatched_target_fails_run() {
    if !git_available() {
        return;
    }
    let scenario = SyncScenario::new();
    let other = scenario.other_repo("other");
    let workdir = scenario.path("work");
    fs::create_dir_all(&workdir).unwrap();

    mirrorsync(&workdir)
        .args(["run", "--source", &other.display().to_string(), "--target-root", "taken"])
        .assert()
        .success();
    // Occupy the path the source would land at
    fs::rename(workdir.join("taken/other.git"), workdir.join("taken/source.git")).unwrap();

    mirrorsync(&workdir)
        .args(["run", "--source", &scenario.source_url(), "--target-root", "taken"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("occupied by different source"));
}

#[test]
fn test_status_after_run() {
    if !git_available() {
        return;
    }
    let scenario = SyncScenario::new();
    let workdir = scenario.path("work");
    fs::create_dir_all(&workdir).unwrap();
    fs::write(
        workdir.join("mirrorsync.toml"),
        format!("[[repos]]\nname = \"source\"\nsource = \"{}\"\n", scenario.source_url()),
    )
    .unwrap();

    mirrorsync(&workdir)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"absent\""));

    mirrorsync(&workdir).arg("run").assert().success();

    mirrorsync(&workdir)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"mirrors\""));
}

#[test]
fn test_validate_lists_tasks() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    mirrorsync(temp.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories configured"));

    fs::write(
        temp.path().join("mirrorsync.toml"),
        "[[repos]]\nsource = \"https://gitlab.example.com/dso/app1.git\"\n",
    )
    .unwrap();
    mirrorsync(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("dso/app1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_lists_group_projects() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/dso/projects"))
        .and(query_param("include_subgroups", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"[
                {"path_with_namespace": "dso/platform/db", "http_url_to_repo": "https://gitlab.example.com/dso/platform/db.git"},
                {"path_with_namespace": "dso/web", "http_url_to_repo": "https://gitlab.example.com/dso/web.git"}
            ]"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("mirrorsync.toml"),
        format!(
            "[[groups]]\napi_url = \"{}\"\ngroup = \"dso\"\npush_base_url = \"https://mirror.example.com\"\nskip = [\"dso/web\"]\n",
            server.uri()
        ),
    )
    .unwrap();

    mirrorsync(temp.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dso/platform/db"))
        .stdout(predicate::str::contains("https://mirror.example.com/dso/platform/db.git"))
        .stdout(predicate::str::contains("dso/web.git").not());
}
