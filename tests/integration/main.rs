//! Integration tests for mono
//!
//! Each test runs the binary against its own temporary MONO_HOME so tests
//! never share cache or registry state.

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn mono(home: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("mono").unwrap();
        cmd.env("MONO_HOME", home.path());
        cmd.env_remove("MONO_ROOT_PATH");
        cmd
    }

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build-artifact cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mono"));
    }

    #[test]
    fn list_empty() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No environments registered"));
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn cache_stats_empty() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .args(["cache", "stats"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn cache_clear_empty() {
        let home = TempDir::new().unwrap();
        mono(&home)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries to clear"));
    }

    #[test]
    fn detect_reports_lockfiles() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(&project.path().join("Cargo.lock"), "[[package]]");
        write(&project.path().join("web/package-lock.json"), "{}");

        mono(&home)
            .args(["detect", project.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("cargo"))
            .stdout(predicate::str::contains("npm-web"));
    }

    #[test]
    fn detect_empty_project() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        mono(&home)
            .args(["detect", project.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("No lockfiles detected"));
    }

    #[test]
    fn sync_unregistered_fails() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        mono(&home)
            .args(["sync", project.path().to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Environment not found"));
    }

    #[test]
    fn destroy_unregistered_fails() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        mono(&home)
            .args(["destroy", project.path().to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Environment not found"));
    }

    #[test]
    fn init_registers_environment() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        mono(&home)
            .args(["init", project.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Environment initialized"));

        mono(&home)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 environment(s)"));
    }

    #[test]
    fn init_twice_fails() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        mono(&home)
            .args(["init", project.path().to_str().unwrap()])
            .assert()
            .success();

        mono(&home)
            .args(["init", project.path().to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Environment already exists"));
    }

    #[test]
    fn init_stores_built_artifacts() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(&project.path().join("Cargo.lock"), "[[package]]\nname = \"x\"");
        write(&project.path().join("target/debug/app"), "binary");

        mono(&home)
            .args([
                "init",
                project.path().to_str().unwrap(),
                "--root",
                project.path().to_str().unwrap(),
            ])
            .assert()
            .success();

        mono(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cargo"))
            .stdout(predicate::str::contains("1 entries"));

        mono(&home)
            .args(["cache", "stats"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cargo"));
    }

    #[test]
    fn init_runs_init_script_with_cache_hints() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("mono.toml"),
            r#"
                [scripts]
                init = "printf %s \"$MONO_CACHE_HIT\" > cache-hit.txt"
            "#,
        );
        write(&project.path().join("Cargo.lock"), "[[package]]");

        mono(&home)
            .args([
                "init",
                project.path().to_str().unwrap(),
                "--root",
                project.path().to_str().unwrap(),
            ])
            .assert()
            .success();

        let hit = fs::read_to_string(project.path().join("cache-hit.txt")).unwrap();
        assert_eq!(hit, "false");
    }

    #[test]
    fn failing_init_script_unregisters() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("mono.toml"),
            r#"
                [scripts]
                init = "exit 1"
            "#,
        );

        mono(&home)
            .args(["init", project.path().to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Script failed"));

        mono(&home)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No environments registered"));
    }

    #[test]
    fn sync_then_destroy_roundtrip() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(&project.path().join("Cargo.lock"), "[[package]]");
        write(&project.path().join("target/debug/app"), "binary");

        mono(&home)
            .args([
                "init",
                project.path().to_str().unwrap(),
                "--root",
                project.path().to_str().unwrap(),
            ])
            .assert()
            .success();

        mono(&home)
            .args(["sync", project.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Sync complete"));

        mono(&home)
            .args(["destroy", project.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Environment destroyed"));

        mono(&home)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No environments registered"));
    }

    #[test]
    fn cache_remove_deletes_entry() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(&project.path().join("Cargo.lock"), "[[package]]");
        write(&project.path().join("target/debug/app"), "binary");

        mono(&home)
            .args([
                "init",
                project.path().to_str().unwrap(),
                "--root",
                project.path().to_str().unwrap(),
            ])
            .assert()
            .success();

        let plain = mono(&home)
            .args(["cache", "list", "--format", "plain"])
            .output()
            .unwrap();
        let listing = String::from_utf8(plain.stdout).unwrap();
        let parts: Vec<&str> = listing.trim().split('/').collect();
        assert_eq!(parts.len(), 3, "expected project/artifact/key, got {listing:?}");

        mono(&home)
            .args(["cache", "remove", parts[0], parts[1], parts[2]])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed"));

        mono(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn cache_clear_removes_everything() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(&project.path().join("Cargo.lock"), "[[package]]");
        write(&project.path().join("target/debug/app"), "binary");

        mono(&home)
            .args([
                "init",
                project.path().to_str().unwrap(),
                "--root",
                project.path().to_str().unwrap(),
            ])
            .assert()
            .success();

        mono(&home)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 entries"));

        mono(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn second_working_copy_hits_cache() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let a = work.path().join("a");
        write(&a.join("Cargo.lock"), "[[package]]");
        write(&a.join("target/debug/app"), "binary");

        let b = work.path().join("b");
        write(&b.join("Cargo.lock"), "[[package]]");

        let root = a.to_str().unwrap().to_string();

        mono(&home)
            .args(["init", a.to_str().unwrap(), "--root", &root])
            .assert()
            .success()
            .stdout(predicate::str::contains("0/1 artifact(s) warm").not());

        mono(&home)
            .args(["init", b.to_str().unwrap(), "--root", &root])
            .assert()
            .success()
            .stdout(predicate::str::contains("1/1 artifact(s) warm"));

        // The second working copy's tree was restored from the cache
        assert!(b.join("target/debug/app").exists());
        assert_eq!(
            fs::read_to_string(b.join("target/debug/app")).unwrap(),
            "binary"
        );
    }
}
