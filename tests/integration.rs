//! Integration tests for jailctl.
//!
//! Everything here runs against a temporary fail2ban tree, so no root and
//! no fail2ban install are needed. Commands that talk to fail2ban itself
//! (ban, reload, jails) are covered by the connector unit tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

use jailctl::config::{Server, Settings};
use jailctl::config_engine::{DefaultSettings, StructureOutcome};
use jailctl::connector::{Connector, LocalConnector};
use jailctl::jail_config::marker_version;
use jailctl::lock::JailLocks;
use jailctl::migration::{migrate_legacy_jails, LegacyMigration};

/// A temp dir holding a fail2ban tree and a jailctl config pointing at it.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("fail2ban/filter.d")).unwrap();
        let sandbox = Self { dir };
        let settings = sandbox.settings();
        settings.save(sandbox.config_path()).unwrap();
        sandbox
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("fail2ban")
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.yaml")
    }

    fn settings(&self) -> Settings {
        Settings {
            fail2ban_dir: self.root().display().to_string(),
            lock_file: self.dir.path().join("jailctl.lock").display().to_string(),
            ..Default::default()
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root().join(rel)).unwrap()
    }

    fn connector(&self) -> LocalConnector {
        LocalConnector::new(Server::local(), &self.settings(), Arc::new(JailLocks::new()))
    }

    fn run(&self, args: &[&str]) -> Output {
        run_jailctl(&self.config_path(), args, None)
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Output {
        run_jailctl(&self.config_path(), args, Some(stdin))
    }
}

/// Run the jailctl binary with `--config` and return its output
fn run_jailctl(config: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    use std::io::Write;
    use std::process::Stdio;

    let mut child = Command::new(env!("CARGO_BIN_EXE_jailctl"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("JAILCTL_CONFIG")
        .env_remove("JAILCTL_MIGRATE_LEGACY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute jailctl");
    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_version_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("jailctl"));
}

#[test]
fn test_help_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("jail"));
    assert!(text.contains("filter"));
    assert!(text.contains("action-files"));
}

#[test]
fn test_servers_lists_local() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["servers", "--json"]);
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(rows[0]["id"], "local");
    assert_eq!(rows[0]["type"], "local");
    assert_eq!(rows[0]["isDefault"], true);
}

#[test]
fn test_cli_jail_create_show() {
    let sandbox = Sandbox::new();

    let output = sandbox.run(&["jail", "create", "sshd"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let content = sandbox.read("jail.d/sshd.local");
    assert_eq!(marker_version(&content), Some(1));
    assert!(content.contains("[sshd]\nenabled = false\n"));

    let output = sandbox.run(&["jail", "show", "sshd"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), content);

    // A second create is refused
    assert!(!sandbox.run(&["jail", "create", "sshd"]).status.success());
}

#[test]
fn test_cli_jail_show_unknown_is_skeleton() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["jail", "show", "recidive"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "[recidive]\n");
}

#[test]
fn test_cli_rejects_invalid_names() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["jail", "show", "../../etc/passwd"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid jail name"));
}

#[test]
fn test_cli_jail_set_from_stdin_without_reload() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_with_stdin(
        &["jail", "set", "nginx", "--no-reload"],
        "[other]\nport = http\n[nginx]\nlogpath = /var/log/nginx/error.log\n",
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        sandbox.read("jail.d/nginx.local"),
        "port = http\n[nginx]\nlogpath = /var/log/nginx/error.log\n"
    );
}

#[test]
fn test_cli_filter_lifecycle() {
    let sandbox = Sandbox::new();
    sandbox.write("filter.d/sshd.conf", "[Definition]\nfailregex = ^Failed\n");

    let output = sandbox.run_with_stdin(
        &["filter", "create", "myapp"],
        "[Definition]\nfailregex = ^auth failure from <HOST>$\n",
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = sandbox.run(&["filter", "list", "--json"]);
    let names: Vec<String> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(names, vec!["myapp", "sshd"]);

    // Stock filters are never deleted
    assert!(!sandbox.run(&["filter", "delete", "sshd"]).status.success());
    assert!(sandbox.root().join("filter.d/sshd.conf").exists());
}

#[test]
fn test_cli_integrity_ensure() {
    let sandbox = Sandbox::new();
    sandbox.write("jail.local", "[DEFAULT]\nbantime = 1h\n\n[sshd]\nenabled = true\n");

    let output = sandbox.run(&["integrity", "--ensure"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("Adopted"));
    assert!(text.contains("sshd"));

    let content = sandbox.read("jail.local");
    assert_eq!(marker_version(&content), Some(1));
    assert!(content.contains("bantime = 1h"));
}

#[test]
fn test_cli_defaults_validation() {
    let sandbox = Sandbox::new();
    assert!(!sandbox.run(&["defaults"]).status.success());
    assert!(!sandbox.run(&["defaults", "--bantime", "forever"]).status.success());

    let output = sandbox.run(&["defaults", "--maxretry", "3", "--ignoreip", "10.0.0.0/8"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let content = sandbox.read("jail.local");
    assert!(content.contains("maxretry = 3"));
    assert!(content.contains("ignoreip = 10.0.0.0/8"));
}

#[test]
fn test_cli_migrate() {
    let sandbox = Sandbox::new();
    sandbox.write(
        "jail.local",
        "[DEFAULT]\nbantime = 1h\n\n[sshd]\nenabled = true\nport = ssh\n\n[nginx-http-auth]\nenabled = true\n",
    );

    let output = sandbox.run(&["migrate"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Migrated sshd"));

    let sshd = sandbox.read("jail.d/sshd.local");
    assert!(sshd.contains("enabled = false"));
    assert!(sshd.contains("port = ssh"));
    assert!(sandbox.root().join("jail.d/nginx-http-auth.local").exists());

    // Running again finds nothing left
    let output = sandbox.run(&["migrate"]);
    assert!(stdout(&output).contains("Nothing to migrate"));
}

#[test]
fn test_cli_action_files_without_url() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["action-files"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("callback"));
}

#[tokio::test]
async fn test_enable_then_discover() {
    let sandbox = Sandbox::new();
    sandbox.write("jail.d/sshd.conf", "[sshd]\nenabled = false\nport = ssh\n");
    let conn = sandbox.connector();

    let mut states = std::collections::BTreeMap::new();
    states.insert("sshd".to_string(), true);
    states.insert("recidive".to_string(), false);
    conn.update_jail_enabled_states(&states).await.unwrap();

    // The .conf is copied into .local and left untouched
    assert_eq!(sandbox.read("jail.d/sshd.conf"), "[sshd]\nenabled = false\nport = ssh\n");
    let local = sandbox.read("jail.d/sshd.local");
    assert!(local.contains("enabled = true"));
    assert!(local.contains("port = ssh"));

    let jails = conn.get_all_jails().await.unwrap();
    let summary: Vec<_> = jails.iter().map(|j| (j.jail_name.as_str(), j.enabled)).collect();
    assert_eq!(summary, vec![("recidive", false), ("sshd", true)]);
}

#[tokio::test]
async fn test_logpath_resolution_with_includes() {
    let sandbox = Sandbox::new();
    let logs = sandbox.dir.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("auth.log"), "").unwrap();

    sandbox.write(
        "jail.conf",
        "[INCLUDES]\nbefore = paths-common.conf\n\n[DEFAULT]\nbanaction = iptables\n",
    );
    sandbox.write(
        "paths-common.conf",
        &format!("[DEFAULT]\nlogdir = {}\nsshd_log = %(logdir)s/auth.log\n", logs.display()),
    );

    let conn = sandbox.connector();
    let tests = conn
        .test_logpath_with_resolution("%(sshd_log)s")
        .await
        .unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].resolved, format!("{}/auth.log", logs.display()));
    assert_eq!(tests[0].files, vec![format!("{}/auth.log", logs.display())]);
}

#[tokio::test]
async fn test_structure_then_defaults() {
    let sandbox = Sandbox::new();
    let conn = sandbox.connector();

    assert_eq!(
        conn.ensure_jail_local_structure().await.unwrap(),
        StructureOutcome::Created
    );
    assert_eq!(
        conn.ensure_jail_local_structure().await.unwrap(),
        StructureOutcome::AlreadyManaged
    );

    let defaults = DefaultSettings {
        bantime: Some("10m".to_string()),
        backend: Some("systemd".to_string()),
        ..Default::default()
    };
    conn.update_default_settings(&defaults).await.unwrap();
    let integrity = conn.check_jail_local_integrity().await.unwrap();
    assert!(integrity.managed);
    assert!(integrity.has_default_section);
    assert!(integrity.legacy_jail_sections.is_empty());
    assert!(sandbox.read("jail.local").contains("bantime = 10m"));
}

#[tokio::test]
async fn test_legacy_migration_runs_once() {
    let sandbox = Sandbox::new();
    sandbox.write("jail.local", "[DEFAULT]\nbantime = 1h\n\n[sshd]\nenabled = true\n");
    sandbox.write("jail.d/sshd.local", "[sshd]\nenabled = true\nmaxretry = 2\n");
    let conn = sandbox.connector();

    let migration = LegacyMigration::new();
    let report = migration.run_once(conn.engine()).await.unwrap().clone();
    assert_eq!(report.skipped_existing, vec!["sshd"]);
    assert!(report.migrated.is_empty());

    // The existing per-jail file wins and the legacy section is commented out
    assert_eq!(sandbox.read("jail.d/sshd.local"), "[sshd]\nenabled = true\nmaxretry = 2\n");
    let jail_local = sandbox.read("jail.local");
    assert!(jail_local.contains("bantime = 1h"));
    assert!(!jail_local.lines().any(|l| l.trim() == "[sshd]"));

    let backup = report.backup.clone().unwrap();
    assert_eq!(
        std::fs::read_to_string(&backup).unwrap(),
        "[DEFAULT]\nbantime = 1h\n\n[sshd]\nenabled = true\n"
    );

    // The cell holds the first report
    let again = migration.run_once(conn.engine()).await.unwrap();
    assert_eq!(again, &report);
    assert!(migrate_legacy_jails(conn.engine()).await.unwrap().is_noop());
}
