//! End-to-end lifecycle steps driven through the binary against a fake client.

mod common;

use common::{stderr, Sandbox};
use std::fs;
use std::process::Command;

#[test]
fn init_refuses_to_overwrite_without_force() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    sandbox.ok(&["init"]);
    assert!(sandbox.state_dir().join("config.json").is_file());

    let again = sandbox.run(&["init"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"));

    sandbox.ok(&["init", "--force"]);
}

#[test]
fn create_stop_and_destroy_round_trip() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "php-5.3"]);
    assert!(name.starts_with("php53"));

    let app = sandbox.show(&name);
    assert_eq!(app["state"], "live");
    assert_eq!(app["uid"], "5a1b2c");
    assert_eq!(app["create_domain_code"], 0);
    assert_eq!(app["create_app_code"], 0);

    assert_eq!(
        sandbox.ok(&["ctl", "stop", "--app", &name]),
        format!("{name} stopped")
    );
    sandbox.ok(&["ctl", "destroy", "--app", &name]);
    assert_eq!(sandbox.show(&name)["state"], "destroyed");

    let rejected = sandbox.run(&["ctl", "start", "--app", &name]);
    assert!(!rejected.status.success());
    assert!(stderr(&rejected).contains("destroyed"));

    let calls = sandbox.rhc_calls();
    assert!(calls[0].starts_with("domain create"));
    assert_eq!(
        calls.iter().filter(|call| call.starts_with("app delete")).count(),
        1
    );
    assert!(!calls.iter().any(|call| call.starts_with("app start")));
}

#[test]
fn failed_create_reports_exit_code_and_records_it() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let output = sandbox.run_with(
        &["create", "--type", "php-5.3"],
        &[("FAKE_RHC_FAIL", "app create")],
    );
    assert!(!output.status.success());
    let message = stderr(&output);
    assert!(message.contains("create-app"), "{message}");
    assert!(message.contains("exit code 1"), "{message}");

    let listing = sandbox.ok(&["show"]);
    let name = listing
        .split('\t')
        .next()
        .expect("one recorded app")
        .to_string();
    let app = sandbox.show(&name);
    assert_eq!(app["create_app_code"], 1);
    assert_eq!(app["state"], "app-pending");
}

#[test]
fn expected_failure_passes_only_when_creation_is_rejected() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let rejected = sandbox.run_with(
        &["create", "--type", "php-5.3", "--expect-failure"],
        &[("FAKE_RHC_FAIL", "app create")],
    );
    assert!(rejected.status.success(), "{}", stderr(&rejected));

    let accepted = sandbox.run(&["create", "--type", "php-5.3", "--expect-failure"]);
    assert!(!accepted.status.success());
    assert!(stderr(&accepted).contains("expected creating"));
}

#[test]
fn embedded_cartridge_params_are_recorded() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "php-5.3"]);
    sandbox.ok(&["embed", "--app", &name, "--cartridge", "mysql-5.1"]);
    let app = sandbox.show(&name);
    assert_eq!(app["embedded"][0], "mysql-5.1");
    assert_eq!(app["cartridge_params"]["mysql-5.1"]["HOSTNAME"], "127.0.0.9");

    let adopted = sandbox.ok(&["adopt", "--type", "php-5.3", "--embed", "mysql-5.1"]);
    assert_eq!(adopted, name);
    let missing = sandbox.run(&["adopt", "--type", "php-5.3"]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("no existing php-5.3 application"));
}

#[test]
fn alias_and_namespace_updates_use_configured_domains() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "ruby-1.9"]);
    sandbox.ok(&["alias", "--app", &name]);
    assert_eq!(sandbox.show(&name)["state"], "aliased");
    sandbox.ok(&["unalias", "--app", &name]);
    sandbox.ok(&["update-namespace", "--app", &name, "--namespace", "fresh1"]);
    assert_eq!(sandbox.show(&name)["namespace"], "fresh1");

    let calls = sandbox.rhc_calls();
    assert!(calls
        .iter()
        .any(|call| call.starts_with("alias add") && call.contains(".example.com")));
    assert!(calls.iter().any(|call| call.starts_with("domain update")));
}

#[test]
fn snapshot_is_validated_and_restored() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "php-5.3"]);
    let stdout = sandbox.ok(&["snapshot", "--app", &name, "--preserve"]);
    let mut paths = stdout.lines();
    let snapshot = paths.next().expect("snapshot path");
    let preserved = paths.next().expect("preserved path");
    assert!(fs::metadata(snapshot).unwrap().len() > 0);
    assert_ne!(snapshot, preserved);
    assert_eq!(sandbox.show(&name)["state"], "snapshotted");

    sandbox.ok(&["check-snapshot", "--app", &name]);
    sandbox.ok(&["restore", "--app", &name, "--from", preserved]);
    assert_eq!(sandbox.show(&name)["state"], "live");
    assert!(sandbox
        .rhc_calls()
        .iter()
        .any(|call| call.starts_with("snapshot restore") && call.contains(preserved)));
}

#[test]
fn snapshot_with_forbidden_member_fails_before_restore() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "php-5.3"]);
    sandbox.ok(&["snapshot", "--app", &name]);

    let work = sandbox.root().join("bad");
    fs::create_dir_all(work.join("gear/app-root/runtime")).unwrap();
    fs::create_dir_all(work.join("gear/conf")).unwrap();
    fs::write(work.join("gear/conf/openshift.conf"), "Listen 8080\n").unwrap();
    let archive = sandbox.root().join("bad.tar.gz");
    let status = Command::new("tar")
        .arg("-czf")
        .arg(&archive)
        .arg("-C")
        .arg(&work)
        .arg("gear")
        .status()
        .unwrap();
    assert!(status.success());
    let archive = archive.display().to_string();

    let checked = sandbox.run(&["check-snapshot", "--app", &name, "--archive", &archive]);
    assert!(!checked.status.success());
    assert!(stderr(&checked).contains("openshift.conf"));

    let restored = sandbox.run(&["restore", "--app", &name, "--from", &archive]);
    assert!(!restored.status.success());
    assert!(!sandbox
        .rhc_calls()
        .iter()
        .any(|call| call.starts_with("snapshot restore")));
}

#[test]
fn group_check_reads_etc_group_file() {
    let Some(sandbox) = Sandbox::new() else {
        return;
    };
    let name = sandbox.ok(&["create", "--type", "php-5.3"]);
    let etc_group = sandbox.root().join("group");
    fs::write(&etc_group, "libra:x:500:5a1b2c\nwheel:x:10:root\n").unwrap();
    let etc_group = etc_group.display().to_string();

    sandbox.ok(&[
        "check-groups", "--app", &name, "--group", "libra", "--etc-group", &etc_group,
    ]);
    let missing = sandbox.run(&[
        "check-groups", "--app", &name, "--group", "wheel", "--etc-group", &etc_group,
    ]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("'wheel'"));
}
