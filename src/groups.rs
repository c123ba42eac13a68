//! OS group membership checks for an app's Unix user.
use crate::app::TestApp;
use crate::error::{HarnessError, HarnessResult};
use crate::shell::ShellExecutor;

/// Every group in `groups` must list `uid` as a member in `etc_group`
/// (the text of an `/etc/group` file). Returns the first group that doesn't.
pub fn assigned_groups(
    app: &TestApp,
    etc_group: &str,
    uid: &str,
    groups: &[String],
) -> HarnessResult<()> {
    for group in groups {
        if !group_lists_member(etc_group, group, uid) {
            return Err(HarnessError::GroupMissing {
                app: app.name.clone(),
                uid: uid.to_string(),
                group: group.clone(),
            });
        }
    }
    Ok(())
}

/// `name:password:gid:member,member`
fn group_lists_member(etc_group: &str, group: &str, uid: &str) -> bool {
    etc_group.lines().any(|line| {
        let mut fields = line.trim().split(':');
        if fields.next() != Some(group) {
            return false;
        }
        fields
            .nth(2)
            .is_some_and(|members| members.split(',').any(|member| member.trim() == uid))
    })
}

/// Log into the app's gear and require `group` among its `groups` output.
pub fn has_secondary_group(
    shell: &dyn ShellExecutor,
    app: &TestApp,
    group: &str,
) -> HarnessResult<()> {
    let uid = app
        .uid
        .clone()
        .ok_or_else(|| HarnessError::precondition("check-groups", &app.name, "uid is unknown"))?;
    let args = ssh_groups_args(&uid, &app.hostname());
    let output = shell
        .run("ssh", &args)
        .map_err(|err| HarnessError::collaborator("check-groups", &app.name, err))?;
    if output.code != 0 {
        tracing::warn!(app = %app.name, code = output.code, "groups query failed");
        return Err(HarnessError::RemoteFailure {
            op: "check-groups",
            app: app.name.clone(),
            code: output.code,
        });
    }
    if output.stdout.split_whitespace().any(|listed| listed == group) {
        tracing::info!(app = %app.name, %uid, group, "secondary group present");
        return Ok(());
    }
    Err(HarnessError::GroupMissing {
        app: app.name.clone(),
        uid,
        group: group.to_string(),
    })
}

fn ssh_groups_args(uid: &str, hostname: &str) -> Vec<String> {
    [
        "-o",
        "BatchMode=yes",
        "-o",
        "StrictHostKeyChecking=no",
        "-tt",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .chain([format!("{uid}@{hostname}"), "groups".to_string()])
    .collect()
}
