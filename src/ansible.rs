//! Ansible wrappers.
//!
//! Convenience layer that assembles `ansible-playbook` command lines and
//! routes them through the executor facade, so the authorization policy
//! stays in charge: `--check` runs match an AUTO rule and execute on the
//! reader channel, while apply runs fall to the MANUAL rule and require
//! approval.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::executor::{CommandExecutor, ExecuteResponse};

/// Default remote directory holding playbooks.
pub const DEFAULT_PLAYBOOKS_DIR: &str = "/opt/infra/playbooks";
/// Default remote inventory location.
pub const DEFAULT_INVENTORY_PATH: &str = "/opt/infra/inventory";

/// Build the `ansible-playbook` command line.
fn playbook_command(
    playbook_path: &str,
    inventory: &str,
    check_mode: bool,
    extra_vars: Option<&BTreeMap<String, String>>,
) -> String {
    let mut parts = vec![
        "ansible-playbook".to_string(),
        playbook_path.to_string(),
        format!("--inventory={inventory}"),
    ];
    if check_mode {
        parts.push("--check".to_string());
    }
    if let Some(vars) = extra_vars {
        if !vars.is_empty() {
            let rendered: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
            parts.push(format!("--extra-vars \"{}\"", rendered.join(" ")));
        }
    }
    parts.join(" ")
}

/// Run a playbook on `host`. Check mode is the default for safety; apply
/// mode goes through the manual-approval workflow unless forced.
///
/// # Errors
/// Transport and auth failures propagate from the executor facade.
pub async fn run_playbook(
    executor: &CommandExecutor,
    host: &str,
    playbook_path: &str,
    inventory: &str,
    check_mode: bool,
    extra_vars: Option<&BTreeMap<String, String>>,
    force_approval: bool,
) -> Result<ExecuteResponse> {
    let command = playbook_command(playbook_path, inventory, check_mode, extra_vars);
    executor.execute(host, &command, force_approval).await
}

/// Run a playbook in check mode (dry-run). Always auto-approved.
///
/// # Errors
/// Transport and auth failures propagate from the executor facade.
pub async fn check_playbook(
    executor: &CommandExecutor,
    host: &str,
    playbook_path: &str,
    inventory: &str,
    extra_vars: Option<&BTreeMap<String, String>>,
) -> Result<ExecuteResponse> {
    run_playbook(
        executor,
        host,
        playbook_path,
        inventory,
        true,
        extra_vars,
        false,
    )
    .await
}

/// List playbook files on the remote host.
///
/// # Errors
/// Transport and auth failures propagate from the executor facade.
pub async fn list_playbooks(
    executor: &CommandExecutor,
    host: &str,
    playbooks_dir: &str,
) -> Result<ExecuteResponse> {
    let command = format!("ls -lh {playbooks_dir}");
    executor.execute(host, &command, false).await
}

/// Show the remote inventory.
///
/// # Errors
/// Transport and auth failures propagate from the executor facade.
pub async fn show_inventory(
    executor: &CommandExecutor,
    host: &str,
    inventory_path: &str,
) -> Result<ExecuteResponse> {
    let command = format!("cat {inventory_path}/hosts");
    executor.execute(host, &command, false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_mode_command_line() {
        let command = playbook_command("/opt/infra/playbooks/deploy.yml", "localhost,", true, None);
        assert_eq!(
            command,
            "ansible-playbook /opt/infra/playbooks/deploy.yml --inventory=localhost, --check"
        );
    }

    #[test]
    fn test_apply_mode_has_no_check_flag() {
        let command =
            playbook_command("/opt/infra/playbooks/deploy.yml", "localhost,", false, None);
        assert!(!command.contains("--check"));
    }

    #[test]
    fn test_extra_vars_rendering() {
        let mut vars = BTreeMap::new();
        vars.insert("version".to_string(), "v6".to_string());
        vars.insert("enable_ipv6".to_string(), "true".to_string());
        let command = playbook_command(
            "/opt/infra/playbooks/deploy.yml",
            "localhost,",
            true,
            Some(&vars),
        );
        // BTreeMap iteration gives a stable key order.
        assert!(command.contains("--extra-vars \"enable_ipv6=true version=v6\""));
    }
}
