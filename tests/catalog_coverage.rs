//! Catalog-wide invariants: every built-in spec honors the level/role
//! contract, patterns are anchored, and no plugin grants AUTO to a shape
//! the dangerous-pattern layer would refuse.

use std::sync::Arc;

use fleetgate::authorize::{AuthLevel, SshRole};
use fleetgate::catalog::Catalog;
use fleetgate::classify::{Classifier, RiskLevel};

#[test]
fn all_specs_honor_level_role_invariant() {
    let catalog = Catalog::builtin().unwrap();
    for plugin in catalog.plugins() {
        for (key, spec) in &plugin.commands {
            let context = format!("{}/{}", plugin.name, key);
            match spec.level {
                AuthLevel::Auto => {
                    if spec.risk == RiskLevel::Low {
                        assert_eq!(spec.role, SshRole::Reader, "{context}");
                    }
                }
                AuthLevel::Manual => assert_eq!(spec.role, SshRole::Executor, "{context}"),
                AuthLevel::Blocked => assert_eq!(spec.role, SshRole::None, "{context}"),
            }
        }
    }
}

#[test]
fn all_patterns_are_anchored() {
    let catalog = Catalog::builtin().unwrap();
    for plugin in catalog.plugins() {
        for (key, spec) in &plugin.commands {
            let pattern = spec.pattern.as_str();
            assert!(
                pattern.starts_with('^'),
                "pattern for {}/{} is not start-anchored: {pattern}",
                plugin.name,
                key
            );
            assert!(
                pattern.ends_with('$'),
                "pattern for {}/{} is not end-anchored: {pattern}",
                plugin.name,
                key
            );
        }
    }
}

#[test]
fn auto_specs_are_low_risk_only() {
    let catalog = Catalog::builtin().unwrap();
    for plugin in catalog.plugins() {
        for (key, spec) in &plugin.commands {
            if spec.level == AuthLevel::Auto {
                assert_eq!(
                    spec.risk,
                    RiskLevel::Low,
                    "{}/{} grants AUTO above LOW risk",
                    plugin.name,
                    key
                );
            }
        }
    }
}

/// The catalog is consulted before the dangerous-pattern denylist, so no
/// plugin may grant AUTO to a command shape the denylist would refuse.
/// Exercise every known-dangerous shape against the catalog directly.
#[test]
fn no_auto_spec_matches_a_dangerous_shape() {
    let catalog = Catalog::builtin().unwrap();
    let dangerous = [
        "rm -rf /",
        "rm -rf /etc",
        "rm -rf /var",
        "dd if=/dev/zero of=/dev/sda",
        "dd if=/dev/urandom of=/dev/vdb bs=1M",
        "mkfs.ext4 /dev/sda1",
        "fdisk /dev/sda",
        "parted /dev/sda rm 1",
        "wipefs -a /dev/sda",
        ":(){:|:&};:",
        "echo garbage > /dev/sda",
        "cat /dev/zero > /dev/sdb",
        "chown -R nobody:nobody /",
        "chmod -R 777 /etc",
    ];

    for command in dangerous {
        if let Some((plugin, spec)) = catalog.find(command) {
            assert_ne!(
                spec.level,
                AuthLevel::Auto,
                "plugin '{}' grants AUTO to dangerous command '{command}'",
                plugin.name
            );
        }
    }
}

/// Same property end-to-end: anything the classifier grades CRITICAL must
/// never come back with an AUTO suggestion.
#[test]
fn classifier_never_suggests_auto_for_critical() {
    let classifier = Classifier::new(Arc::new(Catalog::builtin().unwrap()));
    let samples = [
        "rm -rf /",
        "dd if=/dev/zero of=/dev/sda",
        "mkfs.xfs /dev/sdb1",
        "wipefs -a /dev/nvme0n1",
        ":(){:|:&};:",
        "chmod -R 777 /",
    ];
    for command in samples {
        let analysis = classifier.classify(command);
        assert_eq!(analysis.risk, RiskLevel::Critical, "{command}");
        assert_ne!(analysis.suggested_level, Some(AuthLevel::Auto), "{command}");
    }
}

#[test]
fn representative_commands_resolve_to_expected_plugins() {
    let catalog = Catalog::builtin().unwrap();
    let cases = [
        ("htop", "monitoring", AuthLevel::Auto),
        ("vmstat 1 10", "monitoring", AuthLevel::Auto),
        ("ping -c 4 8.8.8.8", "network", AuthLevel::Auto),
        ("tcpdump -i eth0", "network", AuthLevel::Manual),
        ("wget https://example.com/file", "network", AuthLevel::Manual),
        ("ls -la /etc", "filesystem", AuthLevel::Auto),
        ("sha256sum /etc/passwd", "filesystem", AuthLevel::Auto),
        ("systemctl status unbound", "systemd", AuthLevel::Auto),
        ("systemctl restart unbound", "systemd", AuthLevel::Manual),
        ("journalctl -u unbound -n 50", "systemd", AuthLevel::Auto),
        ("podman ps -a", "containers", AuthLevel::Auto),
        ("docker rm old-container", "containers", AuthLevel::Manual),
        ("uname -a", "posix-system", AuthLevel::Auto),
        ("whoami", "posix-system", AuthLevel::Auto),
        ("ps aux", "posix-process", AuthLevel::Auto),
        ("kill -9 1234", "posix-process", AuthLevel::Manual),
        ("awk '{print $1}'", "posix-text", AuthLevel::Auto),
        ("xargs rm", "posix-text", AuthLevel::Manual),
        ("tee /etc/config", "posix-text", AuthLevel::Manual),
    ];

    for (command, expected_plugin, expected_level) in cases {
        let (plugin, spec) = catalog
            .find(command)
            .unwrap_or_else(|| panic!("no catalog match for '{command}'"));
        assert_eq!(plugin.name, expected_plugin, "{command}");
        assert_eq!(spec.level, expected_level, "{command}");
    }
}

#[test]
fn manual_specs_carry_executor_identity() {
    let catalog = Catalog::builtin().unwrap();
    let manual: Vec<_> = catalog
        .plugins()
        .iter()
        .flat_map(|p| p.commands.iter())
        .filter(|(_, spec)| spec.level == AuthLevel::Manual)
        .collect();
    assert!(!manual.is_empty());
    assert!(manual.iter().all(|(_, spec)| spec.role == SshRole::Executor));
}
