//! Configuration validation.
//!
//! Two jobs: assign fields one by one with an ignore-and-continue policy,
//! and run the semantic verification pass once a device is fully parsed.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{Condition, NetDevConfig, VerifyContext};
use crate::error::{LoadError, VerifyError};
use crate::field::{
    parse_ifname, parse_size_u32, Assignment, ConfigEntry, Diagnostic, FieldError, FieldSpec,
};
use crate::registry::KindRegistry;

/// Fields every kind accepts.
const GENERIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("NetDev", "Name", parse_name),
    FieldSpec::new("NetDev", "Kind", parse_kind),
    FieldSpec::new("NetDev", "Description", parse_description),
    FieldSpec::new("NetDev", "MTUBytes", parse_mtu),
    FieldSpec::new("NetDev", "MACAddress", parse_mac),
    FieldSpec::new("Match", "Host", parse_host),
    FieldSpec::new("Match", "Architecture", parse_architecture),
];

fn parse_name(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    config.name = parse_ifname(value)?;
    Ok(())
}

/// The kind is fixed when the device is created; a later `Kind=` must agree.
fn parse_kind(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    if value.trim() == config.kind_name() {
        Ok(())
    } else {
        Err(FieldError::Invalid {
            expected: "kind matching the device",
        })
    }
}

fn parse_description(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    config.description = Some(value.trim().to_string());
    Ok(())
}

fn parse_mtu(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    config.mtu = Some(parse_size_u32(value)?);
    Ok(())
}

fn parse_mac(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let mac = value.trim().parse().map_err(|_| FieldError::Invalid {
        expected: "MAC address",
    })?;
    config.mac = Some(mac);
    Ok(())
}

fn condition_value(value: &str) -> Result<(String, bool), FieldError> {
    let value = value.trim();
    let (value, negate) = match value.strip_prefix('!') {
        Some(rest) => (rest.trim(), true),
        None => (value, false),
    };

    if value.is_empty() {
        return Err(FieldError::Invalid {
            expected: "condition",
        });
    }
    Ok((value.to_string(), negate))
}

fn parse_host(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let (value, negate) = condition_value(value)?;
    config.conditions.push(Condition::Host { value, negate });
    Ok(())
}

fn parse_architecture(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let (value, negate) = condition_value(value)?;
    config.conditions.push(Condition::Architecture { value, negate });
    Ok(())
}

/// A parsed device plus every assignment that was ignored on the way.
#[derive(Debug)]
pub struct Loaded {
    pub config: NetDevConfig,
    pub diagnostics: Vec<Diagnostic>,
}

/// Applies configuration tuples to device configurations.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r KindRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r KindRegistry) -> Self {
        Self { registry }
    }

    /// Build a device from one file's entries.
    ///
    /// `Name=` and `Kind=` are located first so the kind's defaults can be
    /// applied before any other field. Ignored assignments are logged and
    /// returned; only a missing name, missing kind, or unknown kind stops
    /// the device from being created.
    pub fn load(&self, file: &Path, entries: &[ConfigEntry]) -> Result<Loaded, LoadError> {
        let mut diagnostics = Vec::new();
        let mut name = None;
        let mut kind_name = None;

        for entry in entries.iter().filter(|e| e.section == "NetDev") {
            match entry.key.as_str() {
                "Name" => match parse_ifname(&entry.value) {
                    Ok(n) => name = Some(n),
                    Err(e) => diagnostics.push(Diagnostic::new(entry, e)),
                },
                "Kind" => kind_name = Some(entry.value.trim().to_string()),
                _ => {}
            }
        }

        let kind_name = kind_name.ok_or_else(|| LoadError::MissingKind {
            file: file.to_path_buf(),
        })?;
        let kind = self
            .registry
            .lookup(&kind_name)
            .map_err(|_| LoadError::UnknownKind {
                file: file.to_path_buf(),
                kind: kind_name,
            })?;
        let name = name.ok_or_else(|| LoadError::MissingName {
            file: file.to_path_buf(),
        })?;

        let mut config = NetDevConfig::new(kind, name, file);

        for entry in entries {
            if entry.section == "NetDev" && matches!(entry.key.as_str(), "Name" | "Kind") {
                continue;
            }
            if let Assignment::Rejected(diagnostic) = self.assign(&mut config, entry) {
                diagnostics.push(diagnostic);
            }
        }

        for diagnostic in &diagnostics {
            warn!(
                file = %diagnostic.file.display(),
                line = diagnostic.line,
                section = %diagnostic.section,
                key = %diagnostic.key,
                value = %diagnostic.value,
                error = %diagnostic.error,
                "Ignoring assignment"
            );
        }

        config.mark_parsed();

        debug!(
            device = %config.name,
            kind = config.kind_name(),
            ignored = diagnostics.len(),
            "Parsed device configuration"
        );

        Ok(Loaded {
            config,
            diagnostics,
        })
    }

    /// Assign one field. A rejected assignment leaves the field unchanged.
    pub fn assign(&self, config: &mut NetDevConfig, entry: &ConfigEntry) -> Assignment {
        let kind = Arc::clone(config.kind());

        if !kind.sections().contains(&entry.section.as_str()) {
            return Assignment::Rejected(Diagnostic::new(entry, FieldError::UnknownSection));
        }

        let field = GENERIC_FIELDS
            .iter()
            .chain(kind.schema())
            .find(|f| f.matches(&entry.section, &entry.key));
        let Some(field) = field else {
            return Assignment::Rejected(Diagnostic::new(entry, FieldError::UnknownKey));
        };

        match (field.parse)(config, &entry.value) {
            Ok(()) => Assignment::Accepted,
            Err(e) => Assignment::Rejected(Diagnostic::new(entry, e)),
        }
    }

    /// Run `[Match]` conditions and the kind's verification.
    ///
    /// On failure the device is marked `Failed` and the cause is logged.
    pub fn verify(
        &self,
        config: &mut NetDevConfig,
        ctx: &VerifyContext,
    ) -> Result<(), VerifyError> {
        let result = match config.conditions.iter().find(|c| !c.holds(ctx)) {
            Some(condition) => Err(VerifyError::ConditionNotMet {
                condition: condition.to_string(),
                file: config.source.clone(),
            }),
            None => config.kind().verify(config, ctx),
        };

        if let Err(e) = &result {
            warn!(
                device = %config.name,
                kind = config.kind_name(),
                error = %e,
                "Device failed verification, ignoring"
            );
            config.fail();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{AddressFamily, DeviceStatus};

    const FILE: &str = "/etc/netdevd/vx0.netdev";

    fn entry(section: &str, key: &str, value: &str, line: usize) -> ConfigEntry {
        ConfigEntry::new(section, key, value, FILE, line)
    }

    fn vxlan_entries() -> Vec<ConfigEntry> {
        vec![
            entry("NetDev", "Name", "vx0", 2),
            entry("NetDev", "Kind", "vxlan", 3),
            entry("NetDev", "MTUBytes", "1450", 4),
            entry("VXLAN", "Id", "42", 7),
            entry("VXLAN", "Group", "239.1.1.1", 8),
            entry("VXLAN", "TTL", "16", 9),
            entry("VXLAN", "FDBAgeingSec", "2.5s", 10),
            entry("VXLAN", "ARPProxy", "yes", 11),
        ]
    }

    fn ctx() -> VerifyContext {
        VerifyContext::new("node-1", "x86-64")
    }

    #[test]
    fn test_load_vxlan() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let loaded = validator.load(Path::new(FILE), &vxlan_entries()).unwrap();
        assert!(loaded.diagnostics.is_empty());

        let config = loaded.config;
        assert_eq!(config.name, "vx0");
        assert_eq!(config.status(), DeviceStatus::Parsed);
        assert_eq!(config.mtu, Some(1450));
        assert_eq!(config.address_family, Some(AddressFamily::Inet));

        let vxlan = config.kind_config.as_vxlan().unwrap();
        assert_eq!(vxlan.id, Some(42));
        assert_eq!(vxlan.ttl, 16);
        assert_eq!(vxlan.fdb_ageing, Duration::from_micros(2_500_000));
        assert!(vxlan.arp_proxy);
        assert!(vxlan.learning);
    }

    #[test]
    fn test_bad_value_keeps_previous_and_continues() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let mut entries = vxlan_entries();
        entries.push(entry("VXLAN", "TTL", "300", 12));
        entries.push(entry("VXLAN", "L2MissNotification", "on", 13));

        let loaded = validator.load(Path::new(FILE), &entries).unwrap();
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].line, 12);

        let vxlan = loaded.config.kind_config.as_vxlan().unwrap();
        assert_eq!(vxlan.ttl, 16);
        assert!(vxlan.l2miss);
    }

    #[test]
    fn test_mismatched_family_rejected() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let mut entries = vxlan_entries();
        entries.push(entry("VXLAN", "Group", "ff05::1", 12));

        let loaded = validator.load(Path::new(FILE), &entries).unwrap();
        assert!(matches!(
            loaded.diagnostics[0].error,
            FieldError::FamilyMismatch { .. }
        ));
        assert_eq!(loaded.config.address_family, Some(AddressFamily::Inet));
        assert_eq!(
            loaded.config.kind_config.as_vxlan().unwrap().group,
            Some("239.1.1.1".parse().unwrap())
        );
    }

    #[test]
    fn test_unknown_section_and_key() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let entries = vec![
            entry("NetDev", "Name", "dummy0", 1),
            entry("NetDev", "Kind", "dummy", 2),
            entry("VXLAN", "Id", "1", 3),
            entry("NetDev", "Colour", "blue", 4),
        ];

        let loaded = validator.load(Path::new(FILE), &entries).unwrap();
        let errors: Vec<_> = loaded.diagnostics.iter().map(|d| d.error.clone()).collect();
        assert_eq!(errors, vec![FieldError::UnknownSection, FieldError::UnknownKey]);
    }

    #[test]
    fn test_missing_kind_and_unknown_kind() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let no_kind = vec![entry("NetDev", "Name", "x0", 1)];
        assert!(matches!(
            validator.load(Path::new(FILE), &no_kind),
            Err(LoadError::MissingKind { .. })
        ));

        let bad_kind = vec![
            entry("NetDev", "Name", "x0", 1),
            entry("NetDev", "Kind", "bond", 2),
        ];
        assert!(matches!(
            validator.load(Path::new(FILE), &bad_kind),
            Err(LoadError::UnknownKind { kind, .. }) if kind == "bond"
        ));
    }

    #[test]
    fn test_invalid_name_is_missing_name() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let entries = vec![
            entry("NetDev", "Name", "far-too-long-name0", 1),
            entry("NetDev", "Kind", "dummy", 2),
        ];
        assert!(matches!(
            validator.load(Path::new(FILE), &entries),
            Err(LoadError::MissingName { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_missing_id() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let entries: Vec<_> = vxlan_entries()
            .into_iter()
            .filter(|e| e.key != "Id")
            .collect();
        let mut config = validator.load(Path::new(FILE), &entries).unwrap().config;

        assert!(validator.verify(&mut config, &ctx()).is_err());
        assert_eq!(config.status(), DeviceStatus::Failed);
    }

    #[test]
    fn test_verify_rejects_id_above_max() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let mut entries = vxlan_entries();
        entries.push(entry("VXLAN", "Id", "16777216", 12));
        let mut config = validator.load(Path::new(FILE), &entries).unwrap().config;

        assert!(matches!(
            validator.verify(&mut config, &ctx()),
            Err(VerifyError::InvalidId { .. })
        ));
        assert_eq!(config.status(), DeviceStatus::Failed);
    }

    #[test]
    fn test_match_conditions() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);

        let mut entries = vxlan_entries();
        entries.push(entry("Match", "Host", "node-2", 1));
        let mut config = validator.load(Path::new(FILE), &entries).unwrap().config;

        let err = validator.verify(&mut config, &ctx()).unwrap_err();
        assert!(matches!(err, VerifyError::ConditionNotMet { .. }));

        let mut entries = vxlan_entries();
        entries.push(entry("Match", "Host", "!node-2", 1));
        let mut config = validator.load(Path::new(FILE), &entries).unwrap().config;
        assert!(validator.verify(&mut config, &ctx()).is_ok());
        assert_eq!(config.status(), DeviceStatus::Parsed);
    }

    #[test]
    fn test_assign_kind_must_agree() {
        let registry = KindRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);
        let mut config = validator.load(Path::new(FILE), &vxlan_entries()).unwrap().config;

        let same = validator.assign(&mut config, &entry("NetDev", "Kind", "vxlan", 20));
        assert!(same.is_accepted());

        let other = validator.assign(&mut config, &entry("NetDev", "Kind", "dummy", 21));
        assert!(!other.is_accepted());
    }
}
