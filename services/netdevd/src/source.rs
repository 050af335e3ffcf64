//! Configuration directory reader.
//!
//! Splits `*.netdev` and `*.network` files into `(section, key, value)`
//! entries. Only the line structure is handled here; values are interpreted
//! by the validator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use netdevd_netdev::ConfigEntry;
use thiserror::Error;
use tracing::{debug, warn};

use crate::orchestrator::StackBinding;

/// Errors reading configuration sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: {reason}", file.display())]
    Syntax {
        file: PathBuf,
        line: usize,
        reason: &'static str,
    },
}

/// One device definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub entries: Vec<ConfigEntry>,
}

/// Everything read from a configuration directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigSet {
    /// Device definitions in file-name order.
    pub netdevs: Vec<SourceFile>,
    /// Stacking declarations from `.network` files.
    pub bindings: Vec<StackBinding>,
}

/// Split `text` into entries.
///
/// Blank lines and lines starting with `#` or `;` are skipped. A line that
/// is neither a section header nor `Key=Value` is an error, as is an
/// assignment before the first section.
pub fn parse_entries(file: &Path, text: &str) -> Result<Vec<ConfigEntry>, SourceError> {
    let mut entries = Vec::new();
    let mut section: Option<String> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let syntax = |reason: &'static str| SourceError::Syntax {
            file: file.to_path_buf(),
            line,
            reason,
        };

        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| syntax("invalid section header"))?;
            section = Some(name.to_string());
            continue;
        }

        let (key, value) = trimmed
            .split_once('=')
            .ok_or_else(|| syntax("expected Key=Value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(syntax("empty key"));
        }
        let section = section
            .as_deref()
            .ok_or_else(|| syntax("assignment outside of a section"))?;

        entries.push(ConfigEntry::new(section, key, value.trim(), file, line));
    }

    Ok(entries)
}

/// Stacking declarations in a `.network` file.
///
/// Every `[Network] VXLAN=` device is bound to every `[Match] Name=` link.
/// Both keys take whitespace-separated lists.
pub fn network_bindings(entries: &[ConfigEntry]) -> Vec<StackBinding> {
    let values = |section: &str, key: &str| -> Vec<String> {
        entries
            .iter()
            .filter(|e| e.section == section && e.key == key)
            .flat_map(|e| e.value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect()
    };

    let links = values("Match", "Name");
    let devices = values("Network", "VXLAN");

    links
        .iter()
        .flat_map(|link| {
            devices
                .iter()
                .map(move |device| StackBinding::new(device.clone(), link.clone()))
        })
        .collect()
}

/// Read every `*.netdev` and `*.network` file in `dir`, in name order.
///
/// A missing directory yields an empty set. A file that cannot be read or
/// split is skipped with a warning.
pub fn load_dir(dir: &Path) -> Result<ConfigSet, SourceError> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "Configuration directory does not exist");
            return Ok(ConfigSet::default());
        }
        Err(source) => {
            return Err(SourceError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let wanted = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("netdev" | "network")
        );
        if wanted && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut set = ConfigSet::default();
    for path in paths {
        let entries = match read_file(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping configuration file");
                continue;
            }
        };

        debug!(file = %path.display(), entries = entries.len(), "Read configuration file");

        if path.extension().is_some_and(|e| e == "network") {
            set.bindings.extend(network_bindings(&entries));
        } else {
            set.netdevs.push(SourceFile { path, entries });
        }
    }

    Ok(set)
}

fn read_file(path: &Path) -> Result<Vec<ConfigEntry>, SourceError> {
    let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_entries(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VXLAN: &str = "\
# overlay
[NetDev]
Name=vx0
Kind = vxlan

; multicast group
[VXLAN]
Id=42
Group=239.1.1.1
";

    #[test]
    fn test_parse_entries() {
        let entries = parse_entries(Path::new("vx0.netdev"), VXLAN).unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1], ConfigEntry::new("NetDev", "Kind", "vxlan", "vx0.netdev", 4));
        assert_eq!(entries[3].section, "VXLAN");
        assert_eq!(entries[3].line, 9);
    }

    #[test]
    fn test_value_keeps_inner_equals() {
        let entries = parse_entries(Path::new("a"), "[NetDev]\nDescription=a=b\n").unwrap();
        assert_eq!(entries[0].value, "a=b");
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_entries(Path::new("a"), "Name=x\n").unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 1, .. }));

        let err = parse_entries(Path::new("a"), "[NetDev]\n\njunk\n").unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 3, .. }));

        let err = parse_entries(Path::new("a"), "[NetDev\n").unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_network_bindings() {
        let text = "[Match]\nName=eth0\n[Network]\nVXLAN=vx0 vx1\nVXLAN=vx2\n";
        let entries = parse_entries(Path::new("eth0.network"), text).unwrap();

        assert_eq!(
            network_bindings(&entries),
            vec![
                StackBinding::new("vx0", "eth0"),
                StackBinding::new("vx1", "eth0"),
                StackBinding::new("vx2", "eth0"),
            ]
        );
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20-vx0.netdev"), VXLAN).unwrap();
        fs::write(
            dir.path().join("10-dummy.netdev"),
            "[NetDev]\nName=dummy0\nKind=dummy\n",
        )
        .unwrap();
        fs::write(dir.path().join("eth0.network"), "[Match]\nName=eth0\n[Network]\nVXLAN=vx0\n")
            .unwrap();
        fs::write(dir.path().join("broken.netdev"), "garbage\n").unwrap();
        fs::write(dir.path().join("README"), "not config").unwrap();

        let set = load_dir(dir.path()).unwrap();

        let names: Vec<_> = set
            .netdevs
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["10-dummy.netdev", "20-vx0.netdev"]);
        assert_eq!(set.bindings, vec![StackBinding::new("vx0", "eth0")]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = load_dir(&dir.path().join("absent")).unwrap();
        assert_eq!(set, ConfigSet::default());
    }
}
