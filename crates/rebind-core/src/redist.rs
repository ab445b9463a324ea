//! Framework redistribution list (`RedistList/FrameworkList.xml`).
//!
//! Lists the modules the target runtime installs globally. A binding redirect
//! demand that no package satisfies is forgiven when the module appears here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rebind_util::errors::RebindError;

use crate::name::Name;
use crate::version::ModuleVersion;

/// One `<File>` entry of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedistEntry {
    pub name: Name,
    pub version: ModuleVersion,
    pub culture: String,
    pub public_key_token: String,
}

impl fmt::Display for RedistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[GAC] {}, Version = {}, PublicKeyToken = {}, Culture = {}",
            self.name, self.version, self.public_key_token, self.culture
        )
    }
}

/// Framework modules keyed by `(name, version)`.
#[derive(Debug, Clone, Default)]
pub struct FrameworkRedistList {
    entries: BTreeMap<(Name, ModuleVersion), RedistEntry>,
}

impl FrameworkRedistList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RebindError::Manifest {
            message: format!("Failed to read framework list {}: {e}", path.display()),
        })?;
        Self::parse_xml(&content).map_err(|e| {
            RebindError::Manifest {
                message: format!("Failed to process {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Parse the contents of a framework list.
    pub fn parse_xml(xml: &str) -> Result<Self, RebindError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut list = Self::empty();
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"File" => {
                    let entry = parse_file_element(e)?;
                    list.entries
                        .insert((entry.name.clone(), entry.version), entry);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(RebindError::manifest(format!(
                        "invalid framework list: {e}"
                    )))
                }
                _ => {}
            }
        }

        tracing::debug!("loaded {} framework list entries", list.len());
        Ok(list)
    }

    pub fn get(&self, name: &Name, version: ModuleVersion) -> Option<&RedistEntry> {
        self.entries.get(&(name.clone(), version))
    }

    pub fn contains(&self, name: &Name, version: ModuleVersion) -> bool {
        self.get(name, version).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_file_element(e: &BytesStart<'_>) -> Result<RedistEntry, RebindError> {
    let mut name = None;
    let mut version = None;
    let mut culture = None;
    let mut token = None;

    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map_err(|err| RebindError::manifest(format!("invalid attribute value: {err}")))?
            .to_string();
        match attr.key.as_ref() {
            b"AssemblyName" => name = Some(value),
            b"Version" => version = Some(value),
            b"Culture" => culture = Some(value),
            b"PublicKeyToken" => token = Some(value),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| RebindError::manifest("<File> lacks AssemblyName"))?;
    let version = version
        .ok_or_else(|| RebindError::manifest(format!("<File> {name} lacks Version")))?;
    Ok(RedistEntry {
        version: ModuleVersion::parse(&version)?,
        name: Name::new(name),
        culture: culture.unwrap_or_else(|| "neutral".to_string()),
        public_key_token: token.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FileList Redist="Microsoft-Windows-CLRCoreComp.4.7.2" Name=".NET Framework 4.7.2">
  <File AssemblyName="System.Net.Http" Version="4.2.0.0" PublicKeyToken="b03f5f7f11d50a3a" Culture="neutral" ProcessorArchitecture="MSIL" InGac="true" />
  <File AssemblyName="System.Runtime" Version="4.1.2.0" PublicKeyToken="b03f5f7f11d50a3a" Culture="neutral"></File>
</FileList>
"#;

    #[test]
    fn parses_file_entries() {
        let list = FrameworkRedistList::parse_xml(LIST).unwrap();
        assert_eq!(list.len(), 2);
        let http = list
            .get(&Name::new("system.net.http"), ModuleVersion::new(4, 2, 0, 0))
            .unwrap();
        assert_eq!(http.public_key_token, "b03f5f7f11d50a3a");
        assert!(list.contains(&Name::new("System.Runtime"), ModuleVersion::new(4, 1, 2, 0)));
        assert!(!list.contains(&Name::new("System.Runtime"), ModuleVersion::new(4, 0, 0, 0)));
    }

    #[test]
    fn display_marks_global_entries() {
        let list = FrameworkRedistList::parse_xml(LIST).unwrap();
        let http = list
            .get(&Name::new("System.Net.Http"), ModuleVersion::new(4, 2, 0, 0))
            .unwrap();
        assert_eq!(
            http.to_string(),
            "[GAC] System.Net.Http, Version = 4.2.0.0, PublicKeyToken = b03f5f7f11d50a3a, Culture = neutral"
        );
    }

    #[test]
    fn missing_version_is_rejected() {
        let xml = r#"<FileList><File AssemblyName="Broken" /></FileList>"#;
        assert!(FrameworkRedistList::parse_xml(xml).is_err());
    }

    #[test]
    fn empty_list() {
        assert!(FrameworkRedistList::empty().is_empty());
        assert!(FrameworkRedistList::parse_xml("<FileList/>").unwrap().is_empty());
    }
}
