use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::family::Family;
use crate::policy::PolicyTable;

const DECLARATION_SUFFIX: &str = ".family.json";

/// Collects family declarations and assigns their ids.
pub struct RegistryBuilder {
    config: RegistryConfig,
    families: Vec<(u16, Arc<Family>)>,
    next_id: u16,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            next_id: config.first_family_id,
            config,
            families: Vec::new(),
        }
    }

    /// Register a family and return the id assigned to it.
    pub fn register(&mut self, family: Family) -> Result<u16> {
        if self
            .families
            .iter()
            .any(|(_, existing)| existing.name() == family.name())
        {
            return Err(SchemaError::InvalidFamily(format!(
                "family registered twice: {}",
                family.name()
            )));
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            SchemaError::InvalidFamily(format!("no family id left for {}", family.name()))
        })?;
        debug!(family = family.name(), id, "registered family");
        self.families.push((id, Arc::new(family)));
        Ok(id)
    }

    /// Register a family from a JSON declaration.
    pub fn register_json(&mut self, json: &str) -> Result<u16> {
        self.register(Family::from_json(json)?)
    }

    /// Register every `*.family.json` declaration in `dir`, in file name order.
    ///
    /// Symlinked declarations are refused; file count and file size are capped
    /// by [`RegistryConfig`].
    pub fn load_directory(&mut self, dir: &Path) -> Result<Vec<u16>> {
        let entries = std::fs::read_dir(dir)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", dir.display())))?;

        let mut candidates: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.to_ascii_lowercase().ends_with(DECLARATION_SUFFIX) {
                continue;
            }
            candidates.push((file_name, entry.path()));
        }
        candidates.sort();

        if candidates.len() > self.config.max_families_from_directory {
            return Err(SchemaError::LoadFailed(format!(
                "family count exceeds configured max ({}): {}",
                self.config.max_families_from_directory,
                candidates.len()
            )));
        }

        let mut ids = Vec::with_capacity(candidates.len());
        for (file_name, path) in candidates {
            let Some(content) = self.read_declaration(&file_name, &path)? else {
                continue;
            };
            let id = self.register_json(&content).map_err(|err| match err {
                SchemaError::InvalidJson(err) => {
                    SchemaError::LoadFailed(format!("{file_name}: {err}"))
                }
                other => other,
            })?;
            ids.push(id);
        }

        info!(dir = %dir.display(), count = ids.len(), "loaded family declarations");
        Ok(ids)
    }

    fn read_declaration(&self, file_name: &str, path: &Path) -> Result<Option<String>> {
        let path_metadata = std::fs::symlink_metadata(path)
            .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
        let file_type = path_metadata.file_type();
        if file_type.is_symlink() {
            return Err(SchemaError::LoadFailed(format!(
                "refusing to load family symlink: {file_name}"
            )));
        }
        if !file_type.is_file() {
            return Ok(None);
        }

        let file = std::fs::File::open(path).map_err(|err| {
            SchemaError::LoadFailed(format!("failed opening {}: {err}", path.display()))
        })?;
        let opened_metadata = file
            .metadata()
            .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

        #[cfg(unix)]
        {
            if !same_file_identity(&path_metadata, &opened_metadata) {
                return Err(SchemaError::LoadFailed(format!(
                    "family file changed during load: {file_name}"
                )));
            }
        }

        let max_bytes = self.config.max_family_file_size;
        if opened_metadata.len() > max_bytes as u64 {
            return Err(SchemaError::LoadFailed(format!(
                "family file too large ({} bytes): {file_name}",
                opened_metadata.len()
            )));
        }

        let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| {
                SchemaError::LoadFailed(format!("failed reading {}: {err}", path.display()))
            })?;
        if content.len() > max_bytes {
            return Err(SchemaError::LoadFailed(format!(
                "family file too large while reading: {file_name}"
            )));
        }
        Ok(Some(content))
    }

    /// Freeze the registry.
    pub fn build(self) -> FamilyRegistry {
        let by_name = self
            .families
            .iter()
            .enumerate()
            .map(|(index, (_, family))| (family.name().to_owned(), index))
            .collect();
        FamilyRegistry {
            families: self.families,
            by_name,
            config: self.config,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable name/id → family lookup, built once at startup.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    families: Vec<(u16, Arc<Family>)>,
    by_name: HashMap<String, usize>,
    config: RegistryConfig,
}

impl FamilyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Id assigned to the family called `name`.
    pub fn resolve(&self, name: &str) -> Result<u16> {
        self.entry(name).map(|(id, _)| *id)
    }

    pub fn family(&self, name: &str) -> Result<&Arc<Family>> {
        self.entry(name).map(|(_, family)| family)
    }

    pub fn by_id(&self, id: u16) -> Result<&Arc<Family>> {
        self.families
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, family)| family)
            .ok_or_else(|| SchemaError::UnknownFamily(format!("id {id:#06x}")))
    }

    pub fn policy_for(&self, name: &str) -> Result<&PolicyTable> {
        self.family(name).map(|family| family.policy())
    }

    pub fn commands_for(&self, name: &str) -> Result<&std::collections::BTreeSet<u8>> {
        self.family(name).map(|family| family.commands())
    }

    /// Registered families in id order.
    pub fn families(&self) -> impl Iterator<Item = (u16, &Arc<Family>)> {
        self.families.iter().map(|(id, family)| (*id, family))
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn entry(&self, name: &str) -> Result<&(u16, Arc<Family>)> {
        self.by_name
            .get(name)
            .and_then(|index| self.families.get(*index))
            .ok_or_else(|| SchemaError::UnknownFamily(name.to_owned()))
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
