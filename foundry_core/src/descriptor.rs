//! Preset type descriptors and the type registry.
//!
//! # Features
//! - Registration of concrete and abstract preset types under unique names
//! - Single-inheritance tree rooted at [`BASE_TYPE_NAME`]
//! - Construction and cloning by type name, backed by per-type pools
//! - Lineage queries (`is_descendant_of`, `lineage`)

use std::collections::HashMap;

use anyhow::bail;
use tracing::debug;

use crate::pool::{InstancePool, PoolStats, PooledPreset};
use crate::preset::Preset;

/// Name of the abstract root every preset type descends from.
pub const BASE_TYPE_NAME: &str = "Preset";

/// Instances built per pool refill unless a type overrides it.
pub const DEFAULT_REFILL_BATCH: usize = 10;

/// Builds a fresh, default-constructed instance of one concrete type.
pub type PresetFactory = fn() -> Box<dyn Preset>;

/// Everything the registry knows about one preset type.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    parent: Option<String>,
    pool: Option<InstancePool>,
}

impl TypeDescriptor {
    /// Registered type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent type name, `None` only for the root.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether instances of this type can be constructed.
    pub fn is_concrete(&self) -> bool {
        self.pool.is_some()
    }

    /// The type's instance pool, absent for abstract types.
    pub fn pool(&self) -> Option<&InstancePool> {
        self.pool.as_ref()
    }
}

/// Registry of every known preset type.
///
/// Types must be registered before any content referring to them is read,
/// parents before children. The abstract root is registered up front.
#[derive(Debug)]
pub struct TypeRegistry {
    descriptors: HashMap<String, TypeDescriptor>,
    refill_batch: usize,
}

impl TypeRegistry {
    /// Creates a registry holding only the abstract root type.
    pub fn new() -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert(
            BASE_TYPE_NAME.to_string(),
            TypeDescriptor {
                name: BASE_TYPE_NAME.to_string(),
                parent: None,
                pool: None,
            },
        );
        TypeRegistry {
            descriptors,
            refill_batch: DEFAULT_REFILL_BATCH,
        }
    }

    /// Overrides the default pool refill batch for later registrations.
    pub fn with_refill_batch(mut self, batch: usize) -> Self {
        self.refill_batch = batch.max(1);
        self
    }

    /// Registers a type under `parent`.
    ///
    /// Passing a factory makes the type concrete and gives it a pool;
    /// `None` registers an abstract type that only structures the tree.
    /// Names are unique; the parent must already be registered.
    pub fn register(
        &mut self,
        name: &str,
        parent: &str,
        factory: Option<PresetFactory>,
        refill_batch: Option<usize>,
    ) -> anyhow::Result<()> {
        if self.descriptors.contains_key(name) {
            bail!("type name \"{}\" is already registered", name);
        }
        if !self.descriptors.contains_key(parent) {
            bail!(
                "parent type \"{}\" of \"{}\" is not registered yet",
                parent,
                name
            );
        }
        let concrete = factory.is_some();
        let pool = factory
            .map(|f| InstancePool::new(name, f, refill_batch.unwrap_or(self.refill_batch)));
        self.descriptors.insert(
            name.to_string(),
            TypeDescriptor {
                name: name.to_string(),
                parent: Some(parent.to_string()),
                pool,
            },
        );
        debug!(type_name = %name, parent = %parent, concrete, "registered preset type");
        Ok(())
    }

    /// Whether `name` is a registered type.
    pub fn is_registered(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Whether `name` is registered and constructible.
    pub fn is_concrete(&self, name: &str) -> bool {
        self.descriptors
            .get(name)
            .map(TypeDescriptor::is_concrete)
            .unwrap_or(false)
    }

    /// Descriptor for `name`, if registered.
    pub fn descriptor(&self, name: &str) -> Option<&TypeDescriptor> {
        self.descriptors.get(name)
    }

    /// Number of registered types, the root included.
    pub fn type_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Builds a fresh instance of `type_name` from its pool.
    ///
    /// Fails for unknown and for abstract types.
    pub fn new_instance(&self, type_name: &str) -> anyhow::Result<PooledPreset> {
        let desc = match self.descriptors.get(type_name) {
            Some(desc) => desc,
            None => bail!("unknown type \"{}\"", type_name),
        };
        match desc.pool() {
            Some(pool) => Ok(pool.acquire()),
            None => bail!("type \"{}\" is abstract and cannot be instantiated", type_name),
        }
    }

    /// Builds a working copy of `source` through its type's pool.
    pub fn clone_preset(&self, source: &dyn Preset) -> anyhow::Result<PooledPreset> {
        let mut copy = self.new_instance(source.type_name())?;
        copy.copy_from(source)?;
        Ok(copy)
    }

    /// Whether `type_name` is `ancestor` itself or descends from it.
    pub fn is_descendant_of(&self, type_name: &str, ancestor: &str) -> bool {
        self.lineage(type_name).iter().any(|name| *name == ancestor)
    }

    /// Whether `type_name` is `descendant` itself or an ancestor of it.
    pub fn is_ancestor_of(&self, type_name: &str, descendant: &str) -> bool {
        self.is_descendant_of(descendant, type_name)
    }

    /// The inheritance chain of `type_name`, starting with itself and ending
    /// at the root. Empty for unknown types.
    pub fn lineage(&self, type_name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut cursor = Some(type_name);
        while let Some(name) = cursor {
            match self.descriptors.get(name) {
                Some(desc) => {
                    chain.push(desc.name());
                    cursor = desc.parent();
                }
                None => {
                    chain.clear();
                    break;
                }
            }
        }
        chain
    }

    /// Pool counters for a concrete type.
    pub fn pool_stats(&self, type_name: &str) -> Option<PoolStats> {
        self.descriptors
            .get(type_name)?
            .pool()
            .map(InstancePool::stats)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}
