//! Content modules.
//!
//! A module owns one namespace of named presets plus the metadata of the
//! content pack it was loaded from. Presets are bucketed by their own type
//! and every ancestor type, so `get_all_of_type` sees descendants too.
//!
//! # Features
//! - Exact type-plus-name collision detection with optional in-place
//!   overwrite that preserves instance identity
//! - Group tag register
//! - Material id remap table for packs whose declared ids were taken

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::descriptor::{TypeRegistry, BASE_TYPE_NAME};
use crate::pool::PooledPreset;
use crate::preset::{Preset, GROUP_ALL, GROUP_ANY, GROUP_NONE};

/// Size of a module's material id space. Id 0 means unmapped.
pub const MATERIAL_SLOT_COUNT: usize = 256;

/// Position of a module in the registry's load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

#[derive(Debug)]
struct PresetEntry {
    preset: PooledPreset,
    /// Content file the current definition was read from.
    file: PathBuf,
}

/// One loaded content module and its preset namespace.
#[derive(Debug)]
pub struct ContentModule {
    /// Pack name on disk, e.g. `Base.pack`.
    file_name: String,
    /// Display name from the module definition.
    friendly_name: String,
    /// Credited author.
    author: String,
    /// Free-form description.
    description: String,
    /// Content format version of the pack.
    version: u32,
    /// Position in the registry's load order.
    id: ModuleId,
    /// Icon image path, relative to the pack.
    icon_file: Option<PathBuf>,
    /// Whether loose content files in the pack folder are read after the index.
    scan_folder_contents: bool,
    /// Whether missing item references should be tolerated by consumers.
    ignore_missing_items: bool,
    entries: Vec<PresetEntry>,
    /// Preset names and entry indices bucketed under the preset's type and
    /// every ancestor type.
    type_map: HashMap<String, Vec<(String, usize)>>,
    /// Group tags seen in this module, sorted.
    groups: Vec<String>,
    /// Declared-to-actual material id mappings, 0 meaning unmapped.
    material_mappings: [u8; MATERIAL_SLOT_COUNT],
}

impl ContentModule {
    /// Creates an empty module named after its pack.
    pub fn new(file_name: &str, id: ModuleId) -> Self {
        ContentModule {
            file_name: file_name.to_string(),
            friendly_name: String::new(),
            author: String::new(),
            description: String::new(),
            version: 1,
            id,
            icon_file: None,
            scan_folder_contents: false,
            ignore_missing_items: false,
            entries: Vec::new(),
            type_map: HashMap::new(),
            groups: Vec::new(),
            material_mappings: [0; MATERIAL_SLOT_COUNT],
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Pack name on disk.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Display name, empty if the pack never declared one.
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Credited author, empty if never declared.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Pack description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Content format version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Position in the registry's load order.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Icon image path, if declared.
    pub fn icon_file(&self) -> Option<&Path> {
        self.icon_file.as_deref()
    }

    /// Whether loose content files are read after the index.
    pub fn scan_folder_contents(&self) -> bool {
        self.scan_folder_contents
    }

    /// Whether consumers should tolerate dangling item references.
    pub fn ignore_missing_items(&self) -> bool {
        self.ignore_missing_items
    }

    /// Number of presets defined in this module.
    pub fn preset_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn set_friendly_name(&mut self, name: String) {
        self.friendly_name = name;
    }

    pub(crate) fn set_author(&mut self, author: String) {
        self.author = author;
    }

    pub(crate) fn set_description(&mut self, text: String) {
        self.description = text;
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub(crate) fn set_icon_file(&mut self, path: PathBuf) {
        self.icon_file = Some(path);
    }

    pub(crate) fn set_scan_folder_contents(&mut self, scan: bool) {
        self.scan_folder_contents = scan;
    }

    pub(crate) fn set_ignore_missing_items(&mut self, ignore: bool) {
        self.ignore_missing_items = ignore;
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Registers a preset in this module.
    ///
    /// The module stores its own clone; the caller keeps `preset`. On an
    /// exact type-plus-name collision the existing instance is overwritten in
    /// place when `overwrite_allowed`, so references handed out earlier keep
    /// pointing at current data. Returns whether the preset was taken.
    ///
    /// Unnamed presets and working copies that were never renamed are
    /// rejected with a warning.
    pub fn add_preset(
        &mut self,
        preset: &mut dyn Preset,
        types: &TypeRegistry,
        overwrite_allowed: bool,
        origin_file: &Path,
    ) -> anyhow::Result<bool> {
        if !preset.common().is_named() {
            warn!(
                module = %self.file_name,
                type_name = preset.type_name(),
                "rejected unnamed preset"
            );
            return Ok(false);
        }
        if !preset.common().is_original() {
            warn!(
                module = %self.file_name,
                type_name = preset.type_name(),
                name = %preset.common().preset_name(),
                "rejected working copy that was never given a new name"
            );
            return Ok(false);
        }
        let type_name = preset.type_name();
        let preset_name = preset.common().preset_name().to_string();

        if let Some(idx) = self.find_exact(type_name, &preset_name) {
            if !overwrite_allowed {
                warn!(
                    module = %self.file_name,
                    type_name = type_name,
                    name = %preset_name,
                    "preset already defined and overwriting is not allowed"
                );
                return Ok(false);
            }
            preset.common_mut().set_module(Some(self.id));
            {
                let entry = &mut self.entries[idx];
                entry.preset.copy_from(&*preset)?;
                entry.preset.common_mut().set_original(true);
                entry.file = origin_file.to_path_buf();
            }
            let tags = self.entries[idx].preset.common().groups().to_vec();
            for tag in &tags {
                self.register_group(tag);
            }
            info!(
                module = %self.file_name,
                type_name = type_name,
                name = %preset_name,
                "overwrote preset in place"
            );
            return Ok(true);
        }

        preset.common_mut().set_module(Some(self.id));
        let mut stored = types.clone_preset(&*preset)?;
        stored.common_mut().set_original(true);
        let tags = stored.common().groups().to_vec();

        let entry_idx = self.entries.len();
        self.entries.push(PresetEntry {
            preset: stored,
            file: origin_file.to_path_buf(),
        });
        for ancestor in types.lineage(type_name) {
            self.type_map
                .entry(ancestor.to_string())
                .or_default()
                .push((preset_name.clone(), entry_idx));
        }
        for tag in &tags {
            self.register_group(tag);
        }
        debug!(
            module = %self.file_name,
            type_name = type_name,
            name = %preset_name,
            "added preset"
        );
        Ok(true)
    }

    /// Finds the preset with exactly this type and name.
    pub fn get_preset(&self, type_name: &str, preset_name: &str) -> Option<&dyn Preset> {
        self.find_exact(type_name, preset_name)
            .map(|idx| &*self.entries[idx].preset)
    }

    /// All presets of `type_name` or a type descending from it, in
    /// registration order. `All` or an empty name lists every preset.
    pub fn get_all_of_type(&self, type_name: &str) -> Vec<&dyn Preset> {
        let key = if type_name.is_empty() || type_name == GROUP_ALL {
            BASE_TYPE_NAME
        } else {
            type_name
        };
        match self.type_map.get(key) {
            Some(bucket) => bucket
                .iter()
                .map(|(_, idx)| &*self.entries[*idx].preset)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Presets of `type_name` (or a descendant) that belong to `group`.
    pub fn get_all_of_group(&self, group: &str, type_name: &str) -> Vec<&dyn Preset> {
        self.get_all_of_type(type_name)
            .into_iter()
            .filter(|preset| preset.common().is_in_group(group))
            .collect()
    }

    /// Group tags carried by presets of `type_name` or a descendant.
    pub fn get_groups_with_type(&self, type_name: &str) -> Vec<String> {
        if type_name.is_empty() || type_name == GROUP_ALL {
            return self.groups.clone();
        }
        let mut found: Vec<String> = Vec::new();
        for preset in self.get_all_of_type(type_name) {
            for tag in preset.common().groups() {
                if tag == GROUP_ALL {
                    continue;
                }
                if let Err(pos) = found.binary_search(tag) {
                    found.insert(pos, tag.clone());
                }
            }
        }
        found
    }

    /// Content file the preset's current definition was read from.
    pub fn data_location_of(&self, type_name: &str, preset_name: &str) -> Option<&Path> {
        self.find_exact(type_name, preset_name)
            .map(|idx| self.entries[idx].file.as_path())
    }

    fn find_exact(&self, type_name: &str, preset_name: &str) -> Option<usize> {
        let bucket = self.type_map.get(type_name)?;
        bucket.iter().find_map(|(name, idx)| {
            let entry = &self.entries[*idx];
            if name.as_str() == preset_name && entry.preset.type_name() == type_name {
                Some(*idx)
            } else {
                None
            }
        })
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Records a group tag for this module. The implicit `All`, `Any` and
    /// `None` tags are never recorded.
    pub fn register_group(&mut self, tag: &str) {
        if tag.is_empty() || tag == GROUP_ALL || tag == GROUP_ANY || tag == GROUP_NONE {
            return;
        }
        if let Err(pos) = self.groups.binary_search_by(|g| g.as_str().cmp(tag)) {
            self.groups.insert(pos, tag.to_string());
        }
    }

    /// Group tags recorded for this module, sorted.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    // =========================================================================
    // Material mappings
    // =========================================================================

    /// Records that material id `from`, as declared by this pack, actually
    /// lives at `to`. Returns whether the slot was previously unmapped.
    pub fn add_material_mapping(&mut self, from: u8, to: u8) -> bool {
        if from == 0 || to == 0 {
            warn!(module = %self.file_name, from, to, "material mappings use ids 1..=255");
            return false;
        }
        let was_empty = self.material_mappings[from as usize] == 0;
        self.material_mappings[from as usize] = to;
        was_empty
    }

    /// Mapped id for `from`, 0 if unmapped.
    pub fn get_material_mapping(&self, from: u8) -> u8 {
        self.material_mappings[from as usize]
    }

    /// Resolves a material id as this module declared it, falling back to the
    /// id itself when no mapping exists.
    pub fn resolve_material(&self, id: u8) -> u8 {
        match self.material_mappings[id as usize] {
            0 => id,
            mapped => mapped,
        }
    }

    /// All recorded mappings as `(declared, actual)` pairs.
    pub fn material_mappings(&self) -> Vec<(u8, u8)> {
        self.material_mappings
            .iter()
            .enumerate()
            .filter(|(_, to)| **to != 0)
            .map(|(from, to)| (from as u8, *to))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{CopySource, PresetCommon};
    use crate::stream::PropertyStream;

    #[derive(Debug, Clone, Default)]
    struct Barrel {
        common: PresetCommon,
        volume: u32,
    }

    impl Barrel {
        fn read_preset_property(
            &mut self,
            name: &str,
            stream: &mut dyn PropertyStream,
            sources: &dyn CopySource,
        ) -> anyhow::Result<()> {
            crate::preset::read_base_property(self, name, stream, sources)
        }
    }

    crate::impl_preset!(Barrel, "Barrel");

    #[derive(Debug, Clone, Default)]
    struct SteelBarrel {
        common: PresetCommon,
    }

    impl SteelBarrel {
        fn read_preset_property(
            &mut self,
            name: &str,
            stream: &mut dyn PropertyStream,
            sources: &dyn CopySource,
        ) -> anyhow::Result<()> {
            crate::preset::read_base_property(self, name, stream, sources)
        }
    }

    crate::impl_preset!(SteelBarrel, "SteelBarrel");

    fn test_types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types
            .register("Barrel", BASE_TYPE_NAME, Some(Barrel::new_boxed), None)
            .unwrap();
        types
            .register("SteelBarrel", "Barrel", Some(SteelBarrel::new_boxed), None)
            .unwrap();
        types
    }

    fn named(types: &TypeRegistry, type_name: &str, name: &str) -> crate::pool::PooledPreset {
        let mut inst = types.new_instance(type_name).unwrap();
        inst.common_mut().set_preset_name(name);
        inst
    }

    #[test]
    fn stores_a_clone_and_finds_it_by_exact_type() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));
        let origin = Path::new("Base.pack/Index.ini");

        let mut inst = named(&types, "Barrel", "Rain Barrel");
        assert!(module
            .add_preset(&mut *inst, &types, false, origin)
            .unwrap());

        // The caller keeps its own instance; the module stored a clone.
        let found = module.get_preset("Barrel", "Rain Barrel").unwrap();
        assert!(found.common().is_original());
        assert_eq!(found.common().module(), Some(ModuleId(0)));
        assert!(!std::ptr::eq(
            found as *const dyn Preset as *const (),
            &*inst as *const dyn Preset as *const ()
        ));

        assert!(module.get_preset("SteelBarrel", "Rain Barrel").is_none());
        assert_eq!(module.preset_count(), 1);
    }

    #[test]
    fn rejects_unnamed_and_non_original_presets() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));
        let origin = Path::new("Base.pack/Index.ini");

        let mut unnamed = types.new_instance("Barrel").unwrap();
        assert!(!module
            .add_preset(&mut *unnamed, &types, false, origin)
            .unwrap());

        let mut copy = types.new_instance("Barrel").unwrap();
        copy.common_mut().set_preset_name("Keg");
        copy.common_mut().set_original(false);
        assert!(!module
            .add_preset(&mut *copy, &types, false, origin)
            .unwrap());
        assert_eq!(module.preset_count(), 0);
    }

    #[test]
    fn disallowed_collision_keeps_the_first_definition() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));
        let origin = Path::new("Base.pack/Index.ini");

        let mut first = named(&types, "Barrel", "Keg");
        if let Some(barrel) = first.as_any_mut().downcast_mut::<Barrel>() {
            barrel.volume = 50;
        }
        assert!(module.add_preset(&mut *first, &types, false, origin).unwrap());

        let mut second = named(&types, "Barrel", "Keg");
        if let Some(barrel) = second.as_any_mut().downcast_mut::<Barrel>() {
            barrel.volume = 999;
        }
        assert!(!module
            .add_preset(&mut *second, &types, false, origin)
            .unwrap());

        let kept = module.get_preset("Barrel", "Keg").unwrap();
        let kept = kept.as_any().downcast_ref::<Barrel>().unwrap();
        assert_eq!(kept.volume, 50);
        assert_eq!(module.preset_count(), 1);
    }

    #[test]
    fn allowed_collision_overwrites_in_place() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));

        let mut first = named(&types, "Barrel", "Keg");
        if let Some(barrel) = first.as_any_mut().downcast_mut::<Barrel>() {
            barrel.volume = 50;
        }
        module
            .add_preset(&mut *first, &types, false, Path::new("Base.pack/Index.ini"))
            .unwrap();
        let before = module.get_preset("Barrel", "Keg").unwrap() as *const dyn Preset as *const ();

        let mut second = named(&types, "Barrel", "Keg");
        if let Some(barrel) = second.as_any_mut().downcast_mut::<Barrel>() {
            barrel.volume = 75;
        }
        second.common_mut().add_to_group("Storage");
        assert!(module
            .add_preset(&mut *second, &types, true, Path::new("Base.pack/Barrels.ini"))
            .unwrap());

        // Same instance, new state, new origin file.
        let kept = module.get_preset("Barrel", "Keg").unwrap();
        let after = kept as *const dyn Preset as *const ();
        assert_eq!(before, after);
        assert!(kept.common().is_original());
        assert_eq!(
            kept.as_any().downcast_ref::<Barrel>().unwrap().volume,
            75
        );
        assert_eq!(
            module.data_location_of("Barrel", "Keg").unwrap(),
            Path::new("Base.pack/Barrels.ini")
        );
        assert_eq!(module.groups(), &["Storage".to_string()]);
        assert_eq!(module.preset_count(), 1);
    }

    #[test]
    fn ancestor_buckets_see_descendant_presets() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));
        let origin = Path::new("Base.pack/Index.ini");

        let mut plain = named(&types, "Barrel", "Keg");
        let mut steel = named(&types, "SteelBarrel", "Drum");
        module.add_preset(&mut *plain, &types, false, origin).unwrap();
        module.add_preset(&mut *steel, &types, false, origin).unwrap();

        let barrels = module.get_all_of_type("Barrel");
        assert_eq!(barrels.len(), 2);
        assert_eq!(module.get_all_of_type("SteelBarrel").len(), 1);
        assert_eq!(module.get_all_of_type(GROUP_ALL).len(), 2);

        // Same name under the same ancestor is fine as long as exact types differ.
        let mut steel_keg = named(&types, "SteelBarrel", "Keg");
        assert!(module
            .add_preset(&mut *steel_keg, &types, false, origin)
            .unwrap());
        assert_eq!(module.get_all_of_type("Barrel").len(), 3);
    }

    #[test]
    fn group_queries_filter_by_tag() {
        let types = test_types();
        let mut module = ContentModule::new("Base.pack", ModuleId(0));
        let origin = Path::new("Base.pack/Index.ini");

        let mut keg = named(&types, "Barrel", "Keg");
        keg.common_mut().add_to_group("Storage");
        let mut drum = named(&types, "SteelBarrel", "Drum");
        drum.common_mut().add_to_group("Armored");
        module.add_preset(&mut *keg, &types, false, origin).unwrap();
        module.add_preset(&mut *drum, &types, false, origin).unwrap();

        let storage = module.get_all_of_group("Storage", "Barrel");
        assert_eq!(storage.len(), 1);
        assert_eq!(storage[0].common().preset_name(), "Keg");

        assert_eq!(module.get_all_of_group(GROUP_ALL, "Barrel").len(), 2);
        assert!(module.get_all_of_group("Storage", "SteelBarrel").is_empty());

        assert_eq!(
            module.get_groups_with_type("SteelBarrel"),
            vec!["Armored".to_string()]
        );
        assert_eq!(
            module.groups(),
            &["Armored".to_string(), "Storage".to_string()]
        );
    }

    #[test]
    fn material_mappings_resolve_with_identity_fallback() {
        let mut module = ContentModule::new("Mod.pack", ModuleId(1));

        assert!(module.add_material_mapping(40, 41));
        assert_eq!(module.get_material_mapping(40), 41);
        assert_eq!(module.resolve_material(40), 41);
        assert_eq!(module.resolve_material(7), 7);

        // Remapping the same declared id reports the slot as taken.
        assert!(!module.add_material_mapping(40, 42));
        assert_eq!(module.resolve_material(40), 42);

        assert!(!module.add_material_mapping(0, 5));
        assert_eq!(module.material_mappings(), vec![(40, 42)]);
    }
}
