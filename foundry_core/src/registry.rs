//! The content registry.
//!
//! Owns the ordered list of loaded [`ContentModule`]s, the type registry the
//! content was built against, and the shared material palette. Module order
//! is load order; the base module always sits at index 0, and a module only
//! ever references itself and modules loaded before it.
//!
//! # Features
//! - Loading module packs from disk (index file plus optional folder scan)
//! - `Module/Name` path lookups and module-space queries
//! - `CopyOf` resolution against already-loaded content while reading
//! - Material palette with declared-to-actual id remapping
//! - Reloading a preset's defining file in place

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::catalog::Material;
use crate::descriptor::TypeRegistry;
use crate::module::{ContentModule, ModuleId, MATERIAL_SLOT_COUNT};
use crate::preset::{read_preset_from, CopySource, Preset};
use crate::reader::TextReader;
use crate::stream::{parse_bool, parse_num, read_multi_line_text, PropertyStream};

/// Index file read first for every module pack.
pub const INDEX_FILE: &str = "Index.ini";

/// Header naming a module definition object in an index file.
pub const MODULE_HEADER: &str = "ContentModule";

#[derive(Debug, Clone)]
struct PaletteSlot {
    module: ModuleId,
    preset_name: String,
}

/// Engine-wide material id space shared by every module.
#[derive(Debug)]
struct MaterialPalette {
    slots: Vec<Option<PaletteSlot>>,
}

impl MaterialPalette {
    fn new() -> Self {
        MaterialPalette {
            slots: vec![None; MATERIAL_SLOT_COUNT],
        }
    }

    /// Claims a slot for a material, starting at its declared id and walking
    /// upward (wrapping past 255 to 1) until a free slot is found.
    ///
    /// A slot already owned by the same module and material is reused, so
    /// re-reading a definition does not shift ids. A full palette is an
    /// error.
    fn place(&mut self, module: ModuleId, preset_name: &str, declared: u8) -> anyhow::Result<u8> {
        if declared == 0 {
            bail!("material id 0 is reserved, declare ids 1..=255");
        }
        let mut slot = declared;
        loop {
            match &self.slots[slot as usize] {
                None => {
                    self.slots[slot as usize] = Some(PaletteSlot {
                        module,
                        preset_name: preset_name.to_string(),
                    });
                    return Ok(slot);
                }
                Some(owner) if owner.module == module && owner.preset_name == preset_name => {
                    return Ok(slot);
                }
                Some(_) => {
                    slot = if slot as usize + 1 >= MATERIAL_SLOT_COUNT {
                        1
                    } else {
                        slot + 1
                    };
                    if slot == declared {
                        bail!("material palette is full, all 255 usable slots are taken");
                    }
                }
            }
        }
    }

    fn owner(&self, slot: u8) -> Option<(ModuleId, &str)> {
        self.slots[slot as usize]
            .as_ref()
            .map(|owner| (owner.module, owner.preset_name.as_str()))
    }
}

/// Ordered set of loaded content modules plus the shared material palette.
#[derive(Debug)]
pub struct Registry {
    types: TypeRegistry,
    data_root: PathBuf,
    modules: Vec<ContentModule>,
    /// Lowercased pack name to load-order position.
    module_ids: HashMap<String, ModuleId>,
    palette: MaterialPalette,
}

impl Registry {
    /// Creates an empty registry over `data_root`, the directory module
    /// packs live in.
    pub fn new(types: TypeRegistry, data_root: impl Into<PathBuf>) -> Self {
        Registry {
            types,
            data_root: data_root.into(),
            modules: Vec::new(),
            module_ids: HashMap::new(),
            palette: MaterialPalette::new(),
        }
    }

    /// The type registry content is built against.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Directory module packs are loaded from.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Loaded modules in load order.
    pub fn modules(&self) -> &[ContentModule] {
        &self.modules
    }

    /// Number of loaded modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Module at `id`, if loaded.
    pub fn get_module(&self, id: ModuleId) -> Option<&ContentModule> {
        self.modules.get(id.0)
    }

    /// Finds a module by pack name, case-insensitively.
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.module_ids.get(&name.to_ascii_lowercase()).copied()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads the module pack `pack_name` from the data root.
    ///
    /// Reads `<data_root>/<pack_name>/Index.ini`, then every loose `.ini`
    /// file in the pack folder in name order if the index asked for a folder
    /// scan. The new module lands at the end of the load order.
    pub fn load_module(&mut self, pack_name: &str) -> anyhow::Result<ModuleId> {
        let key = pack_name.to_ascii_lowercase();
        if self.module_ids.contains_key(&key) {
            bail!("module \"{}\" is already loaded", pack_name);
        }
        let id = ModuleId(self.modules.len());
        let pack_dir = self.data_root.join(pack_name);
        let index_path = pack_dir.join(INDEX_FILE);
        info!(module = %pack_name, path = %index_path.display(), "loading content module");

        let mut module = ContentModule::new(pack_name, id);
        let mut stream = TextReader::open(&index_path)?
            .with_data_root(&self.data_root)
            .with_module(id);
        read_module_contents(
            &self.types,
            &mut self.palette,
            &self.modules,
            &mut module,
            &mut stream,
        )?;

        if module.scan_folder_contents() {
            for file in loose_content_files(&pack_dir)? {
                debug!(module = %pack_name, file = %file.display(), "reading loose content file");
                let mut stream = TextReader::open(&file)?
                    .with_data_root(&self.data_root)
                    .with_module(id);
                read_module_contents(
                    &self.types,
                    &mut self.palette,
                    &self.modules,
                    &mut module,
                    &mut stream,
                )?;
            }
        }

        info!(
            module = %pack_name,
            presets = module.preset_count(),
            groups = module.groups().len(),
            "content module loaded"
        );
        self.module_ids.insert(key, id);
        self.modules.push(module);
        Ok(id)
    }

    /// Loads a module from an already-open property stream.
    ///
    /// Same semantics as [`load_module`](Registry::load_module) minus the
    /// folder scan, which only applies to packs on disk.
    pub fn load_module_from(
        &mut self,
        pack_name: &str,
        stream: &mut dyn PropertyStream,
    ) -> anyhow::Result<ModuleId> {
        let key = pack_name.to_ascii_lowercase();
        if self.module_ids.contains_key(&key) {
            bail!("module \"{}\" is already loaded", pack_name);
        }
        let id = ModuleId(self.modules.len());
        let mut module = ContentModule::new(pack_name, id);
        read_module_contents(
            &self.types,
            &mut self.palette,
            &self.modules,
            &mut module,
            stream,
        )?;
        self.module_ids.insert(key, id);
        self.modules.push(module);
        Ok(id)
    }

    /// Registers a preset with one loaded module. See
    /// [`ContentModule::add_preset`] for the collision rules.
    pub fn add_preset(
        &mut self,
        module: ModuleId,
        preset: &mut dyn Preset,
        overwrite_allowed: bool,
        origin_file: &Path,
    ) -> anyhow::Result<bool> {
        if module.0 >= self.modules.len() {
            bail!("unknown module id {}", module.0);
        }
        self.modules[module.0].add_preset(preset, &self.types, overwrite_allowed, origin_file)
    }

    /// Re-reads the file a preset was defined in, overwriting in place.
    ///
    /// Every preset defined in that file is refreshed; instances handed out
    /// earlier keep their identity and see the new data.
    pub fn reload_preset(
        &mut self,
        type_name: &str,
        preset_name: &str,
        which: ModuleId,
    ) -> anyhow::Result<()> {
        if which.0 >= self.modules.len() {
            bail!("unknown module id {}", which.0);
        }
        let location = self.modules[which.0]
            .data_location_of(type_name, preset_name)
            .map(Path::to_path_buf)
            .with_context(|| {
                format!(
                    "no definition of {} \"{}\" in module \"{}\"",
                    type_name,
                    preset_name,
                    self.modules[which.0].file_name()
                )
            })?;
        info!(
            type_name = type_name,
            name = %preset_name,
            path = %location.display(),
            "reloading preset definition"
        );
        let (earlier, rest) = self.modules.split_at_mut(which.0);
        let module = &mut rest[0];
        let mut stream = TextReader::open(&location)?
            .with_data_root(&self.data_root)
            .with_module(which)
            .with_overwrite(true);
        read_module_contents(&self.types, &mut self.palette, earlier, module, &mut stream)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Finds a preset by exact type and name.
    ///
    /// A `Module/Name` path pins the search to that module. Otherwise `which`
    /// selects one module, or `None` searches every module in load order and
    /// the first match wins.
    pub fn get_preset(
        &self,
        type_name: &str,
        preset_name: &str,
        which: Option<ModuleId>,
    ) -> Option<&dyn Preset> {
        if let Some((module_name, rest)) = preset_name.split_once('/') {
            let id = self.find_module(module_name)?;
            return self.modules[id.0].get_preset(type_name, rest);
        }
        match which {
            Some(id) => self.get_module(id)?.get_preset(type_name, preset_name),
            None => self
                .modules
                .iter()
                .find_map(|module| module.get_preset(type_name, preset_name)),
        }
    }

    /// All presets of a type across the module space.
    ///
    /// `space` of `Some(id)` restricts results to modules loaded at or before
    /// `id`; `None` means everything.
    pub fn get_all_of_type(&self, type_name: &str, space: Option<ModuleId>) -> Vec<&dyn Preset> {
        let mut found = Vec::new();
        for module in self.modules_in_space(space) {
            found.extend(module.get_all_of_type(type_name));
        }
        found
    }

    /// All presets of a type carrying a group tag across the module space.
    pub fn get_all_of_group(
        &self,
        group: &str,
        type_name: &str,
        space: Option<ModuleId>,
    ) -> Vec<&dyn Preset> {
        let mut found = Vec::new();
        for module in self.modules_in_space(space) {
            found.extend(module.get_all_of_group(group, type_name));
        }
        found
    }

    /// One random preset of the group, biased by each preset's random weight.
    /// Presets with weight 0 are never picked.
    pub fn random_of_group(
        &self,
        group: &str,
        type_name: &str,
        space: Option<ModuleId>,
    ) -> Option<&dyn Preset> {
        let candidates: Vec<&dyn Preset> = self
            .get_all_of_group(group, type_name, space)
            .into_iter()
            .filter(|preset| preset.common().random_weight() > 0)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let total: u32 = candidates
            .iter()
            .map(|preset| preset.common().random_weight())
            .sum();
        let mut roll = rand::thread_rng().gen_range(0..total);
        for preset in candidates {
            let weight = preset.common().random_weight();
            if roll < weight {
                return Some(preset);
            }
            roll -= weight;
        }
        None
    }

    /// Every group tag recorded across all modules, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.groups_in_module_space(None)
    }

    /// Group tags recorded by modules in the space, sorted.
    pub fn groups_in_module_space(&self, space: Option<ModuleId>) -> Vec<String> {
        let mut tags = BTreeSet::new();
        for module in self.modules_in_space(space) {
            tags.extend(module.groups().iter().cloned());
        }
        tags.into_iter().collect()
    }

    /// Records a group tag for a module. Returns whether the module exists.
    pub fn register_group(&mut self, tag: &str, module: ModuleId) -> bool {
        match self.modules.get_mut(module.0) {
            Some(module) => {
                module.register_group(tag);
                true
            }
            None => false,
        }
    }

    /// Records a material id mapping for a module. Returns whether the
    /// declared slot was previously unmapped.
    pub fn add_material_mapping(&mut self, from: u8, to: u8, module: ModuleId) -> bool {
        match self.modules.get_mut(module.0) {
            Some(module) => module.add_material_mapping(from, to),
            None => false,
        }
    }

    /// Module and material currently holding a palette slot.
    pub fn material_slot_owner(&self, slot: u8) -> Option<(ModuleId, &str)> {
        self.palette.owner(slot)
    }

    /// Content file a preset's current definition was read from.
    pub fn data_location_of(
        &self,
        type_name: &str,
        preset_name: &str,
        which: Option<ModuleId>,
    ) -> Option<&Path> {
        if let Some((module_name, rest)) = preset_name.split_once('/') {
            let id = self.find_module(module_name)?;
            return self.modules[id.0].data_location_of(type_name, rest);
        }
        match which {
            Some(id) => self.get_module(id)?.data_location_of(type_name, preset_name),
            None => self
                .modules
                .iter()
                .find_map(|module| module.data_location_of(type_name, preset_name)),
        }
    }

    /// `Module/Name` path of a registered preset, or just the name if it was
    /// never registered with a module.
    pub fn module_and_preset_name(&self, preset: &dyn Preset) -> String {
        match preset
            .common()
            .module()
            .and_then(|id| self.get_module(id))
        {
            Some(module) => format!("{}/{}", module.file_name(), preset.common().preset_name()),
            None => preset.common().preset_name().to_string(),
        }
    }

    fn modules_in_space(&self, space: Option<ModuleId>) -> impl Iterator<Item = &ContentModule> {
        self.modules
            .iter()
            .filter(move |module| space.map_or(true, |bound| module.id() <= bound))
    }
}

impl CopySource for Registry {
    fn find_original(&self, type_name: &str, path: &str) -> Option<&dyn Preset> {
        self.get_preset(type_name, path, None)
    }
}

/// Resolves `CopyOf` references while a module is being read: the module
/// under construction first, then earlier modules in load order.
struct LoadResolver<'a> {
    current: &'a ContentModule,
    earlier: &'a [ContentModule],
}

impl CopySource for LoadResolver<'_> {
    fn find_original(&self, type_name: &str, path: &str) -> Option<&dyn Preset> {
        if let Some((module_name, rest)) = path.split_once('/') {
            if self.current.file_name().eq_ignore_ascii_case(module_name) {
                return self.current.get_preset(type_name, rest);
            }
            return self
                .earlier
                .iter()
                .find(|module| module.file_name().eq_ignore_ascii_case(module_name))?
                .get_preset(type_name, rest);
        }
        self.current.get_preset(type_name, path).or_else(|| {
            self.earlier
                .iter()
                .find_map(|module| module.get_preset(type_name, path))
        })
    }
}

/// Reads one stream of module content into `module`.
///
/// Handles the module metadata properties and dispatches everything else as
/// a preset declaration whose value names the type. Shared by initial
/// loading and reloads; `earlier` is the part of the load order the module
/// may reference.
fn read_module_contents(
    types: &TypeRegistry,
    palette: &mut MaterialPalette,
    earlier: &[ContentModule],
    module: &mut ContentModule,
    stream: &mut dyn PropertyStream,
) -> anyhow::Result<()> {
    while stream.advance()? {
        let name = stream.read_name()?;
        match name.as_str() {
            "" | MODULE_HEADER => continue,
            "ModuleName" => {
                let value = stream.read_value()?;
                module.set_friendly_name(value);
            }
            "Author" => {
                let value = stream.read_value()?;
                module.set_author(value);
            }
            "Description" => {
                let value = stream.read_value()?;
                let text = read_multi_line_text(stream, &value)?;
                module.set_description(text);
            }
            "Version" => {
                let value = stream.read_value()?;
                module.set_version(parse_num(stream, &value)?);
            }
            "ScanFolderContents" => {
                let value = stream.read_value()?;
                module.set_scan_folder_contents(parse_bool(stream, &value)?);
            }
            "IgnoreMissingItems" => {
                let value = stream.read_value()?;
                module.set_ignore_missing_items(parse_bool(stream, &value)?);
            }
            "IconFile" => {
                let value = stream.read_value()?;
                module.set_icon_file(PathBuf::from(value));
            }
            "Require" => {
                let dep = stream.read_value()?;
                let known = module.file_name().eq_ignore_ascii_case(&dep)
                    || earlier
                        .iter()
                        .any(|loaded| loaded.file_name().eq_ignore_ascii_case(&dep));
                if !known {
                    return Err(stream.error(&format!(
                        "\"{}\" requires \"{}\" in order to load",
                        module.file_name(),
                        dep
                    )));
                }
            }
            "AddMaterial" => read_material_declaration(types, palette, earlier, module, stream)?,
            _ => read_preset_declaration(types, earlier, module, stream)?,
        }
    }
    Ok(())
}

/// Reads one preset declaration, `<AnyName> = <TypeName>` with the preset's
/// properties nested underneath, and registers the result with the module.
fn read_preset_declaration(
    types: &TypeRegistry,
    earlier: &[ContentModule],
    module: &mut ContentModule,
    stream: &mut dyn PropertyStream,
) -> anyhow::Result<()> {
    let type_name = stream.read_value()?;
    if !types.is_registered(&type_name) {
        return Err(stream.error(&format!(
            "could not understand preset type \"{}\"",
            type_name
        )));
    }
    // The stream may pop back to an including file once this object ends, so
    // remember where the definition started.
    let origin = stream.file_path().to_path_buf();
    let mut instance = types
        .new_instance(&type_name)
        .map_err(|err| stream.error(&err.to_string()))?;
    {
        let resolver = LoadResolver {
            current: &*module,
            earlier,
        };
        read_preset_from(&mut *instance, stream, &resolver)?;
    }
    module.add_preset(&mut *instance, types, stream.overwrite_allowed(), &origin)?;
    Ok(())
}

/// Reads one material declaration and claims its palette slot, recording a
/// declared-to-actual mapping when the slot it asked for was taken.
fn read_material_declaration(
    types: &TypeRegistry,
    palette: &mut MaterialPalette,
    earlier: &[ContentModule],
    module: &mut ContentModule,
    stream: &mut dyn PropertyStream,
) -> anyhow::Result<()> {
    let type_name = stream.read_value()?;
    if type_name != Material::TYPE_NAME {
        return Err(stream.error(&format!(
            "expected a {} declaration, found \"{}\"",
            Material::TYPE_NAME,
            type_name
        )));
    }
    let origin = stream.file_path().to_path_buf();
    let mut instance = types
        .new_instance(&type_name)
        .map_err(|err| stream.error(&err.to_string()))?;
    {
        let resolver = LoadResolver {
            current: &*module,
            earlier,
        };
        read_preset_from(&mut *instance, stream, &resolver)?;
    }

    let declared = match instance.as_any().downcast_ref::<Material>() {
        Some(material) => material.index(),
        None => bail!("material factory produced a different type"),
    };
    let preset_name = instance.common().preset_name().to_string();
    let actual = palette
        .place(module.id(), &preset_name, declared)
        .map_err(|err| stream.error(&err.to_string()))?;
    if actual != declared {
        let previous = module.get_material_mapping(declared);
        module.add_material_mapping(declared, actual);
        if previous != 0 && previous != actual {
            warn!(
                module = %module.file_name(),
                declared = declared,
                actual = actual,
                "material id was remapped more than once, later mapping wins"
            );
        }
        if let Some(material) = instance.as_any_mut().downcast_mut::<Material>() {
            material.set_index(actual);
        }
    }
    module.add_preset(&mut *instance, types, stream.overwrite_allowed(), &origin)?;
    Ok(())
}

/// Loose `.ini` content files of a pack folder, index excluded, name order.
fn loose_content_files(pack_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(pack_dir)
        .with_context(|| format!("scan pack folder {}", pack_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_ini = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("ini"))
            .unwrap_or(false);
        let is_index = path
            .file_name()
            .map(|name| name.eq_ignore_ascii_case(INDEX_FILE))
            .unwrap_or(false);
        if path.is_file() && is_ini && !is_index {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::descriptor::BASE_TYPE_NAME;
    use crate::preset::PresetCommon;

    #[derive(Debug, Clone, Default)]
    struct Widget {
        common: PresetCommon,
        power: u32,
        range: u32,
    }

    impl Widget {
        fn read_preset_property(
            &mut self,
            name: &str,
            stream: &mut dyn PropertyStream,
            sources: &dyn CopySource,
        ) -> anyhow::Result<()> {
            match name {
                "Power" => {
                    let value = stream.read_value()?;
                    self.power = parse_num(stream, &value)?;
                }
                "Range" => {
                    let value = stream.read_value()?;
                    self.range = parse_num(stream, &value)?;
                }
                _ => crate::preset::read_base_property(self, name, stream, sources)?,
            }
            Ok(())
        }
    }

    crate::impl_preset!(Widget, "Widget");

    fn test_registry() -> Registry {
        let mut types = TypeRegistry::new();
        catalog::install(&mut types).unwrap();
        types
            .register("Widget", BASE_TYPE_NAME, Some(Widget::new_boxed), None)
            .unwrap();
        Registry::new(types, "Data")
    }

    fn load_str(registry: &mut Registry, pack: &str, text: &str) -> anyhow::Result<ModuleId> {
        let mut stream = TextReader::from_str(text);
        registry.load_module_from(pack, &mut stream)
    }

    const BASE_SRC: &str = "\
ContentModule
\tModuleName = Base Content
\tAuthor = Foundry Team
\tVersion = 3
\tDescription = MultiLineText
\t\tAddLine = The standard content set.
\t\tAddLine = Required by everything else.
\tAddWidget = Widget
\t\tPresetName = Alpha
\t\tPower = 5
\t\tAddToGroup = Heavy
\tAddWidget = Widget
\t\tPresetName = Beta
\t\tRange = 7
";

    #[test]
    fn loads_module_metadata_and_presets() {
        let mut registry = test_registry();
        let id = load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();

        let module = registry.get_module(id).unwrap();
        assert_eq!(module.friendly_name(), "Base Content");
        assert_eq!(module.author(), "Foundry Team");
        assert_eq!(module.version(), 3);
        assert_eq!(
            module.description(),
            "The standard content set.\n\nRequired by everything else."
        );
        assert_eq!(module.preset_count(), 2);

        let alpha = registry.get_preset("Widget", "Alpha", None).unwrap();
        assert_eq!(alpha.common().module(), Some(id));
        assert_eq!(alpha.as_any().downcast_ref::<Widget>().unwrap().power, 5);
        assert!(registry.get_preset("Material", "Alpha", None).is_none());
    }

    #[test]
    fn slash_paths_pin_the_module() {
        let mut registry = test_registry();
        load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        load_str(
            &mut registry,
            "Extra.pack",
            "AddWidget = Widget\n\tPresetName = Alpha\n\tPower = 50\n",
        )
        .unwrap();

        let base_alpha = registry.get_preset("Widget", "Base.pack/Alpha", None).unwrap();
        assert_eq!(base_alpha.as_any().downcast_ref::<Widget>().unwrap().power, 5);

        let extra_alpha = registry.get_preset("Widget", "extra.pack/Alpha", None).unwrap();
        assert_eq!(
            extra_alpha.as_any().downcast_ref::<Widget>().unwrap().power,
            50
        );

        assert!(registry.get_preset("Widget", "Missing.pack/Alpha", None).is_none());
        assert_eq!(registry.module_and_preset_name(base_alpha), "Base.pack/Alpha");
    }

    #[test]
    fn plain_lookups_scan_load_order_first_match_wins() {
        let mut registry = test_registry();
        let base = load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        let extra = load_str(
            &mut registry,
            "Extra.pack",
            "AddWidget = Widget\n\tPresetName = Alpha\n\tPower = 50\n",
        )
        .unwrap();

        let found = registry.get_preset("Widget", "Alpha", None).unwrap();
        assert_eq!(found.common().module(), Some(base));

        let found = registry.get_preset("Widget", "Alpha", Some(extra)).unwrap();
        assert_eq!(found.common().module(), Some(extra));

        assert!(registry.get_preset("Widget", "Beta", Some(extra)).is_none());
    }

    #[test]
    fn copy_of_inherits_from_earlier_definitions() {
        let mut registry = test_registry();
        load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        load_str(
            &mut registry,
            "Extra.pack",
            "AddWidget = Widget\n\
             \tCopyOf = Base.pack/Alpha\n\
             \tPresetName = Alpha Plus\n\
             \tRange = 9\n",
        )
        .unwrap();

        let plus = registry.get_preset("Widget", "Alpha Plus", None).unwrap();
        let inner = plus.as_any().downcast_ref::<Widget>().unwrap();
        // Power comes from Alpha, Range was overridden after the copy.
        assert_eq!(inner.power, 5);
        assert_eq!(inner.range, 9);
        assert!(plus.common().is_in_group("Heavy"));
        assert_eq!(plus.common().module(), Some(ModuleId(1)));

        // The source preset is untouched.
        let alpha = registry.get_preset("Widget", "Base.pack/Alpha", None).unwrap();
        assert_eq!(alpha.as_any().downcast_ref::<Widget>().unwrap().range, 0);
    }

    #[test]
    fn copy_of_sees_presets_from_the_same_stream() {
        let mut registry = test_registry();
        load_str(
            &mut registry,
            "Base.pack",
            "AddWidget = Widget\n\
             \tPresetName = Alpha\n\
             \tPower = 5\n\
             AddWidget = Widget\n\
             \tCopyOf = Alpha\n\
             \tPresetName = Alpha Twin\n",
        )
        .unwrap();

        let twin = registry.get_preset("Widget", "Alpha Twin", None).unwrap();
        assert_eq!(twin.as_any().downcast_ref::<Widget>().unwrap().power, 5);
    }

    #[test]
    fn unresolved_copy_of_fails_the_load() {
        let mut registry = test_registry();
        let err = load_str(
            &mut registry,
            "Base.pack",
            "AddWidget = Widget\n\tCopyOf = Nothing There\n\tPresetName = Broken\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"Nothing There\""));
        assert!(err.to_string().contains(":2:"));
        assert_eq!(registry.module_count(), 0);
    }

    #[test]
    fn unknown_type_declarations_fail_the_load() {
        let mut registry = test_registry();
        let err = load_str(
            &mut registry,
            "Base.pack",
            "AddWidget = Doohickey\n\tPresetName = Whatever\n",
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("could not understand preset type \"Doohickey\""));
    }

    #[test]
    fn disallowed_collisions_keep_the_first_definition() {
        let mut registry = test_registry();
        load_str(
            &mut registry,
            "Base.pack",
            "AddWidget = Widget\n\
             \tPresetName = Alpha\n\
             \tPower = 5\n\
             AddWidget = Widget\n\
             \tPresetName = Alpha\n\
             \tPower = 99\n",
        )
        .unwrap();

        let all = registry.get_all_of_type("Widget", None);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].as_any().downcast_ref::<Widget>().unwrap().power, 5);
    }

    #[test]
    fn overwrite_streams_replace_in_place() {
        let mut registry = test_registry();
        load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        let before =
            registry.get_preset("Widget", "Alpha", None).unwrap() as *const dyn Preset as *const ();

        let mut stream = TextReader::from_str(
            "AddWidget = Widget\n\tPresetName = Alpha\n\tPower = 12\n",
        )
        .with_overwrite(true);
        let (earlier, rest) = registry.modules.split_at_mut(0);
        read_module_contents(
            &registry.types,
            &mut registry.palette,
            earlier,
            &mut rest[0],
            &mut stream,
        )
        .unwrap();

        let alpha = registry.get_preset("Widget", "Alpha", None).unwrap();
        assert_eq!(alpha.as_any().downcast_ref::<Widget>().unwrap().power, 12);
        let after = alpha as *const dyn Preset as *const ();
        assert_eq!(before, after);
    }

    #[test]
    fn module_space_bounds_every_query() {
        let mut registry = test_registry();
        let base = load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        load_str(
            &mut registry,
            "Extra.pack",
            "AddWidget = Widget\n\
             \tPresetName = Gamma\n\
             \tAddToGroup = Exotic\n",
        )
        .unwrap();

        assert_eq!(registry.get_all_of_type("Widget", None).len(), 3);
        assert_eq!(registry.get_all_of_type("Widget", Some(base)).len(), 2);

        assert_eq!(registry.get_all_of_group("Heavy", "Widget", None).len(), 1);
        assert!(registry
            .get_all_of_group("Exotic", "Widget", Some(base))
            .is_empty());

        assert_eq!(
            registry.groups(),
            vec!["Exotic".to_string(), "Heavy".to_string()]
        );
        assert_eq!(
            registry.groups_in_module_space(Some(base)),
            vec!["Heavy".to_string()]
        );
    }

    #[test]
    fn require_fails_when_the_dependency_is_not_loaded() {
        let mut registry = test_registry();
        let err = load_str(
            &mut registry,
            "Extra.pack",
            "ContentModule\n\tRequire = Base.pack\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("requires \"Base.pack\""));

        load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        load_str(
            &mut registry,
            "Extra2.pack",
            "ContentModule\n\tRequire = Base.pack\n",
        )
        .unwrap();
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let mut registry = test_registry();
        load_str(&mut registry, "Base.pack", BASE_SRC).unwrap();
        let err = load_str(&mut registry, "base.PACK", "ContentModule\n").unwrap_err();
        assert!(err.to_string().contains("already loaded"));
    }

    #[test]
    fn materials_claim_slots_and_remap_collisions() {
        let mut registry = test_registry();
        let base = load_str(
            &mut registry,
            "Base.pack",
            "AddMaterial = Material\n\
             \tPresetName = Stone\n\
             \tIndex = 40\n\
             \tFriction = 0.8\n",
        )
        .unwrap();
        let extra = load_str(
            &mut registry,
            "Extra.pack",
            "AddMaterial = Material\n\
             \tPresetName = Metal\n\
             \tIndex = 40\n",
        )
        .unwrap();

        assert_eq!(registry.material_slot_owner(40), Some((base, "Stone")));
        assert_eq!(registry.material_slot_owner(41), Some((extra, "Metal")));

        // Base kept its declared id, the collider was shifted and remembers it.
        assert_eq!(registry.get_module(base).unwrap().resolve_material(40), 40);
        assert_eq!(registry.get_module(extra).unwrap().resolve_material(40), 41);

        let metal = registry.get_preset("Material", "Extra.pack/Metal", None).unwrap();
        assert_eq!(metal.as_any().downcast_ref::<Material>().unwrap().index(), 41);
    }

    #[test]
    fn palette_scan_wraps_and_fills_up() {
        let mut palette = MaterialPalette::new();
        for slot in 1..=255u8 {
            let placed = palette
                .place(ModuleId(0), &format!("Mat {}", slot), slot)
                .unwrap();
            assert_eq!(placed, slot);
        }
        let err = palette.place(ModuleId(1), "One Too Many", 7).unwrap_err();
        assert!(err.to_string().contains("palette is full"));
    }

    #[test]
    fn palette_wraps_past_the_top_slot() {
        let mut palette = MaterialPalette::new();
        palette.place(ModuleId(0), "Top", 255).unwrap();
        let placed = palette.place(ModuleId(0), "Wrapped", 255).unwrap();
        assert_eq!(placed, 1);
    }

    #[test]
    fn palette_reuses_the_slot_of_the_same_material() {
        let mut palette = MaterialPalette::new();
        assert_eq!(palette.place(ModuleId(0), "Stone", 40).unwrap(), 40);
        assert_eq!(palette.place(ModuleId(0), "Stone", 40).unwrap(), 40);
        assert_eq!(palette.place(ModuleId(1), "Stone", 40).unwrap(), 41);
    }

    #[test]
    fn zero_material_id_is_rejected() {
        let mut palette = MaterialPalette::new();
        let err = palette.place(ModuleId(0), "Void", 0).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn random_of_group_skips_zero_weights() {
        let mut registry = test_registry();
        load_str(
            &mut registry,
            "Base.pack",
            "AddWidget = Widget\n\
             \tPresetName = Never\n\
             \tAddToGroup = Loot\n\
             \tRandomWeight = 0\n\
             AddWidget = Widget\n\
             \tPresetName = Always\n\
             \tAddToGroup = Loot\n",
        )
        .unwrap();

        for _ in 0..20 {
            let pick = registry.random_of_group("Loot", "Widget", None).unwrap();
            assert_eq!(pick.common().preset_name(), "Always");
        }
        assert!(registry.random_of_group("Empty", "Widget", None).is_none());
    }
}
