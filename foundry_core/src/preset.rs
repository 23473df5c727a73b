//! Preset identity and the shared attribute block.
//!
//! # Features
//! - Attribute block every preset type embeds (name, description, groups,
//!   origin module, random weight)
//! - Original-vs-working-copy tracking
//! - Property-driven reading shared by all preset types, including `CopyOf`
//!   inheritance from already-loaded presets

use std::any::Any;

use crate::module::ModuleId;
use crate::stream::{parse_num, read_multi_line_text, PropertyStream};

/// Name carried by presets that were never given one.
pub const UNNAMED_PRESET: &str = "None";

/// Group every named preset belongs to.
pub const GROUP_ALL: &str = "All";

/// Wildcard group that matches every preset.
pub const GROUP_ANY: &str = "Any";

/// Group name that matches nothing.
pub const GROUP_NONE: &str = "None";

/// Random weight given to presets that never declare one.
pub const DEFAULT_RANDOM_WEIGHT: u32 = 100;

/// Attributes shared by every preset type.
///
/// Concrete types embed one of these in a `common` field and expose it
/// through [`Preset::common`].
#[derive(Debug, Clone)]
pub struct PresetCommon {
    /// Instance name, [`UNNAMED_PRESET`] until one is given.
    preset_name: String,
    /// Free-form description text.
    description: String,
    /// Group tags, sorted and de-duplicated. Always contains [`GROUP_ALL`].
    groups: Vec<String>,
    /// Whether this instance is an original preset rather than a working copy.
    is_original: bool,
    /// Module the preset was defined in, once registered.
    module: Option<ModuleId>,
    /// Selection weight for random group picks, `0..=100`.
    random_weight: u32,
}

impl PresetCommon {
    /// Creates the attribute block of a fresh, unnamed working copy.
    pub fn new() -> Self {
        PresetCommon {
            preset_name: UNNAMED_PRESET.to_string(),
            description: String::new(),
            groups: vec![GROUP_ALL.to_string()],
            is_original: false,
            module: None,
            random_weight: DEFAULT_RANDOM_WEIGHT,
        }
    }

    /// Instance name, [`UNNAMED_PRESET`] if none was given.
    pub fn preset_name(&self) -> &str {
        &self.preset_name
    }

    /// Whether the preset carries a real name.
    pub fn is_named(&self) -> bool {
        !self.preset_name.is_empty() && self.preset_name != UNNAMED_PRESET
    }

    /// Names the preset and marks it as an original.
    pub fn set_preset_name(&mut self, name: &str) {
        self.preset_name = name.to_string();
        self.is_original = true;
    }

    /// Renames without touching the original flag. Cosmetic renames only.
    pub fn rename_in_place(&mut self, name: &str) {
        self.preset_name = name.to_string();
    }

    /// Description text, possibly multi-line.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replaces the description text.
    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = text.into();
    }

    /// Group tags, sorted.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Adds a group tag, keeping the list sorted and de-duplicated.
    pub fn add_to_group(&mut self, tag: &str) {
        if let Err(pos) = self.groups.binary_search_by(|g| g.as_str().cmp(tag)) {
            self.groups.insert(pos, tag.to_string());
        }
    }

    /// Whether the preset belongs to `tag`.
    ///
    /// [`GROUP_ANY`] and [`GROUP_ALL`] match every preset, [`GROUP_NONE`]
    /// matches none.
    pub fn is_in_group(&self, tag: &str) -> bool {
        match tag {
            GROUP_ANY | GROUP_ALL => true,
            GROUP_NONE => false,
            _ => self.groups.binary_search_by(|g| g.as_str().cmp(tag)).is_ok(),
        }
    }

    /// Whether this instance is an original preset.
    pub fn is_original(&self) -> bool {
        self.is_original
    }

    /// Sets the original-preset flag.
    pub fn set_original(&mut self, original: bool) {
        self.is_original = original;
    }

    /// Module the preset was defined in.
    pub fn module(&self) -> Option<ModuleId> {
        self.module
    }

    /// Records the defining module.
    pub fn set_module(&mut self, module: Option<ModuleId>) {
        self.module = module;
    }

    /// Moves the preset to another module.
    ///
    /// Re-marks it as an original when the module actually changes, since it
    /// then counts as a new definition there. Returns whether it changed.
    pub fn migrate_to_module(&mut self, new_module: ModuleId) -> bool {
        if self.module == Some(new_module) {
            return false;
        }
        self.is_original = true;
        self.module = Some(new_module);
        true
    }

    /// Selection weight for random group picks.
    pub fn random_weight(&self) -> u32 {
        self.random_weight
    }

    /// Sets the selection weight, clamped to `0..=100`.
    pub fn set_random_weight(&mut self, weight: u32) {
        self.random_weight = weight.min(100);
    }
}

impl Default for PresetCommon {
    fn default() -> Self {
        PresetCommon::new()
    }
}

/// Resolves `CopyOf` references while a preset is being read.
///
/// `path` is either a plain preset name or `Module/Name`. Only presets of the
/// exact `type_name` qualify.
pub trait CopySource {
    /// Finds the original preset a `CopyOf` reference points at.
    fn find_original(&self, type_name: &str, path: &str) -> Option<&dyn Preset>;
}

/// A [`CopySource`] with nothing in it. Every `CopyOf` fails to resolve.
pub struct NoSources;

impl CopySource for NoSources {
    fn find_original(&self, _type_name: &str, _path: &str) -> Option<&dyn Preset> {
        None
    }
}

/// A data-driven preset instance.
///
/// Implemented for concrete types via [`impl_preset!`](crate::impl_preset),
/// which wires the boilerplate around an embedded [`PresetCommon`] and a
/// hand-written `read_preset_property` method.
pub trait Preset: Any + Send + Sync {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    /// Shared attribute block.
    fn common(&self) -> &PresetCommon;

    /// Shared attribute block, mutable.
    fn common_mut(&mut self) -> &mut PresetCommon;

    /// Returns the instance to its freshly constructed state.
    fn reset(&mut self);

    /// Copies all state from `source`, which must be the same concrete type.
    ///
    /// The result is a working copy: every attribute carries over, including
    /// the defining module, but the original flag is cleared.
    fn copy_from(&mut self, source: &dyn Preset) -> anyhow::Result<()>;

    /// Applies one named property from the stream.
    ///
    /// Unrecognized property names are an error; a typo in a definition file
    /// aborts the read rather than silently dropping data.
    fn read_property(
        &mut self,
        name: &str,
        stream: &mut dyn PropertyStream,
        sources: &dyn CopySource,
    ) -> anyhow::Result<()>;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Reads all properties of the current stream object into `preset`.
///
/// The caller has already consumed the declaration that names the type;
/// this loops over the nested properties until the object ends. Properties
/// with empty names are skipped so stray blank continuations are tolerated.
pub fn read_preset_from(
    preset: &mut dyn Preset,
    stream: &mut dyn PropertyStream,
    sources: &dyn CopySource,
) -> anyhow::Result<()> {
    while stream.advance()? {
        let name = stream.read_name()?;
        if name.is_empty() {
            continue;
        }
        preset.read_property(&name, stream, sources)?;
    }
    Ok(())
}

/// Handles the properties every preset type understands.
///
/// Concrete `read_preset_property` implementations fall through to this for
/// anything they don't recognize themselves.
pub fn read_base_property(
    preset: &mut dyn Preset,
    name: &str,
    stream: &mut dyn PropertyStream,
    sources: &dyn CopySource,
) -> anyhow::Result<()> {
    match name {
        "CopyOf" => {
            let path = stream.read_value()?;
            match sources.find_original(preset.type_name(), &path) {
                Some(original) => preset.copy_from(original)?,
                None => {
                    return Err(stream.error(&format!(
                        "could not find the preset \"{}\" to copy from",
                        path
                    )))
                }
            }
        }
        "PresetName" | "InstanceName" => {
            let name = stream.read_value()?;
            preset.common_mut().set_preset_name(&name);
        }
        "Description" => {
            let value = stream.read_value()?;
            let text = read_multi_line_text(stream, &value)?;
            preset.common_mut().set_description(text);
        }
        "AddToGroup" => {
            let tag = stream.read_value()?;
            preset.common_mut().add_to_group(&tag);
        }
        "RandomWeight" => {
            let value = stream.read_value()?;
            let weight: i64 = parse_num(stream, &value)?;
            preset.common_mut().set_random_weight(weight.clamp(0, 100) as u32);
        }
        _ => {
            stream.read_value()?;
            return Err(stream.error(&format!("could not match property \"{}\"", name)));
        }
    }
    Ok(())
}

/// Implements [`Preset`] for a concrete type.
///
/// The type must be `Clone + Default`, embed a `common: PresetCommon` field,
/// and provide a `read_preset_property` method that handles its own
/// properties and falls through to [`read_base_property`] for the rest.
#[macro_export]
macro_rules! impl_preset {
    ($ty:ident, $name:literal) => {
        impl $ty {
            /// Registered type name.
            pub const TYPE_NAME: &'static str = $name;

            /// Factory for the type registry.
            pub fn new_boxed() -> ::std::boxed::Box<dyn $crate::preset::Preset> {
                ::std::boxed::Box::new(<$ty>::default())
            }
        }

        impl $crate::preset::Preset for $ty {
            fn type_name(&self) -> &'static str {
                Self::TYPE_NAME
            }

            fn common(&self) -> &$crate::preset::PresetCommon {
                &self.common
            }

            fn common_mut(&mut self) -> &mut $crate::preset::PresetCommon {
                &mut self.common
            }

            fn reset(&mut self) {
                *self = <$ty>::default();
            }

            fn copy_from(
                &mut self,
                source: &dyn $crate::preset::Preset,
            ) -> ::anyhow::Result<()> {
                match source.as_any().downcast_ref::<$ty>() {
                    Some(source) => {
                        *self = source.clone();
                        self.common.set_original(false);
                        Ok(())
                    }
                    None => ::anyhow::bail!(
                        "cannot copy {} state from a {} instance",
                        Self::TYPE_NAME,
                        source.type_name()
                    ),
                }
            }

            fn read_property(
                &mut self,
                name: &str,
                stream: &mut dyn $crate::stream::PropertyStream,
                sources: &dyn $crate::preset::CopySource,
            ) -> ::anyhow::Result<()> {
                self.read_preset_property(name, stream, sources)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TextReader;

    #[derive(Debug, Clone, Default)]
    struct TestProp {
        common: PresetCommon,
        power: u32,
    }

    impl TestProp {
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
                _ => read_base_property(self, name, stream, sources)?,
            }
            Ok(())
        }
    }

    crate::impl_preset!(TestProp, "TestProp");

    #[derive(Debug, Clone, Default)]
    struct OtherProp {
        common: PresetCommon,
    }

    impl OtherProp {
        fn read_preset_property(
            &mut self,
            name: &str,
            stream: &mut dyn PropertyStream,
            sources: &dyn CopySource,
        ) -> anyhow::Result<()> {
            read_base_property(self, name, stream, sources)
        }
    }

    crate::impl_preset!(OtherProp, "OtherProp");

    #[test]
    fn fresh_common_is_an_unnamed_working_copy() {
        let common = PresetCommon::new();
        assert_eq!(common.preset_name(), UNNAMED_PRESET);
        assert!(!common.is_named());
        assert!(!common.is_original());
        assert_eq!(common.groups(), &[GROUP_ALL.to_string()]);
        assert_eq!(common.random_weight(), DEFAULT_RANDOM_WEIGHT);
        assert_eq!(common.module(), None);
    }

    #[test]
    fn naming_marks_the_instance_original() {
        let mut common = PresetCommon::new();
        common.set_preset_name("Sturdy Crate");
        assert!(common.is_named());
        assert!(common.is_original());

        // A cosmetic rename must not touch the flag once cleared.
        common.set_original(false);
        common.rename_in_place("Sturdier Crate");
        assert_eq!(common.preset_name(), "Sturdier Crate");
        assert!(!common.is_original());
    }

    #[test]
    fn groups_stay_sorted_and_unique() {
        let mut common = PresetCommon::new();
        common.add_to_group("Props");
        common.add_to_group("Ammo");
        common.add_to_group("Props");
        assert_eq!(
            common.groups(),
            &["All".to_string(), "Ammo".to_string(), "Props".to_string()]
        );

        assert!(common.is_in_group("Props"));
        assert!(common.is_in_group(GROUP_ALL));
        assert!(common.is_in_group(GROUP_ANY));
        assert!(!common.is_in_group(GROUP_NONE));
        assert!(!common.is_in_group("Weapons"));
    }

    #[test]
    fn migrating_to_a_new_module_re_marks_original() {
        let mut common = PresetCommon::new();
        common.set_module(Some(ModuleId(0)));
        common.set_original(false);

        assert!(!common.migrate_to_module(ModuleId(0)));
        assert!(!common.is_original());

        assert!(common.migrate_to_module(ModuleId(2)));
        assert!(common.is_original());
        assert_eq!(common.module(), Some(ModuleId(2)));
    }

    #[test]
    fn random_weight_is_clamped() {
        let mut common = PresetCommon::new();
        common.set_random_weight(250);
        assert_eq!(common.random_weight(), 100);
        common.set_random_weight(30);
        assert_eq!(common.random_weight(), 30);
    }

    #[test]
    fn reads_base_properties_from_a_stream() {
        let src = "PresetName = Test Dummy\n\
                   Description = MultiLineText\n\
                   \tAddLine = First paragraph.\n\
                   \tAddLine = Second paragraph.\n\
                   AddToGroup = Props\n\
                   RandomWeight = 150\n\
                   Power = 7\n";
        let mut reader = TextReader::from_str(src);
        let mut prop = TestProp::default();
        read_preset_from(&mut prop, &mut reader, &NoSources).unwrap();

        assert_eq!(prop.common.preset_name(), "Test Dummy");
        assert_eq!(
            prop.common.description(),
            "First paragraph.\n\nSecond paragraph."
        );
        assert!(prop.common.is_in_group("Props"));
        assert_eq!(prop.common.random_weight(), 100);
        assert_eq!(prop.power, 7);
        assert!(prop.common.is_original());
    }

    #[test]
    fn unknown_property_aborts_the_read() {
        let src = "PresetName = Test Dummy\nPwoer = 7\n";
        let mut reader = TextReader::from_str(src);
        let mut prop = TestProp::default();
        let err = read_preset_from(&mut prop, &mut reader, &NoSources).unwrap_err();
        assert!(err.to_string().contains("could not match property \"Pwoer\""));
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn unresolved_copy_of_aborts_the_read() {
        let src = "CopyOf = Missing Thing\nPresetName = Test Dummy\n";
        let mut reader = TextReader::from_str(src);
        let mut prop = TestProp::default();
        let err = read_preset_from(&mut prop, &mut reader, &NoSources).unwrap_err();
        assert!(err.to_string().contains("\"Missing Thing\""));
    }

    #[test]
    fn copy_from_rejects_a_different_concrete_type() {
        let mut target = TestProp::default();
        let source = OtherProp::default();
        let err = target.copy_from(&source).unwrap_err();
        assert!(err.to_string().contains("cannot copy TestProp state"));
    }

    #[test]
    fn copy_from_clears_the_original_flag_but_keeps_the_module() {
        let mut source = TestProp::default();
        source.common.set_preset_name("Origin");
        source.common.set_module(Some(ModuleId(3)));
        source.power = 42;

        let mut copy = TestProp::default();
        copy.copy_from(&source).unwrap();
        assert_eq!(copy.common.preset_name(), "Origin");
        assert_eq!(copy.common.module(), Some(ModuleId(3)));
        assert_eq!(copy.power, 42);
        assert!(!copy.common.is_original());
        assert!(source.common.is_original());
    }
}
