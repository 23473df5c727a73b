//! Demo prop types loaded from content packs.
//!
//! These stand in for a game's real content types. Games register their own
//! trees the same way through [`TypeRegistry::register`].

use foundry_core::descriptor::{TypeRegistry, BASE_TYPE_NAME};
use foundry_core::impl_preset;
use foundry_core::preset::{read_base_property, CopySource, PresetCommon};
use foundry_core::stream::{parse_num, PropertyStream};

/// A placeable physical prop.
#[derive(Debug, Clone)]
pub struct Prop {
    common: PresetCommon,
    mass: f32,
    scale: f32,
}

impl Default for Prop {
    fn default() -> Self {
        Prop {
            common: PresetCommon::new(),
            mass: 0.0,
            scale: 1.0,
        }
    }
}

impl Prop {
    /// Mass in kilograms.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Uniform render scale.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    fn read_preset_property(
        &mut self,
        name: &str,
        stream: &mut dyn PropertyStream,
        sources: &dyn CopySource,
    ) -> anyhow::Result<()> {
        match name {
            "Mass" => {
                let value = stream.read_value()?;
                self.mass = parse_num(stream, &value)?;
            }
            "Scale" => {
                let value = stream.read_value()?;
                self.scale = parse_num(stream, &value)?;
            }
            _ => read_base_property(self, name, stream, sources)?,
        }
        Ok(())
    }
}

impl_preset!(Prop, "Prop");

/// A prop with armor plating that shrugs off light damage.
#[derive(Debug, Clone)]
pub struct HeavyProp {
    common: PresetCommon,
    mass: f32,
    scale: f32,
    plating: f32,
}

impl Default for HeavyProp {
    fn default() -> Self {
        HeavyProp {
            common: PresetCommon::new(),
            mass: 0.0,
            scale: 1.0,
            plating: 0.0,
        }
    }
}

impl HeavyProp {
    /// Mass in kilograms.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Uniform render scale.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Plating thickness in millimeters.
    pub fn plating(&self) -> f32 {
        self.plating
    }

    fn read_preset_property(
        &mut self,
        name: &str,
        stream: &mut dyn PropertyStream,
        sources: &dyn CopySource,
    ) -> anyhow::Result<()> {
        match name {
            "Mass" => {
                let value = stream.read_value()?;
                self.mass = parse_num(stream, &value)?;
            }
            "Scale" => {
                let value = stream.read_value()?;
                self.scale = parse_num(stream, &value)?;
            }
            "Plating" => {
                let value = stream.read_value()?;
                self.plating = parse_num(stream, &value)?;
            }
            _ => read_base_property(self, name, stream, sources)?,
        }
        Ok(())
    }
}

impl_preset!(HeavyProp, "HeavyProp");

/// Named collection of sound file paths.
#[derive(Debug, Clone, Default)]
pub struct SoundSet {
    common: PresetCommon,
    files: Vec<String>,
}

impl SoundSet {
    /// Sound file paths in declaration order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    fn read_preset_property(
        &mut self,
        name: &str,
        stream: &mut dyn PropertyStream,
        sources: &dyn CopySource,
    ) -> anyhow::Result<()> {
        match name {
            "AddFile" => {
                let value = stream.read_value()?;
                self.files.push(value);
            }
            _ => read_base_property(self, name, stream, sources)?,
        }
        Ok(())
    }
}

impl_preset!(SoundSet, "SoundSet");

/// Registers the demo types. Safe to call more than once.
pub fn install(types: &mut TypeRegistry) -> anyhow::Result<()> {
    if types.is_registered(Prop::TYPE_NAME) {
        return Ok(());
    }
    types.register(Prop::TYPE_NAME, BASE_TYPE_NAME, Some(Prop::new_boxed), None)?;
    types.register(
        HeavyProp::TYPE_NAME,
        Prop::TYPE_NAME,
        Some(HeavyProp::new_boxed),
        None,
    )?;
    types.register(
        SoundSet::TYPE_NAME,
        BASE_TYPE_NAME,
        Some(SoundSet::new_boxed),
        None,
    )?;
    Ok(())
}
