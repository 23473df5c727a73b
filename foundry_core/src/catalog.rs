//! Built-in preset types.
//!
//! Only [`Material`] lives here; games register their own types on top
//! through [`TypeRegistry::register`].

use crate::descriptor::{TypeRegistry, BASE_TYPE_NAME};
use crate::preset::{read_base_property, CopySource, PresetCommon};
use crate::stream::{parse_num, PropertyStream};

/// A surface material definition.
///
/// Materials live in the engine-wide 256-slot palette; the declared `Index`
/// may be shifted at load time when another module already took it, in which
/// case the owning module records a mapping.
#[derive(Debug, Clone, Default)]
pub struct Material {
    common: PresetCommon,
    index: u8,
    friction: f32,
    bounce: f32,
}

impl Material {
    /// Palette slot this material ended up in.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u8) {
        self.index = index;
    }

    /// Surface friction coefficient.
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Restitution on impact.
    pub fn bounce(&self) -> f32 {
        self.bounce
    }

    fn read_preset_property(
        &mut self,
        name: &str,
        stream: &mut dyn PropertyStream,
        sources: &dyn CopySource,
    ) -> anyhow::Result<()> {
        match name {
            "Index" => {
                let value = stream.read_value()?;
                self.index = parse_num(stream, &value)?;
            }
            "Friction" => {
                let value = stream.read_value()?;
                self.friction = parse_num(stream, &value)?;
            }
            "Bounce" => {
                let value = stream.read_value()?;
                self.bounce = parse_num(stream, &value)?;
            }
            _ => read_base_property(self, name, stream, sources)?,
        }
        Ok(())
    }
}

crate::impl_preset!(Material, "Material");

/// Registers the built-in types. Safe to call more than once.
pub fn install(types: &mut TypeRegistry) -> anyhow::Result<()> {
    if types.is_registered(Material::TYPE_NAME) {
        return Ok(());
    }
    types.register(
        Material::TYPE_NAME,
        BASE_TYPE_NAME,
        Some(Material::new_boxed),
        None,
    )?;
    Ok(())
}
