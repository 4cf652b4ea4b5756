//! One active material per draw: a flat color tuple written into the
//! context's front-facing material slot on activation.

use crate::gl::{GlContext, MaterialParams};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialData {
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub specular: [f32; 4],
    pub emissive: [f32; 4],
    pub power: f32,
    /// Opaque texture handle carried alongside the colors; binding is the
    /// render-state translator's job, this field is only exposed here.
    pub texture_handle: u32,
}

#[derive(Debug, Default)]
pub struct Material {
    data: MaterialData,
    handle: Option<u32>,
}

impl Material {
    pub fn new() -> Self {
        Material::default()
    }

    pub fn set_material(&mut self, data: &MaterialData) {
        self.data = *data;
    }

    pub fn get_material(&self) -> MaterialData {
        self.data
    }

    pub fn handle(&self) -> Option<u32> {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: u32) {
        self.handle = Some(handle);
    }

    /// Writes the color tuple into the context's front material slot.
    pub fn activate(&self, gl: &mut GlContext) {
        debug!(
            power = self.data.power,
            texture_handle = self.data.texture_handle,
            "activating material"
        );
        gl.set_material(MaterialParams {
            ambient: self.data.ambient,
            diffuse: self.data.diffuse,
            specular: self.data.specular,
            emissive: self.data.emissive,
            shininess: self.data.power,
        });
    }
}
