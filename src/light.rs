//! Lights: a kind-tagged parameter block bound to a numbered context light
//! slot by the owning viewport.
//!
//! Only directional lights actually push parameters into the context (the
//! direction is negated and sent with w = 0 so the lighting equation
//! treats the light as infinitely distant). The other kinds are accepted
//! and stored but stay visually inert, matching the observed behavior of
//! the legacy renderer rather than inventing new math for them.

use crate::d3d::LightKind;
use crate::gl::GlContext;
use tracing::{debug, warn};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LightFlags: u32 {
        const ACTIVE = 0x1;
        const NO_SPECULAR = 0x2;
    }
}

/// Flat light parameter block, the newer-generation field set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightData {
    pub kind: LightKind,
    pub color: [f32; 4],
    pub position: [f32; 3],
    pub direction: [f32; 3],
    pub range: f32,
    pub falloff: f32,
    pub attenuation: [f32; 3],
    pub theta: f32,
    pub phi: f32,
    pub flags: LightFlags,
}

impl Default for LightData {
    fn default() -> Self {
        LightData {
            kind: LightKind::Point,
            color: [0.0, 0.0, 0.0, 1.0],
            position: [0.0, 0.0, 0.0],
            direction: [0.0, 0.0, 1.0],
            range: 0.0,
            falloff: 0.0,
            attenuation: [1.0, 0.0, 0.0],
            theta: 0.0,
            phi: 0.0,
            flags: LightFlags::empty(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Light {
    data: LightData,
    active: bool,
    slot: Option<u32>,
}

impl Light {
    pub fn new() -> Self {
        Light::default()
    }

    /// Copies the parameter block in. While the light is active the new
    /// parameters are pushed to the context immediately, without toggling
    /// the enable state.
    pub fn set_light(&mut self, data: &LightData, gl: Option<&mut GlContext>) {
        self.data = *data;
        if self.active {
            match gl {
                Some(gl) => self.update(gl),
                None => warn!("active light updated without a context"),
            }
        }
    }

    pub fn get_light(&self) -> LightData {
        self.data
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn slot(&self) -> Option<u32> {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: u32) {
        self.slot = Some(slot);
    }

    /// Pushes the parameters into the assigned slot and enables it. Once
    /// enabled, a light stays enabled in the context until the context
    /// itself goes away; there is no reachable disable operation.
    pub(crate) fn activate(&mut self, gl: &mut GlContext) {
        self.update(gl);
        if !self.active {
            if let Some(slot) = self.slot {
                gl.enable_light(slot as usize);
            }
            self.active = true;
        }
    }

    fn update(&mut self, gl: &mut GlContext) {
        let Some(slot) = self.slot else {
            warn!("light activated before a slot was assigned");
            return;
        };
        let slot = slot as usize;
        match self.data.kind {
            LightKind::Directional => {
                let d = self.data.direction;
                gl.light_diffuse(slot, self.data.color);
                // w = 0 marks the light as infinitely distant; the negated
                // direction points toward it.
                gl.light_position(slot, [-d[0], -d[1], -d[2], 0.0]);
            }
            kind => {
                debug!(?kind, slot, "light kind not implemented, light stays inert");
            }
        }
    }
}
