//! Viewports own the lights that take effect when the viewport is bound,
//! an optional background material, and one of two geometry descriptor
//! shapes. Activation re-activates every owned light in insertion order,
//! which is also the slot-numbering order.

use crate::d3d::{ClearFlags, D3dRect, NEXT_HEAD, NEXT_NEXT, NEXT_TAIL};
use crate::error::D3dError;
use crate::gl::{ClearMask, GlContext, MAX_LIGHTS};
use crate::light::Light;
use crate::material::MaterialData;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, warn};

/// Legacy descriptor: screen rectangle plus homogeneous scale/extent
/// parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportDesc {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

/// Current-generation descriptor: screen rectangle plus a clip volume
/// expressed as a rectangle in camera space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport2Desc {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub clip_x: f32,
    pub clip_y: f32,
    pub clip_width: f32,
    pub clip_height: f32,
    pub min_z: f32,
    pub max_z: f32,
}

/// Exactly one descriptor shape is populated at a time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewportShape {
    Legacy(ViewportDesc),
    Extended(Viewport2Desc),
}

impl ViewportShape {
    /// Screen-mapping parameters consumed by the orthographic setup.
    pub fn dimensions(&self) -> (f32, f32, f32, f32) {
        match self {
            ViewportShape::Legacy(d) => (d.width as f32, d.height as f32, d.min_z, d.max_z),
            ViewportShape::Extended(d) => (d.width as f32, d.height as f32, d.min_z, d.max_z),
        }
    }
}

#[derive(Debug, Default)]
pub struct Viewport {
    lights: Vec<Rc<RefCell<Light>>>,
    shape: Option<ViewportShape>,
    background: Option<u32>,
    bound: bool,
    next_slot: u32,
}

impl Viewport {
    pub fn new() -> Self {
        Viewport::default()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }

    /// Appends a light. While the viewport is bound, the light gets the
    /// next sequential slot and takes effect against the context
    /// immediately; otherwise slot assignment waits for the next
    /// activation.
    pub fn add_light(&mut self, light: &Rc<RefCell<Light>>, gl: Option<&mut GlContext>) {
        self.lights.push(Rc::clone(light));
        if self.bound {
            match gl {
                Some(gl) => {
                    let mut l = light.borrow_mut();
                    self.assign_slot(&mut l);
                    l.activate(gl);
                }
                None => warn!("light added to a bound viewport without a context"),
            }
        }
    }

    /// Unlinks a light. The light's slot is not reused and the context
    /// enable state is left as is.
    pub fn delete_light(&mut self, light: &Rc<RefCell<Light>>) -> Result<(), D3dError> {
        let at = self
            .lights
            .iter()
            .position(|l| Rc::ptr_eq(l, light))
            .ok_or(D3dError::InvalidObject)?;
        self.lights.remove(at);
        Ok(())
    }

    /// Walks the light list: `NEXT_NEXT` yields the entry after `current`,
    /// `NEXT_HEAD` the first entry, `NEXT_TAIL` the last.
    pub fn next_light(
        &self,
        current: Option<&Rc<RefCell<Light>>>,
        flags: u32,
    ) -> Result<Option<Rc<RefCell<Light>>>, D3dError> {
        match flags {
            NEXT_NEXT => {
                let current = current.ok_or(D3dError::InvalidParams)?;
                let at = self
                    .lights
                    .iter()
                    .position(|l| Rc::ptr_eq(l, current))
                    .ok_or(D3dError::InvalidObject)?;
                Ok(self.lights.get(at + 1).cloned())
            }
            NEXT_HEAD => Ok(self.lights.first().cloned()),
            NEXT_TAIL => Ok(self.lights.last().cloned()),
            _ => Err(D3dError::InvalidParams),
        }
    }

    pub fn lights(&self) -> &[Rc<RefCell<Light>>] {
        &self.lights
    }

    pub fn set_viewport(&mut self, desc: &ViewportDesc) {
        self.shape = Some(ViewportShape::Legacy(*desc));
    }

    pub fn set_viewport2(&mut self, desc: &Viewport2Desc) {
        self.shape = Some(ViewportShape::Extended(*desc));
    }

    pub fn shape(&self) -> Option<&ViewportShape> {
        self.shape.as_ref()
    }

    /// Stores the material handle whose diffuse color backs Clear.
    pub fn set_background(&mut self, handle: u32) {
        self.background = Some(handle);
    }

    pub fn background(&self) -> Option<u32> {
        self.background
    }

    /// Clears the full target; the rectangle list is accepted but ignored.
    /// The depth-write mask is forced on around the clear and restored,
    /// since clearing the depth buffer requires write-enable no matter
    /// what the current mask says.
    pub fn clear(
        &self,
        gl: &mut GlContext,
        rects: &[D3dRect],
        flags: ClearFlags,
        background: Option<&MaterialData>,
    ) {
        if !rects.is_empty() {
            debug!(rects = rects.len(), "clear rectangles ignored, clearing full target");
        }
        if let Some(material) = background {
            gl.clear_color(material.diffuse);
        }
        let mut mask = ClearMask::empty();
        if flags.contains(ClearFlags::TARGET) {
            mask |= ClearMask::COLOR;
        }
        if flags.contains(ClearFlags::ZBUFFER) {
            mask |= ClearMask::DEPTH;
        }
        let depth_write = gl.depth_mask_state();
        gl.depth_mask(true);
        gl.clear(mask);
        gl.depth_mask(depth_write);
    }

    /// Re-activates every owned light in list order, assigning slots to
    /// lights that do not have one yet.
    pub fn activate(&mut self, gl: &mut GlContext) {
        for i in 0..self.lights.len() {
            let light = Rc::clone(&self.lights[i]);
            let mut l = light.borrow_mut();
            self.assign_slot(&mut l);
            l.activate(gl);
        }
    }

    fn assign_slot(&mut self, light: &mut Light) {
        if light.slot().is_some() {
            return;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        if slot as usize >= MAX_LIGHTS {
            error!(slot, "out of context light slots, light stays inert");
        }
        light.set_slot(slot);
    }
}
