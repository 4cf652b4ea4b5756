//! The immediate-mode device: owns the rendering context, the viewport
//! list, the handle tables the instruction stream resolves against, and
//! the one vertex-emission routine every draw path funnels through.

use crate::d3d::{
    ClearFlags, D3dRect, PrimitiveType, TransformStateType, TriangleRecord, NEXT_HEAD, NEXT_NEXT,
    NEXT_TAIL,
};
use crate::error::D3dError;
use crate::gl::{Cap, GlContext, Topology};
use crate::material::Material;
use crate::math::Matrix4;
use crate::state::{self, RenderStateRecord};
use crate::surface::Surface;
use crate::texture::Texture;
use crate::vertex::{LitVertex, TlVertex, Vertex, VertexType, VERTEX_STRIDE};
use crate::viewport::Viewport;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, warn};

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

/// Below this reciprocal-homogeneous-weight a fully-transformed vertex is
/// treated as already in normalized device coordinates and the perspective
/// divide is skipped.
pub(crate) const RHW_EPSILON: f32 = 1e-8;

/// Screen mapping used when a fully-transformed draw arrives with no
/// viewport bound.
const FALLBACK_WIDTH: f32 = 640.0;
const FALLBACK_HEIGHT: f32 = 480.0;
const FALLBACK_MIN_Z: f32 = -10.0;
const FALLBACK_MAX_Z: f32 = 10.0;

/// World/view/projection triple re-loaded when a draw transitions away
/// from the fully-transformed vertex path.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TransformSet {
    pub(crate) world: Matrix4,
    pub(crate) view: Matrix4,
    pub(crate) proj: Matrix4,
}

/// Where the emission loop gets vertex indices from: a running count, an
/// index array, or triangle records from an instruction stream.
pub(crate) enum IndexSource<'a> {
    Sequential(usize),
    Indices(&'a [u16]),
    Triangles(&'a [TriangleRecord]),
}

pub struct Device {
    id: u32,
    pub(crate) gl: GlContext,
    target: Rc<RefCell<Surface>>,
    viewports: Vec<Rc<RefCell<Viewport>>>,
    current_viewport: Option<Rc<RefCell<Viewport>>>,
    pub(crate) materials: Vec<Rc<RefCell<Material>>>,
    pub(crate) textures: Vec<Rc<RefCell<Texture>>>,
    pub(crate) matrices: Vec<Option<Matrix4>>,
    pub(crate) render_state: RenderStateRecord,
    transforms: [Matrix4; 3],
    last_vertex_type: Option<VertexType>,
    in_scene: bool,
}

impl Device {
    /// Creates a device rendering to `target`. Every surface reachable
    /// through the target's attachment chain is tagged with the device so
    /// any member of a flip chain can act as the render target.
    pub fn new(target: Rc<RefCell<Surface>>) -> Result<Self, D3dError> {
        let (width, height) = {
            let s = target.borrow();
            (s.width(), s.height())
        };
        if width == 0 || height == 0 {
            return Err(D3dError::InvalidParams);
        }
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        tag_chain(&target, id, &mut Vec::new());
        Ok(Device {
            id,
            gl: GlContext::new(width, height),
            target,
            viewports: Vec::new(),
            current_viewport: None,
            materials: Vec::new(),
            textures: Vec::new(),
            matrices: Vec::new(),
            render_state: RenderStateRecord::default(),
            transforms: [Matrix4::IDENTITY; 3],
            last_vertex_type: None,
            in_scene: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn gl(&self) -> &GlContext {
        &self.gl
    }

    pub fn gl_mut(&mut self) -> &mut GlContext {
        &mut self.gl
    }

    // ---- viewport list ----

    pub fn add_viewport(&mut self, viewport: &Rc<RefCell<Viewport>>) {
        self.viewports.push(Rc::clone(viewport));
    }

    pub fn delete_viewport(&mut self, viewport: &Rc<RefCell<Viewport>>) -> Result<(), D3dError> {
        let at = self
            .viewports
            .iter()
            .position(|v| Rc::ptr_eq(v, viewport))
            .ok_or(D3dError::InvalidObject)?;
        if let Some(current) = &self.current_viewport {
            if Rc::ptr_eq(current, viewport) {
                viewport.borrow_mut().set_bound(false);
                self.current_viewport = None;
            }
        }
        self.viewports.remove(at);
        Ok(())
    }

    pub fn next_viewport(
        &self,
        current: Option<&Rc<RefCell<Viewport>>>,
        flags: u32,
    ) -> Result<Option<Rc<RefCell<Viewport>>>, D3dError> {
        match flags {
            NEXT_NEXT => {
                let current = current.ok_or(D3dError::InvalidParams)?;
                let at = self
                    .viewports
                    .iter()
                    .position(|v| Rc::ptr_eq(v, current))
                    .ok_or(D3dError::InvalidObject)?;
                Ok(self.viewports.get(at + 1).cloned())
            }
            NEXT_HEAD => Ok(self.viewports.first().cloned()),
            NEXT_TAIL => Ok(self.viewports.last().cloned()),
            _ => Err(D3dError::InvalidParams),
        }
    }

    /// Binds a viewport as current; binding activates its lights.
    pub fn set_current_viewport(&mut self, viewport: &Rc<RefCell<Viewport>>) -> Result<(), D3dError> {
        if !self.viewports.iter().any(|v| Rc::ptr_eq(v, viewport)) {
            return Err(D3dError::InvalidObject);
        }
        if let Some(old) = self.current_viewport.take() {
            old.borrow_mut().set_bound(false);
        }
        {
            let mut vp = viewport.borrow_mut();
            vp.set_bound(true);
            vp.activate(&mut self.gl);
        }
        self.current_viewport = Some(Rc::clone(viewport));
        Ok(())
    }

    pub fn current_viewport(&self) -> Option<Rc<RefCell<Viewport>>> {
        self.current_viewport.clone()
    }

    // ---- render target ----

    pub fn render_target(&self) -> Rc<RefCell<Surface>> {
        Rc::clone(&self.target)
    }

    pub fn set_render_target(&mut self, _surface: &Rc<RefCell<Surface>>) {
        warn!("set_render_target not implemented on the legacy path");
    }

    // ---- handle tables ----

    /// Registers a material and returns its opaque handle. Idempotent for
    /// a material already registered with this device.
    pub fn material_handle(&mut self, material: &Rc<RefCell<Material>>) -> u32 {
        if let Some(at) = self.materials.iter().position(|m| Rc::ptr_eq(m, material)) {
            return at as u32 + 1;
        }
        self.materials.push(Rc::clone(material));
        let handle = self.materials.len() as u32;
        material.borrow_mut().set_handle(handle);
        handle
    }

    /// Registers a texture, allocating its context object on first use,
    /// and returns its opaque handle. Idempotent.
    pub fn texture_handle(&mut self, texture: &Rc<RefCell<Texture>>) -> u32 {
        let handle = match self.textures.iter().position(|t| Rc::ptr_eq(t, texture)) {
            Some(at) => at as u32 + 1,
            None => {
                self.textures.push(Rc::clone(texture));
                self.textures.len() as u32
            }
        };
        texture.borrow_mut().ensure_allocated(&mut self.gl);
        handle
    }

    // ---- matrix arena ----

    pub fn create_matrix(&mut self) -> u32 {
        self.matrices.push(Some(Matrix4::IDENTITY));
        self.matrices.len() as u32
    }

    pub fn set_matrix(&mut self, handle: u32, matrix: &Matrix4) -> Result<(), D3dError> {
        match self.matrices.get_mut(handle.wrapping_sub(1) as usize) {
            Some(slot) if slot.is_some() => {
                *slot = Some(*matrix);
                Ok(())
            }
            _ => Err(D3dError::UnknownMatrixHandle(handle)),
        }
    }

    pub fn get_matrix(&self, handle: u32) -> Result<Matrix4, D3dError> {
        self.matrices
            .get(handle.wrapping_sub(1) as usize)
            .copied()
            .flatten()
            .ok_or(D3dError::UnknownMatrixHandle(handle))
    }

    pub fn delete_matrix(&mut self, handle: u32) -> Result<(), D3dError> {
        match self.matrices.get_mut(handle.wrapping_sub(1) as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(D3dError::UnknownMatrixHandle(handle)),
        }
    }

    /// Handle resolution for the interpreter: zero and stale handles fall
    /// back to identity with a log, never an error.
    pub(crate) fn resolve_matrix(&self, handle: u32) -> Matrix4 {
        if handle == 0 {
            return Matrix4::IDENTITY;
        }
        match self.matrices.get(handle as usize - 1).copied().flatten() {
            Some(m) => m,
            None => {
                debug!(handle, "unknown matrix handle, using identity");
                Matrix4::IDENTITY
            }
        }
    }

    // ---- state ----

    pub fn set_render_state(&mut self, kind: u32, value: u32) {
        state::apply_render_state(
            &mut self.gl,
            &self.textures,
            &mut self.render_state,
            kind,
            value,
        );
    }

    pub fn render_state_record(&self) -> &RenderStateRecord {
        &self.render_state
    }

    /// Stores a transform and applies it to the context: the world matrix
    /// loads the modelview stack, view and projection combine on the
    /// projection stack.
    pub fn set_transform(&mut self, kind: TransformStateType, matrix: &Matrix4) {
        self.transforms[kind as usize - 1] = *matrix;
        match kind {
            TransformStateType::World => {
                self.gl.matrix_mode(crate::gl::MatrixMode::ModelView);
                self.gl.load_matrix(matrix);
            }
            TransformStateType::View | TransformStateType::Projection => {
                self.gl.matrix_mode(crate::gl::MatrixMode::Projection);
                self.gl
                    .load_matrix(&self.transforms[TransformStateType::Projection as usize - 1]);
                let view = self.transforms[TransformStateType::View as usize - 1];
                self.gl.mult_matrix(&view);
            }
        }
    }

    pub fn get_transform(&self, kind: TransformStateType) -> Matrix4 {
        self.transforms[kind as usize - 1]
    }

    // ---- scene bracket ----

    pub fn begin_scene(&mut self) -> Result<(), D3dError> {
        if self.in_scene {
            return Err(D3dError::SceneInProgress);
        }
        self.in_scene = true;
        Ok(())
    }

    /// Ends the frame and copies the rendered buffer into the target
    /// surface's pixel buffer.
    pub fn end_scene(&mut self) -> Result<(), D3dError> {
        if !self.in_scene {
            return Err(D3dError::NoSceneInProgress);
        }
        self.in_scene = false;
        let mut target = self.target.borrow_mut();
        pack_readback(&mut target, self.gl.read_pixels());
        Ok(())
    }

    // ---- clear ----

    /// Clears through the current viewport, using its background
    /// material's diffuse color when one is set.
    pub fn clear(&mut self, rects: &[D3dRect], flags: ClearFlags) -> Result<(), D3dError> {
        let viewport = self.current_viewport.clone().ok_or(D3dError::InvalidObject)?;
        let vp = viewport.borrow();
        let background = vp
            .background()
            .and_then(|handle| handle.checked_sub(1))
            .and_then(|at| self.materials.get(at as usize))
            .map(|m| m.borrow().get_material());
        vp.clear(&mut self.gl, rects, flags, background.as_ref());
        Ok(())
    }

    // ---- drawing ----

    pub fn draw_primitive(
        &mut self,
        primitive: PrimitiveType,
        vertex_type: VertexType,
        vertices: &[u8],
    ) -> Result<(), D3dError> {
        if vertices.len() % VERTEX_STRIDE != 0 {
            return Err(D3dError::InvalidParams);
        }
        let count = vertices.len() / VERTEX_STRIDE;
        let transforms = self.device_transforms();
        self.emit_primitives(
            topology(primitive),
            vertex_type,
            vertices,
            IndexSource::Sequential(count),
            &transforms,
        );
        Ok(())
    }

    pub fn draw_indexed_primitive(
        &mut self,
        primitive: PrimitiveType,
        vertex_type: VertexType,
        vertices: &[u8],
        indices: &[u16],
    ) -> Result<(), D3dError> {
        if vertices.len() % VERTEX_STRIDE != 0 {
            return Err(D3dError::InvalidParams);
        }
        let transforms = self.device_transforms();
        self.emit_primitives(
            topology(primitive),
            vertex_type,
            vertices,
            IndexSource::Indices(indices),
            &transforms,
        );
        Ok(())
    }

    pub(crate) fn device_transforms(&self) -> TransformSet {
        TransformSet {
            world: self.transforms[0],
            view: self.transforms[1],
            proj: self.transforms[2],
        }
    }

    /// The one vertex-emission routine. Handles the per-vertex-type state
    /// transition (lighting toggles, the orthographic screen mapping for
    /// fully-transformed vertices, matrix restoration when leaving that
    /// path), then streams vertices from `source` through the context.
    pub(crate) fn emit_primitives(
        &mut self,
        topology: Topology,
        vertex_type: VertexType,
        vertices: &[u8],
        source: IndexSource<'_>,
        transforms: &TransformSet,
    ) {
        let count = vertices.len() / VERTEX_STRIDE;

        if self.last_vertex_type != Some(vertex_type) {
            if self.last_vertex_type == Some(VertexType::TlVertex) {
                // Leaving the screen-space path: put the real transforms
                // back.
                self.gl.matrix_mode(crate::gl::MatrixMode::ModelView);
                self.gl.load_matrix(&transforms.world);
                self.gl.matrix_mode(crate::gl::MatrixMode::Projection);
                self.gl.load_matrix(&transforms.proj);
                self.gl.mult_matrix(&transforms.view);
            }
            match vertex_type {
                VertexType::Vertex => self.gl.enable(Cap::Lighting),
                VertexType::LitVertex => self.gl.disable(Cap::Lighting),
                VertexType::TlVertex => {
                    self.gl.disable(Cap::Lighting);
                    let (width, height, min_z, max_z) = match self
                        .current_viewport
                        .as_ref()
                        .and_then(|vp| vp.borrow().shape().map(|s| s.dimensions()))
                    {
                        Some(dims) => dims,
                        None => {
                            error!("no current viewport, using fallback screen mapping");
                            (FALLBACK_WIDTH, FALLBACK_HEIGHT, FALLBACK_MIN_Z, FALLBACK_MAX_Z)
                        }
                    };
                    self.gl.matrix_mode(crate::gl::MatrixMode::ModelView);
                    self.gl.load_identity();
                    self.gl.matrix_mode(crate::gl::MatrixMode::Projection);
                    self.gl.load_identity();
                    // (0, 0) is the top-left corner and Z is negated.
                    self.gl.ortho(0.0, width, height, 0.0, -min_z, -max_z);
                }
            }
            self.last_vertex_type = Some(vertex_type);
        }

        let indices: Vec<usize> = match &source {
            IndexSource::Sequential(n) => (0..*n).collect(),
            IndexSource::Indices(idx) => {
                let out: Vec<usize> = idx.iter().map(|&i| i as usize).collect();
                if out.iter().any(|&i| i >= count) {
                    warn!("vertex index out of range, draw skipped");
                    return;
                }
                out
            }
            IndexSource::Triangles(records) => {
                let mut out = Vec::with_capacity(records.len() * 3);
                for r in *records {
                    let tri = [r.v1 as usize, r.v2 as usize, r.v3 as usize];
                    if tri.iter().any(|&i| i >= count) {
                        debug!(v1 = r.v1, v2 = r.v2, v3 = r.v3, "triangle index out of range, skipped");
                        continue;
                    }
                    out.extend_from_slice(&tri);
                }
                out
            }
        };

        self.gl.begin(topology);
        for at in indices {
            let bytes = &vertices[at * VERTEX_STRIDE..(at + 1) * VERTEX_STRIDE];
            match vertex_type {
                VertexType::Vertex => {
                    let v: Vertex = bytemuck::pod_read_unaligned(bytes);
                    self.gl.normal3f([v.nx, v.ny, v.nz]);
                    self.gl.vertex3f(v.x, v.y, v.z);
                }
                VertexType::LitVertex => {
                    let v: LitVertex = bytemuck::pod_read_unaligned(bytes);
                    self.gl.color4f(v.color.to_rgba_f());
                    self.gl.vertex3f(v.x, v.y, v.z);
                }
                VertexType::TlVertex => {
                    let v: TlVertex = bytemuck::pod_read_unaligned(bytes);
                    self.gl.color4f(v.color.to_rgba_f());
                    self.gl.tex_coord2f(v.tu, v.tv);
                    if v.rhw < RHW_EPSILON {
                        // Already in normalized device coordinates.
                        self.gl.vertex3f(v.sx, v.sy, v.sz);
                    } else {
                        self.gl
                            .vertex4f(v.sx / v.rhw, v.sy / v.rhw, v.sz / v.rhw, 1.0 / v.rhw);
                    }
                }
            }
        }
        self.gl.end();
    }
}

fn topology(primitive: PrimitiveType) -> Topology {
    match primitive {
        PrimitiveType::PointList => Topology::Points,
        PrimitiveType::LineList => Topology::Lines,
        PrimitiveType::LineStrip => Topology::LineStrip,
        PrimitiveType::TriangleList => Topology::Triangles,
        PrimitiveType::TriangleStrip => Topology::TriangleStrip,
        PrimitiveType::TriangleFan => Topology::TriangleFan,
    }
}

fn tag_chain(surface: &Rc<RefCell<Surface>>, id: u32, visited: &mut Vec<*const ()>) {
    let ptr = Rc::as_ptr(surface) as *const ();
    if visited.contains(&ptr) {
        return;
    }
    visited.push(ptr);
    let attachments: Vec<_> = {
        let mut s = surface.borrow_mut();
        s.set_device_id(id);
        s.attachments().to_vec()
    };
    for attached in attachments {
        tag_chain(&attached, id, visited);
    }
}

/// Copies the context's RGBA8 color buffer into the target surface: a
/// 5-6-5 downsample for 16-bit targets, a mask-directed pack for 32-bit
/// targets, otherwise a logged no-op.
fn pack_readback(surface: &mut Surface, rgba: &[u8]) {
    let format = *surface.format();
    match (format.bit_count, format.r_mask) {
        (16, 0xF800) => {
            for (dst, src) in surface
                .pixels_mut()
                .chunks_exact_mut(2)
                .zip(rgba.chunks_exact(4))
            {
                let packed = (((src[0] as u16) >> 3) << 11)
                    | (((src[1] as u16) >> 2) << 5)
                    | ((src[2] as u16) >> 3);
                dst.copy_from_slice(&packed.to_le_bytes());
            }
        }
        (32, 0x00FF_0000) => {
            for (dst, src) in surface
                .pixels_mut()
                .chunks_exact_mut(4)
                .zip(rgba.chunks_exact(4))
            {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
                dst[3] = src[3];
            }
        }
        (bits, r_mask) => {
            warn!(bits, r_mask, "readback into this surface format not implemented");
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("viewports", &self.viewports.len())
            .field("materials", &self.materials.len())
            .field("textures", &self.textures.len())
            .field("in_scene", &self.in_scene)
            .finish()
    }
}
