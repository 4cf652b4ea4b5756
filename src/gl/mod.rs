//! A deterministic software rendering context with the fixed-function
//! surface the translation layer drives: capability toggles, blend/depth/
//! cull/shade state, modelview and projection matrix stacks, eight numbered
//! light slots, one front material, named texture objects, and
//! begin/end-style vertex emission feeding a software rasterizer.
//!
//! This is **not** a general GL implementation. It models exactly the
//! entry points the pipeline uses, and keeps every piece of state readable
//! back so frames and state transitions are observable in tests.

mod raster;

use crate::math::Matrix4;
use tracing::warn;

/// Numbered light slots available in the context.
pub const MAX_LIGHTS: usize = 8;

/// Maximum matrix stack depth per mode.
const MAX_STACK_DEPTH: usize = 32;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct CapBits: u32 {
        const BLEND = 0x01;
        const CULL_FACE = 0x02;
        const DEPTH_TEST = 0x04;
        const DITHER = 0x08;
        const LIGHTING = 0x10;
        const TEXTURE_2D = 0x20;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cap {
    Blend,
    CullFace,
    DepthTest,
    Dither,
    Lighting,
    Texture2D,
}

impl Cap {
    fn bit(self) -> CapBits {
        match self {
            Cap::Blend => CapBits::BLEND,
            Cap::CullFace => CapBits::CULL_FACE,
            Cap::DepthTest => CapBits::DEPTH_TEST,
            Cap::Dither => CapBits::DITHER,
            Cap::Lighting => CapBits::LIGHTING,
            Cap::Texture2D => CapBits::TEXTURE_2D,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixMode {
    ModelView,
    Projection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadeModel {
    Flat,
    Smooth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winding {
    Cw,
    Ccw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TexFilter {
    #[default]
    Nearest,
    Linear,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
    }
}

/// Front-facing material slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub emissive: [f32; 4],
    pub shininess: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        MaterialParams {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            emissive: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
        }
    }
}

/// One numbered light slot. A position with w == 0 is a direction toward
/// an infinitely distant light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    pub diffuse: [f32; 4],
    pub position: [f32; 4],
}

impl Default for LightParams {
    fn default() -> Self {
        LightParams {
            diffuse: [0.0, 0.0, 0.0, 1.0],
            position: [0.0, 0.0, 1.0, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct GlLight {
    enabled: bool,
    params: LightParams,
}

/// Source pixel layouts accepted by `tex_image_2d`. Multi-byte values are
/// little-endian in the byte slice.
#[derive(Debug)]
pub enum TexImage<'a> {
    /// 8-bit indices resolved through a caller-built 256-entry RGBA table.
    Indexed {
        lut: &'a [[u8; 4]; 256],
        indices: &'a [u8],
    },
    Rgb332(&'a [u8]),
    Rgb565(&'a [u8]),
    /// Red in the top five bits, alpha in bit zero.
    Rgba5551(&'a [u8]),
    /// Alpha in the top bit.
    Argb1555(&'a [u8]),
    Argb4444(&'a [u8]),
    /// Three bytes per pixel, blue first.
    Rgb888(&'a [u8]),
    /// Four bytes per pixel, blue first, high byte ignored.
    Xrgb8888(&'a [u8]),
    /// Four bytes per pixel, blue first, alpha last.
    Argb8888(&'a [u8]),
}

#[derive(Debug)]
pub(crate) struct TextureObject {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) rgba: Vec<u8>,
    pub(crate) mag_filter: TexFilter,
    pub(crate) min_filter: TexFilter,
}

/// Counters for observable context activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlStats {
    pub blend_func_applies: u32,
    pub draw_calls: u32,
    pub triangles_rasterized: u64,
    pub texture_uploads: u32,
    pub clears: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EmitVertex {
    pub(crate) pos: [f32; 4],
    pub(crate) color: [f32; 4],
    pub(crate) normal: [f32; 3],
    pub(crate) texcoord: [f32; 2],
}

pub struct GlContext {
    width: u32,
    height: u32,
    pub(crate) color_buf: Vec<u8>,
    pub(crate) depth_buf: Vec<f32>,

    caps: CapBits,
    clear_color: [f32; 4],
    clear_depth: f32,
    depth_write: bool,
    depth_fn: DepthFunc,
    blend: (BlendFactor, BlendFactor),
    shade: ShadeModel,
    front: Winding,

    matrix_mode: MatrixMode,
    modelview: Vec<Matrix4>,
    projection: Vec<Matrix4>,

    lights: [GlLight; MAX_LIGHTS],
    ambient_model: [f32; 4],
    material: MaterialParams,

    pub(crate) textures: std::collections::HashMap<u32, TextureObject>,
    next_texture_name: u32,
    binding: u32,

    in_batch: Option<Topology>,
    current_color: [f32; 4],
    current_normal: [f32; 3],
    current_texcoord: [f32; 2],
    pending: Vec<EmitVertex>,

    stats: GlStats,
}

impl GlContext {
    pub fn new(width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        GlContext {
            width,
            height,
            color_buf: vec![0; pixels * 4],
            depth_buf: vec![1.0; pixels],
            caps: CapBits::DITHER,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            clear_depth: 1.0,
            depth_write: true,
            depth_fn: DepthFunc::Less,
            blend: (BlendFactor::One, BlendFactor::Zero),
            shade: ShadeModel::Smooth,
            front: Winding::Ccw,
            matrix_mode: MatrixMode::ModelView,
            modelview: vec![Matrix4::IDENTITY],
            projection: vec![Matrix4::IDENTITY],
            lights: Default::default(),
            ambient_model: [0.2, 0.2, 0.2, 1.0],
            material: MaterialParams::default(),
            textures: std::collections::HashMap::new(),
            next_texture_name: 1,
            binding: 0,
            in_batch: None,
            current_color: [1.0, 1.0, 1.0, 1.0],
            current_normal: [0.0, 0.0, 1.0],
            current_texcoord: [0.0, 0.0],
            pending: Vec::new(),
            stats: GlStats::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stats(&self) -> &GlStats {
        &self.stats
    }

    // ---- capabilities ----

    pub fn enable(&mut self, cap: Cap) {
        self.caps.insert(cap.bit());
    }

    pub fn disable(&mut self, cap: Cap) {
        self.caps.remove(cap.bit());
    }

    pub fn is_enabled(&self, cap: Cap) -> bool {
        self.caps.contains(cap.bit())
    }

    // ---- fragment state ----

    pub fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend = (src, dst);
        self.stats.blend_func_applies += 1;
    }

    pub fn blend_state(&self) -> (BlendFactor, BlendFactor) {
        self.blend
    }

    pub fn depth_func(&mut self, func: DepthFunc) {
        self.depth_fn = func;
    }

    pub fn depth_func_state(&self) -> DepthFunc {
        self.depth_fn
    }

    pub fn depth_mask(&mut self, write: bool) {
        self.depth_write = write;
    }

    pub fn depth_mask_state(&self) -> bool {
        self.depth_write
    }

    pub fn shade_model(&mut self, model: ShadeModel) {
        self.shade = model;
    }

    pub fn shade_model_state(&self) -> ShadeModel {
        self.shade
    }

    pub fn front_face(&mut self, winding: Winding) {
        self.front = winding;
    }

    pub fn front_face_state(&self) -> Winding {
        self.front
    }

    // ---- clear ----

    pub fn clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    pub fn clear(&mut self, mask: ClearMask) {
        if mask.contains(ClearMask::COLOR) {
            let rgba = [
                (self.clear_color[0].clamp(0.0, 1.0) * 255.0) as u8,
                (self.clear_color[1].clamp(0.0, 1.0) * 255.0) as u8,
                (self.clear_color[2].clamp(0.0, 1.0) * 255.0) as u8,
                (self.clear_color[3].clamp(0.0, 1.0) * 255.0) as u8,
            ];
            for px in self.color_buf.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        if mask.contains(ClearMask::DEPTH) && self.depth_write {
            self.depth_buf.fill(self.clear_depth);
        }
        self.stats.clears += 1;
    }

    // ---- matrix stacks ----

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.matrix_mode = mode;
    }

    fn stack_mut(&mut self) -> &mut Vec<Matrix4> {
        match self.matrix_mode {
            MatrixMode::ModelView => &mut self.modelview,
            MatrixMode::Projection => &mut self.projection,
        }
    }

    pub fn load_identity(&mut self) {
        self.load_matrix(&Matrix4::IDENTITY);
    }

    pub fn load_matrix(&mut self, m: &Matrix4) {
        let stack = self.stack_mut();
        *stack.last_mut().expect("matrix stack is never empty") = *m;
    }

    /// Composes `m` under the current top so that `m` applies first:
    /// a `load(a); mult(b); mult(c)` sequence transforms `v` as
    /// `v * c * b * a`.
    pub fn mult_matrix(&mut self, m: &Matrix4) {
        let stack = self.stack_mut();
        let top = stack.last_mut().expect("matrix stack is never empty");
        *top = *m * *top;
    }

    pub fn push_matrix(&mut self) {
        let stack = self.stack_mut();
        if stack.len() >= MAX_STACK_DEPTH {
            warn!("matrix stack overflow, push ignored");
            return;
        }
        let top = *stack.last().expect("matrix stack is never empty");
        stack.push(top);
    }

    pub fn pop_matrix(&mut self) {
        let stack = self.stack_mut();
        if stack.len() == 1 {
            warn!("matrix stack underflow, pop ignored");
            return;
        }
        stack.pop();
    }

    pub fn current_matrix(&self, mode: MatrixMode) -> Matrix4 {
        match mode {
            MatrixMode::ModelView => *self.modelview.last().expect("stack never empty"),
            MatrixMode::Projection => *self.projection.last().expect("stack never empty"),
        }
    }

    /// Multiplies an orthographic projection under the current matrix,
    /// mapping `(left, top)`..`(right, bottom)` to the full clip volume.
    #[allow(clippy::too_many_arguments)]
    pub fn ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.mult_matrix(&Matrix4::ortho(left, right, bottom, top, near, far));
    }

    // ---- lighting ----

    pub fn light_diffuse(&mut self, slot: usize, diffuse: [f32; 4]) {
        if slot >= MAX_LIGHTS {
            warn!(slot, "light slot out of range");
            return;
        }
        self.lights[slot].params.diffuse = diffuse;
    }

    pub fn light_position(&mut self, slot: usize, position: [f32; 4]) {
        if slot >= MAX_LIGHTS {
            warn!(slot, "light slot out of range");
            return;
        }
        self.lights[slot].params.position = position;
    }

    pub fn enable_light(&mut self, slot: usize) {
        if slot >= MAX_LIGHTS {
            warn!(slot, "light slot out of range");
            return;
        }
        self.lights[slot].enabled = true;
    }

    pub fn disable_light(&mut self, slot: usize) {
        if slot >= MAX_LIGHTS {
            warn!(slot, "light slot out of range");
            return;
        }
        self.lights[slot].enabled = false;
    }

    pub fn light_enabled(&self, slot: usize) -> bool {
        slot < MAX_LIGHTS && self.lights[slot].enabled
    }

    pub fn light_params(&self, slot: usize) -> Option<LightParams> {
        (slot < MAX_LIGHTS).then(|| self.lights[slot].params)
    }

    pub fn light_model_ambient(&mut self, ambient: [f32; 4]) {
        self.ambient_model = ambient;
    }

    pub fn light_model_ambient_state(&self) -> [f32; 4] {
        self.ambient_model
    }

    pub fn set_material(&mut self, material: MaterialParams) {
        self.material = material;
    }

    pub fn material(&self) -> &MaterialParams {
        &self.material
    }

    // ---- texture objects ----

    pub fn gen_texture(&mut self) -> u32 {
        let name = self.next_texture_name;
        self.next_texture_name += 1;
        self.textures.insert(
            name,
            TextureObject {
                width: 0,
                height: 0,
                rgba: Vec::new(),
                mag_filter: TexFilter::default(),
                min_filter: TexFilter::default(),
            },
        );
        name
    }

    /// Binds a texture object. Binding resets the object's filters to
    /// context defaults; callers re-apply their tracked filter settings
    /// after every bind.
    pub fn bind_texture(&mut self, name: u32) {
        self.binding = name;
        if name == 0 {
            return;
        }
        match self.textures.get_mut(&name) {
            Some(obj) => {
                obj.mag_filter = TexFilter::default();
                obj.min_filter = TexFilter::default();
            }
            None => warn!(name, "binding unknown texture object"),
        }
    }

    pub fn texture_binding(&self) -> u32 {
        self.binding
    }

    pub fn tex_filter(&mut self, mag: TexFilter, min: TexFilter) {
        let name = self.binding;
        match self.textures.get_mut(&name) {
            Some(obj) if name != 0 => {
                obj.mag_filter = mag;
                obj.min_filter = min;
            }
            _ => warn!(name, "setting filters with no texture bound"),
        }
    }

    pub fn texture_filters(&self, name: u32) -> Option<(TexFilter, TexFilter)> {
        self.textures.get(&name).map(|o| (o.mag_filter, o.min_filter))
    }

    /// Uploads an image into the bound texture object, converting to the
    /// context's internal RGBA8 layout.
    pub fn tex_image_2d(&mut self, width: u32, height: u32, image: TexImage<'_>) {
        let name = self.binding;
        let Some(obj) = self.textures.get_mut(&name).filter(|_| name != 0) else {
            warn!(name, "uploading with no texture bound");
            return;
        };
        let count = width as usize * height as usize;
        let mut rgba = vec![0u8; count * 4];
        match image {
            TexImage::Indexed { lut, indices } => {
                for (dst, &idx) in rgba.chunks_exact_mut(4).zip(indices.iter().take(count)) {
                    dst.copy_from_slice(&lut[idx as usize]);
                }
            }
            TexImage::Rgb332(data) => {
                for (dst, &v) in rgba.chunks_exact_mut(4).zip(data.iter().take(count)) {
                    dst[0] = expand3((v >> 5) & 0x7);
                    dst[1] = expand3((v >> 2) & 0x7);
                    dst[2] = expand2(v & 0x3);
                    dst[3] = 0xFF;
                }
            }
            TexImage::Rgb565(data) => {
                for (dst, v) in rgba.chunks_exact_mut(4).zip(u16_le(data).take(count)) {
                    dst[0] = expand5(((v >> 11) & 0x1F) as u8);
                    dst[1] = expand6(((v >> 5) & 0x3F) as u8);
                    dst[2] = expand5((v & 0x1F) as u8);
                    dst[3] = 0xFF;
                }
            }
            TexImage::Rgba5551(data) => {
                for (dst, v) in rgba.chunks_exact_mut(4).zip(u16_le(data).take(count)) {
                    dst[0] = expand5(((v >> 11) & 0x1F) as u8);
                    dst[1] = expand5(((v >> 6) & 0x1F) as u8);
                    dst[2] = expand5(((v >> 1) & 0x1F) as u8);
                    dst[3] = if v & 0x1 != 0 { 0xFF } else { 0x00 };
                }
            }
            TexImage::Argb1555(data) => {
                for (dst, v) in rgba.chunks_exact_mut(4).zip(u16_le(data).take(count)) {
                    dst[0] = expand5(((v >> 10) & 0x1F) as u8);
                    dst[1] = expand5(((v >> 5) & 0x1F) as u8);
                    dst[2] = expand5((v & 0x1F) as u8);
                    dst[3] = if v & 0x8000 != 0 { 0xFF } else { 0x00 };
                }
            }
            TexImage::Argb4444(data) => {
                for (dst, v) in rgba.chunks_exact_mut(4).zip(u16_le(data).take(count)) {
                    dst[0] = expand4(((v >> 8) & 0xF) as u8);
                    dst[1] = expand4(((v >> 4) & 0xF) as u8);
                    dst[2] = expand4((v & 0xF) as u8);
                    dst[3] = expand4(((v >> 12) & 0xF) as u8);
                }
            }
            TexImage::Rgb888(data) => {
                for (dst, src) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(3).take(count)) {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                    dst[3] = 0xFF;
                }
            }
            TexImage::Xrgb8888(data) => {
                for (dst, src) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(4).take(count)) {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                    dst[3] = 0xFF;
                }
            }
            TexImage::Argb8888(data) => {
                for (dst, src) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(4).take(count)) {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                    dst[3] = src[3];
                }
            }
        }
        obj.width = width;
        obj.height = height;
        obj.rgba = rgba;
        self.stats.texture_uploads += 1;
    }

    /// Reads back the bound-object-independent image of a texture object.
    pub fn texture_image(&self, name: u32) -> Option<(u32, u32, &[u8])> {
        self.textures
            .get(&name)
            .map(|o| (o.width, o.height, o.rgba.as_slice()))
    }

    // ---- vertex emission ----

    pub fn begin(&mut self, topology: Topology) {
        if self.in_batch.is_some() {
            warn!("begin inside an open batch, previous batch dropped");
            self.pending.clear();
        }
        self.in_batch = Some(topology);
    }

    pub fn color4f(&mut self, color: [f32; 4]) {
        self.current_color = color;
    }

    pub fn normal3f(&mut self, normal: [f32; 3]) {
        self.current_normal = normal;
    }

    pub fn tex_coord2f(&mut self, u: f32, v: f32) {
        self.current_texcoord = [u, v];
    }

    pub fn vertex3f(&mut self, x: f32, y: f32, z: f32) {
        self.vertex4f(x, y, z, 1.0);
    }

    pub fn vertex4f(&mut self, x: f32, y: f32, z: f32, w: f32) {
        if self.in_batch.is_none() {
            warn!("vertex emitted outside begin/end, dropped");
            return;
        }
        self.pending.push(EmitVertex {
            pos: [x, y, z, w],
            color: self.current_color,
            normal: self.current_normal,
            texcoord: self.current_texcoord,
        });
    }

    /// Transforms, lights and rasterizes the batched vertices.
    pub fn end(&mut self) {
        let Some(topology) = self.in_batch.take() else {
            warn!("end without begin");
            return;
        };
        self.flush_batch(topology);
    }

    /// Reads back the color buffer: RGBA8, rows top to bottom.
    pub fn read_pixels(&self) -> &[u8] {
        &self.color_buf
    }

    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.depth_buf[(y * self.width + x) as usize])
    }

    pub fn pixel_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = ((y * self.width + x) * 4) as usize;
        Some([
            self.color_buf[at],
            self.color_buf[at + 1],
            self.color_buf[at + 2],
            self.color_buf[at + 3],
        ])
    }

    pub(crate) fn raster_inputs(&self) -> RasterInputs {
        RasterInputs {
            depth_test: self.caps.contains(CapBits::DEPTH_TEST),
            depth_write: self.depth_write,
            depth_fn: self.depth_fn,
            blend_on: self.caps.contains(CapBits::BLEND),
            blend: self.blend,
            shade: self.shade,
            cull_on: self.caps.contains(CapBits::CULL_FACE),
            front: self.front,
            texturing: self.caps.contains(CapBits::TEXTURE_2D),
            bound: self.binding,
            lighting: self.caps.contains(CapBits::LIGHTING),
            ambient_model: self.ambient_model,
            material: self.material,
            lights: self.lights_snapshot(),
        }
    }

    fn lights_snapshot(&self) -> [(bool, LightParams); MAX_LIGHTS] {
        let mut out = [(false, LightParams::default()); MAX_LIGHTS];
        for (dst, light) in out.iter_mut().zip(self.lights.iter()) {
            *dst = (light.enabled, light.params);
        }
        out
    }
}

pub(crate) struct RasterInputs {
    pub(crate) depth_test: bool,
    pub(crate) depth_write: bool,
    pub(crate) depth_fn: DepthFunc,
    pub(crate) blend_on: bool,
    pub(crate) blend: (BlendFactor, BlendFactor),
    pub(crate) shade: ShadeModel,
    pub(crate) cull_on: bool,
    pub(crate) front: Winding,
    pub(crate) texturing: bool,
    pub(crate) bound: u32,
    pub(crate) lighting: bool,
    pub(crate) ambient_model: [f32; 4],
    pub(crate) material: MaterialParams,
    pub(crate) lights: [(bool, LightParams); MAX_LIGHTS],
}

fn u16_le(data: &[u8]) -> impl Iterator<Item = u16> + '_ {
    data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]))
}

fn expand2(v: u8) -> u8 {
    v * 85
}

fn expand3(v: u8) -> u8 {
    (v << 5) | (v << 2) | (v >> 1)
}

fn expand4(v: u8) -> u8 {
    (v << 4) | v
}

fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn expand6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}
