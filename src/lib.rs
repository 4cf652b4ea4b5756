//! A software fixed-function 3D pipeline speaking the legacy Direct3D
//! object model: retained-mode execute buffers and immediate-mode
//! DrawPrimitive calls, translated onto a GL-style state machine with a
//! deterministic software rasterizer behind it.
//!
//! The shape of an application frame:
//!
//! 1. Create a [`Surface`] and a [`Device`] rendering to it.
//! 2. Register a [`Viewport`] (owning [`Light`]s and optionally a
//!    background [`Material`]) and bind it current.
//! 3. Either build an instruction stream with
//!    [`exec::encode::ExecuteEncoder`], place it in an [`ExecuteBuffer`]
//!    and call [`Device::execute`], or call [`Device::draw_primitive`] /
//!    [`Device::draw_indexed_primitive`] directly. Both paths share one
//!    vertex-emission routine and one render-state translator.
//! 4. Bracket frames with [`Device::begin_scene`] / [`Device::end_scene`];
//!    ending a scene reads the rendered frame back into the target
//!    surface.
//!
//! Everything is single-threaded and synchronous; exclusive access to the
//! context is the `&mut` discipline, not a lock. Unrecognized enumerated
//! values in any translation table are logged and skipped without failing
//! the frame; only structural violations (unknown objects, mismatched
//! texture dimensions, bad traversal selectors) surface as [`D3dError`].

pub mod color;
pub mod d3d;
mod device;
mod error;
pub mod exec;
pub mod gl;
mod light;
mod material;
pub mod math;
mod state;
mod surface;
mod texture;
mod vertex;
mod viewport;

pub use color::PackedColor;
pub use device::Device;
pub use error::D3dError;
pub use exec::{ExecuteBuffer, ExecuteData, MAX_EXECUTE_VERTICES};
pub use light::{Light, LightData, LightFlags};
pub use material::{Material, MaterialData};
pub use state::{apply_render_state, RenderStateRecord};
pub use surface::{ColorKey, PaletteEntry, PixelFormat, PixelFormatFlags, Surface};
pub use texture::Texture;
pub use vertex::{LitVertex, TlVertex, Vertex, VertexType, VERTEX_STRIDE};
pub use viewport::{Viewport, Viewport2Desc, ViewportDesc, ViewportShape};
