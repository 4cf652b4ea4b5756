//! Render-state translation: one enumerated selector/value pair in, one or
//! more context state changes out.
//!
//! This is a void operation with no error path. Selectors whose effect
//! depends on a previously-set sibling (the two blend factors, the two
//! texture filters) go through a small record of current values that the
//! device keeps alive across calls, so an entire execute invocation sees
//! the combination, not just the latest record.

use crate::d3d::{
    BlendMode, CmpFunc, CullMode, FillMode, RenderStateType, ShadeMode, TextureFilter,
    RENDER_STATE_STIPPLE_PATTERN_FIRST, RENDER_STATE_STIPPLE_PATTERN_LAST,
};
use crate::gl::{BlendFactor, Cap, DepthFunc, GlContext, ShadeModel, TexFilter, Winding};
use crate::texture::Texture;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Sticky values for selectors that combine with a sibling. Filters are
/// deferred until a texture is actually bound; blend factors are re-applied
/// together whenever either changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderStateRecord {
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub mag_filter: TexFilter,
    pub min_filter: TexFilter,
}

impl Default for RenderStateRecord {
    fn default() -> Self {
        RenderStateRecord {
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            mag_filter: TexFilter::Nearest,
            min_filter: TexFilter::Nearest,
        }
    }
}

/// Applies one render-state change to the context. Unrecognized selectors
/// and values are logged and left unapplied; the call always succeeds.
pub fn apply_render_state(
    gl: &mut GlContext,
    textures: &[Rc<RefCell<Texture>>],
    record: &mut RenderStateRecord,
    kind: u32,
    value: u32,
) {
    if (RENDER_STATE_STIPPLE_PATTERN_FIRST..=RENDER_STATE_STIPPLE_PATTERN_LAST).contains(&kind) {
        debug!(row = kind - RENDER_STATE_STIPPLE_PATTERN_FIRST, "stipple pattern not implemented");
        return;
    }
    let Some(state) = RenderStateType::from_u32(kind) else {
        debug!(kind, value, "unhandled render state");
        return;
    };
    match state {
        RenderStateType::TextureHandle => {
            if value == 0 {
                gl.disable(Cap::Texture2D);
                gl.bind_texture(0);
                return;
            }
            let Some(texture) = textures.get(value as usize - 1) else {
                debug!(handle = value, "unknown texture handle");
                return;
            };
            let name = texture.borrow().tex_name();
            if name == 0 {
                debug!(handle = value, "texture has no context object yet");
                return;
            }
            gl.enable(Cap::Texture2D);
            gl.bind_texture(name);
            // Binding reset the object's filters.
            gl.tex_filter(record.mag_filter, record.min_filter);
        }
        RenderStateType::ZEnable => toggle(gl, Cap::DepthTest, value),
        RenderStateType::ZWriteEnable => gl.depth_mask(value != 0),
        RenderStateType::DitherEnable => toggle(gl, Cap::Dither, value),
        RenderStateType::AlphaBlendEnable => toggle(gl, Cap::Blend, value),
        RenderStateType::ColorKeyEnable => toggle(gl, Cap::Blend, value),
        RenderStateType::FillMode => match FillMode::from_u32(value) {
            Some(FillMode::Solid) => {}
            other => debug!(?other, value, "unhandled fill mode"),
        },
        RenderStateType::ShadeMode => match ShadeMode::from_u32(value) {
            Some(ShadeMode::Flat) => gl.shade_model(ShadeModel::Flat),
            Some(ShadeMode::Gouraud) => gl.shade_model(ShadeModel::Smooth),
            other => debug!(?other, value, "unhandled shade mode"),
        },
        RenderStateType::CullMode => match CullMode::from_u32(value) {
            Some(CullMode::None) => gl.disable(Cap::CullFace),
            Some(CullMode::Cw) => {
                gl.enable(Cap::CullFace);
                gl.front_face(Winding::Ccw);
            }
            Some(CullMode::Ccw) => {
                gl.enable(Cap::CullFace);
                gl.front_face(Winding::Cw);
            }
            None => debug!(value, "unhandled cull mode"),
        },
        RenderStateType::ZFunc => match CmpFunc::from_u32(value) {
            Some(func) => gl.depth_func(depth_func(func)),
            None => debug!(value, "unhandled z comparison function"),
        },
        RenderStateType::SrcBlend => {
            match BlendMode::from_u32(value) {
                Some(BlendMode::SrcAlpha) => record.src_blend = BlendFactor::SrcAlpha,
                other => debug!(?other, value, "unhandled source blend factor"),
            }
            gl.blend_func(record.src_blend, record.dst_blend);
        }
        RenderStateType::DestBlend => {
            match BlendMode::from_u32(value) {
                Some(BlendMode::InvSrcAlpha) => record.dst_blend = BlendFactor::InvSrcAlpha,
                other => debug!(?other, value, "unhandled destination blend factor"),
            }
            gl.blend_func(record.src_blend, record.dst_blend);
        }
        RenderStateType::TextureMag => match TextureFilter::from_u32(value) {
            Some(TextureFilter::Nearest) => record.mag_filter = TexFilter::Nearest,
            Some(TextureFilter::Linear) => record.mag_filter = TexFilter::Linear,
            other => debug!(?other, value, "unhandled magnification filter"),
        },
        RenderStateType::TextureMin => match TextureFilter::from_u32(value) {
            Some(TextureFilter::Nearest) => record.min_filter = TexFilter::Nearest,
            Some(TextureFilter::Linear) => record.min_filter = TexFilter::Linear,
            other => debug!(?other, value, "unhandled minification filter"),
        },
        RenderStateType::StippleEnable | RenderStateType::StippledAlpha => {
            debug!(?state, value, "stippling not implemented");
        }
        other => {
            debug!(state = ?other, value, "unhandled render state");
        }
    }
}

fn toggle(gl: &mut GlContext, cap: Cap, value: u32) {
    if value != 0 {
        gl.enable(cap);
    } else {
        gl.disable(cap);
    }
}

fn depth_func(func: CmpFunc) -> DepthFunc {
    match func {
        CmpFunc::Never => DepthFunc::Never,
        CmpFunc::Less => DepthFunc::Less,
        CmpFunc::Equal => DepthFunc::Equal,
        CmpFunc::LessEqual => DepthFunc::LessEqual,
        CmpFunc::Greater => DepthFunc::Greater,
        CmpFunc::NotEqual => DepthFunc::NotEqual,
        CmpFunc::GreaterEqual => DepthFunc::GreaterEqual,
        CmpFunc::Always => DepthFunc::Always,
    }
}
