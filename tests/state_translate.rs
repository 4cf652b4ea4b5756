//! Render-state translation: selector/value pairs in, context state out.

use soft_d3d::d3d::{BlendMode, CmpFunc, CullMode, RenderStateType, ShadeMode, TextureFilter};
use soft_d3d::gl::{BlendFactor, Cap, DepthFunc, ShadeModel, TexFilter, Winding};
use soft_d3d::{Device, PixelFormat, Surface};
use std::cell::RefCell;
use std::rc::Rc;

fn device() -> Device {
    let target = Rc::new(RefCell::new(Surface::new(8, 8, PixelFormat::rgb565())));
    Device::new(target).unwrap()
}

#[test]
fn boolean_toggles_map_to_caps() {
    let mut dev = device();
    dev.set_render_state(RenderStateType::ZEnable as u32, 1);
    assert!(dev.gl().is_enabled(Cap::DepthTest));
    dev.set_render_state(RenderStateType::ZEnable as u32, 0);
    assert!(!dev.gl().is_enabled(Cap::DepthTest));

    dev.set_render_state(RenderStateType::ZWriteEnable as u32, 0);
    assert!(!dev.gl().depth_mask_state());

    dev.set_render_state(RenderStateType::AlphaBlendEnable as u32, 1);
    assert!(dev.gl().is_enabled(Cap::Blend));
    dev.set_render_state(RenderStateType::AlphaBlendEnable as u32, 0);
    assert!(!dev.gl().is_enabled(Cap::Blend));

    // Color-key rendering rides the same blend toggle.
    dev.set_render_state(RenderStateType::ColorKeyEnable as u32, 1);
    assert!(dev.gl().is_enabled(Cap::Blend));

    dev.set_render_state(RenderStateType::DitherEnable as u32, 0);
    assert!(!dev.gl().is_enabled(Cap::Dither));
}

#[test]
fn cull_mode_selects_winding() {
    let mut dev = device();
    dev.set_render_state(RenderStateType::CullMode as u32, CullMode::Cw as u32);
    assert!(dev.gl().is_enabled(Cap::CullFace));
    assert_eq!(dev.gl().front_face_state(), Winding::Ccw);

    dev.set_render_state(RenderStateType::CullMode as u32, CullMode::Ccw as u32);
    assert_eq!(dev.gl().front_face_state(), Winding::Cw);

    dev.set_render_state(RenderStateType::CullMode as u32, CullMode::None as u32);
    assert!(!dev.gl().is_enabled(Cap::CullFace));
}

#[test]
fn z_comparison_maps_one_to_one() {
    let mut dev = device();
    for (d3d, gl) in [
        (CmpFunc::Never, DepthFunc::Never),
        (CmpFunc::Less, DepthFunc::Less),
        (CmpFunc::Equal, DepthFunc::Equal),
        (CmpFunc::LessEqual, DepthFunc::LessEqual),
        (CmpFunc::Greater, DepthFunc::Greater),
        (CmpFunc::NotEqual, DepthFunc::NotEqual),
        (CmpFunc::GreaterEqual, DepthFunc::GreaterEqual),
        (CmpFunc::Always, DepthFunc::Always),
    ] {
        dev.set_render_state(RenderStateType::ZFunc as u32, d3d as u32);
        assert_eq!(dev.gl().depth_func_state(), gl);
    }
}

#[test]
fn shade_mode_maps_flat_and_gouraud() {
    let mut dev = device();
    dev.set_render_state(RenderStateType::ShadeMode as u32, ShadeMode::Flat as u32);
    assert_eq!(dev.gl().shade_model_state(), ShadeModel::Flat);
    dev.set_render_state(RenderStateType::ShadeMode as u32, ShadeMode::Gouraud as u32);
    assert_eq!(dev.gl().shade_model_state(), ShadeModel::Smooth);
    // Phong is not implemented and must leave the mode untouched.
    dev.set_render_state(RenderStateType::ShadeMode as u32, ShadeMode::Phong as u32);
    assert_eq!(dev.gl().shade_model_state(), ShadeModel::Smooth);
}

#[test]
fn blend_factors_combine_through_the_record() {
    let mut dev = device();
    let before = dev.gl().stats().blend_func_applies;

    dev.set_render_state(RenderStateType::SrcBlend as u32, BlendMode::SrcAlpha as u32);
    assert_eq!(
        dev.gl().blend_state(),
        (BlendFactor::SrcAlpha, BlendFactor::Zero)
    );

    dev.set_render_state(RenderStateType::DestBlend as u32, BlendMode::InvSrcAlpha as u32);
    assert_eq!(
        dev.gl().blend_state(),
        (BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha)
    );
    assert_eq!(dev.gl().stats().blend_func_applies - before, 2);

    // An unmapped factor leaves the record alone but still re-applies the
    // current combination.
    dev.set_render_state(RenderStateType::SrcBlend as u32, BlendMode::DestColor as u32);
    assert_eq!(
        dev.gl().blend_state(),
        (BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha)
    );
    assert_eq!(dev.gl().stats().blend_func_applies - before, 3);
}

#[test]
fn unknown_selectors_change_nothing() {
    let mut dev = device();
    let blend = dev.gl().blend_state();
    let depth = dev.gl().depth_func_state();
    dev.set_render_state(0xDEAD, 0xBEEF);
    dev.set_render_state(70, 0xFFFF_FFFF); // a stipple pattern row
    assert_eq!(dev.gl().blend_state(), blend);
    assert_eq!(dev.gl().depth_func_state(), depth);
}

#[test]
fn texture_filters_defer_until_bind() {
    let mut dev = device();
    dev.set_render_state(RenderStateType::TextureMag as u32, TextureFilter::Linear as u32);
    dev.set_render_state(RenderStateType::TextureMin as u32, TextureFilter::Linear as u32);
    assert_eq!(dev.render_state_record().mag_filter, TexFilter::Linear);
    assert_eq!(dev.render_state_record().min_filter, TexFilter::Linear);

    let surface = Rc::new(RefCell::new(Surface::new(4, 4, PixelFormat::rgb565())));
    let texture = Rc::new(RefCell::new(soft_d3d::Texture::new(surface)));
    let handle = dev.texture_handle(&texture);
    let name = texture.borrow().tex_name();
    assert_ne!(name, 0);

    // Binding resets the object's filters; the translator re-applies the
    // recorded values right after.
    dev.set_render_state(RenderStateType::TextureHandle as u32, handle);
    assert_eq!(dev.gl().texture_binding(), name);
    assert!(dev.gl().is_enabled(Cap::Texture2D));
    assert_eq!(
        dev.gl().texture_filters(name),
        Some((TexFilter::Linear, TexFilter::Linear))
    );

    // A null handle unbinds and disables texturing.
    dev.set_render_state(RenderStateType::TextureHandle as u32, 0);
    assert_eq!(dev.gl().texture_binding(), 0);
    assert!(!dev.gl().is_enabled(Cap::Texture2D));
}
