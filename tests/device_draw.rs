//! Immediate-mode drawing, the screen-space vertex path, and the frame
//! readback bracket.

use soft_d3d::d3d::{ClearFlags, PrimitiveType};
use soft_d3d::{
    D3dError, Device, LitVertex, Material, MaterialData, PackedColor, PixelFormat, Surface,
    TlVertex, VertexType, Viewport, ViewportDesc,
};
use std::cell::RefCell;
use std::rc::Rc;

fn device_on(surface: &Rc<RefCell<Surface>>) -> Device {
    Device::new(Rc::clone(surface)).unwrap()
}

fn device(size: u32) -> Device {
    device_on(&Rc::new(RefCell::new(Surface::new(
        size,
        size,
        PixelFormat::rgb565(),
    ))))
}

fn lit_triangle(color: u32) -> Vec<u8> {
    let color = PackedColor(color);
    let verts = [
        LitVertex { x: -1.0, y: -1.0, z: 0.0, color, ..LitVertex::default() },
        LitVertex { x: 1.0, y: -1.0, z: 0.0, color, ..LitVertex::default() },
        LitVertex { x: 0.0, y: 1.0, z: 0.0, color, ..LitVertex::default() },
    ];
    bytemuck::cast_slice(&verts).to_vec()
}

fn tl_triangle(cx: f32, cy: f32, half: f32, color: u32) -> Vec<u8> {
    let color = PackedColor(color);
    let verts = [
        TlVertex { sx: cx - half, sy: cy + half, sz: 0.0, rhw: 1.0, color, ..TlVertex::default() },
        TlVertex { sx: cx + half, sy: cy + half, sz: 0.0, rhw: 1.0, color, ..TlVertex::default() },
        TlVertex { sx: cx, sy: cy - half, sz: 0.0, rhw: 1.0, color, ..TlVertex::default() },
    ];
    bytemuck::cast_slice(&verts).to_vec()
}

#[test]
fn lit_vertices_draw_with_their_baked_color() {
    let mut dev = device(8);
    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::LitVertex,
        &lit_triangle(0xFF00FF00),
    )
    .unwrap();

    assert_eq!(dev.gl().stats().triangles_rasterized, 1);
    assert_eq!(dev.gl().pixel_at(4, 4), Some([0, 255, 0, 255]));
}

#[test]
fn screen_space_vertices_use_the_viewport_mapping() {
    let mut dev = device(8);
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    viewport.borrow_mut().set_viewport(&ViewportDesc {
        width: 8,
        height: 8,
        min_z: 0.0,
        max_z: 1.0,
        ..ViewportDesc::default()
    });
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::TlVertex,
        &tl_triangle(4.0, 4.0, 3.5, 0xFFFF0000),
    )
    .unwrap();

    // Screen coordinates land where they say they do.
    assert_eq!(dev.gl().pixel_at(4, 4), Some([255, 0, 0, 255]));
    assert_eq!(dev.gl().pixel_at(0, 0), Some([0, 0, 0, 0]));
}

#[test]
fn screen_space_fallback_mapping_covers_640x480() {
    let mut dev = device(8);
    // No viewport bound: the 640x480 fallback maps screen center onto the
    // middle of the 8x8 target.
    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::TlVertex,
        &tl_triangle(320.0, 240.0, 160.0, 0xFF0000FF),
    )
    .unwrap();
    assert_eq!(dev.gl().pixel_at(4, 4), Some([0, 0, 255, 255]));
}

#[test]
fn indexed_draws_share_the_emission_path() {
    let mut dev = device(8);
    let quad: Vec<u8> = {
        let color = PackedColor(0xFFFFFFFF);
        let verts = [
            LitVertex { x: -1.0, y: -1.0, z: 0.0, color, ..LitVertex::default() },
            LitVertex { x: 1.0, y: -1.0, z: 0.0, color, ..LitVertex::default() },
            LitVertex { x: 1.0, y: 1.0, z: 0.0, color, ..LitVertex::default() },
            LitVertex { x: -1.0, y: 1.0, z: 0.0, color, ..LitVertex::default() },
        ];
        bytemuck::cast_slice(&verts).to_vec()
    };
    dev.draw_indexed_primitive(
        PrimitiveType::TriangleList,
        VertexType::LitVertex,
        &quad,
        &[0, 1, 2, 0, 2, 3],
    )
    .unwrap();
    assert_eq!(dev.gl().stats().triangles_rasterized, 2);
    assert_eq!(dev.gl().pixel_at(1, 1), Some([255, 255, 255, 255]));
    assert_eq!(dev.gl().pixel_at(6, 6), Some([255, 255, 255, 255]));
}

#[test]
fn out_of_range_indices_skip_the_draw() {
    let mut dev = device(8);
    dev.draw_indexed_primitive(
        PrimitiveType::TriangleList,
        VertexType::LitVertex,
        &lit_triangle(0xFFFFFFFF),
        &[0, 1, 9],
    )
    .unwrap();
    assert_eq!(dev.gl().stats().triangles_rasterized, 0);
}

#[test]
fn ragged_vertex_buffers_are_rejected() {
    let mut dev = device(8);
    let err = dev
        .draw_primitive(PrimitiveType::TriangleList, VertexType::LitVertex, &[0u8; 33])
        .unwrap_err();
    assert_eq!(err, D3dError::InvalidParams);
}

#[test]
fn scene_bracket_reads_back_into_a_565_target() {
    let target = Rc::new(RefCell::new(Surface::new(4, 4, PixelFormat::rgb565())));
    let mut dev = device_on(&target);

    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    let background = Rc::new(RefCell::new(Material::new()));
    background.borrow_mut().set_material(&MaterialData {
        diffuse: [1.0, 0.0, 0.0, 1.0],
        ..MaterialData::default()
    });
    let handle = dev.material_handle(&background);
    viewport.borrow_mut().set_background(handle);

    dev.begin_scene().unwrap();
    dev.clear(&[], ClearFlags::TARGET).unwrap();
    dev.end_scene().unwrap();

    // Saturated red downsamples to 0xF800.
    let target = target.borrow();
    assert_eq!(&target.pixels()[..2], &0xF800u16.to_le_bytes());
}

#[test]
fn scene_bracket_reads_back_into_a_32bit_target() {
    let target = Rc::new(RefCell::new(Surface::new(4, 4, PixelFormat::argb8888())));
    let mut dev = device_on(&target);

    dev.gl_mut().clear_color([0.0, 1.0, 0.0, 1.0]);
    dev.gl_mut().clear(soft_d3d::gl::ClearMask::COLOR);

    dev.begin_scene().unwrap();
    dev.end_scene().unwrap();

    // Little-endian B, G, R, A.
    let target = target.borrow();
    assert_eq!(&target.pixels()[..4], &[0, 255, 0, 255]);
}

#[test]
fn scene_bracket_is_strict() {
    let mut dev = device(4);
    dev.begin_scene().unwrap();
    assert_eq!(dev.begin_scene().unwrap_err(), D3dError::SceneInProgress);
    dev.end_scene().unwrap();
    assert_eq!(dev.end_scene().unwrap_err(), D3dError::NoSceneInProgress);
}

#[test]
fn flat_shading_takes_the_provoking_vertex_color() {
    let mut dev = device(8);
    dev.gl_mut().shade_model(soft_d3d::gl::ShadeModel::Flat);

    let verts = [
        LitVertex { x: -1.0, y: -1.0, z: 0.0, color: PackedColor(0xFFFF0000), ..LitVertex::default() },
        LitVertex { x: 1.0, y: -1.0, z: 0.0, color: PackedColor(0xFF00FF00), ..LitVertex::default() },
        LitVertex { x: 0.0, y: 1.0, z: 0.0, color: PackedColor(0xFF0000FF), ..LitVertex::default() },
    ];
    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::LitVertex,
        bytemuck::cast_slice(&verts),
    )
    .unwrap();
    assert_eq!(dev.gl().pixel_at(4, 4), Some([0, 0, 255, 255]));
}

#[test]
fn depth_test_keeps_the_nearer_fragment() {
    let mut dev = device(8);
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    viewport.borrow_mut().set_viewport(&ViewportDesc {
        width: 8,
        height: 8,
        min_z: 0.0,
        max_z: 1.0,
        ..ViewportDesc::default()
    });
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();
    dev.set_render_state(soft_d3d::d3d::RenderStateType::ZEnable as u32, 1);

    let near = tl_triangle(4.0, 4.0, 3.5, 0xFF00FF00);
    let far = tl_triangle(4.0, 4.0, 3.5, 0xFFFF0000);
    // sz 0.2 in front of sz 0.8.
    let mut near_v: Vec<TlVertex> = bytemuck::cast_slice(&near).to_vec();
    let mut far_v: Vec<TlVertex> = bytemuck::cast_slice(&far).to_vec();
    for v in &mut near_v {
        v.sz = 0.2;
    }
    for v in &mut far_v {
        v.sz = 0.8;
    }

    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::TlVertex,
        bytemuck::cast_slice(&near_v),
    )
    .unwrap();
    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::TlVertex,
        bytemuck::cast_slice(&far_v),
    )
    .unwrap();

    assert_eq!(dev.gl().pixel_at(4, 4), Some([0, 255, 0, 255]));
}

#[test]
fn near_ndc_vertices_skip_the_perspective_divide() {
    let mut dev = device(8);
    // rhw below the epsilon: positions are already normalized device
    // coordinates.
    let color = PackedColor(0xFFFFFFFF);
    let verts = [
        TlVertex { sx: -1.0, sy: -1.0, sz: 0.0, rhw: 0.0, color, ..TlVertex::default() },
        TlVertex { sx: 1.0, sy: -1.0, sz: 0.0, rhw: 0.0, color, ..TlVertex::default() },
        TlVertex { sx: 0.0, sy: 1.0, sz: 0.0, rhw: 0.0, color, ..TlVertex::default() },
    ];
    dev.draw_primitive(
        PrimitiveType::TriangleList,
        VertexType::TlVertex,
        bytemuck::cast_slice(&verts),
    )
    .unwrap();
    assert_eq!(dev.gl().stats().triangles_rasterized, 1);
}

#[test]
fn set_render_target_is_a_stub() {
    let mut dev = device(4);
    let other = Rc::new(RefCell::new(Surface::new(4, 4, PixelFormat::rgb565())));
    dev.set_render_target(&other);
    assert!(Rc::ptr_eq(&dev.render_target(), &dev.render_target()));
}
