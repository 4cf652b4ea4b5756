//! Viewport membership lists, light slot assignment and activation.

use soft_d3d::d3d::{ClearFlags, LightKind, NEXT_HEAD, NEXT_NEXT, NEXT_TAIL};
use soft_d3d::{
    D3dError, Device, Light, LightData, PixelFormat, Surface, Viewport, Viewport2Desc,
    ViewportDesc, ViewportShape,
};
use std::cell::RefCell;
use std::rc::Rc;

fn device() -> Device {
    let target = Rc::new(RefCell::new(Surface::new(8, 8, PixelFormat::rgb565())));
    Device::new(target).unwrap()
}

fn light() -> Rc<RefCell<Light>> {
    Rc::new(RefCell::new(Light::new()))
}

fn directional(direction: [f32; 3]) -> Rc<RefCell<Light>> {
    let l = light();
    l.borrow_mut().set_light(
        &LightData {
            kind: LightKind::Directional,
            color: [1.0, 1.0, 1.0, 1.0],
            direction,
            ..LightData::default()
        },
        None,
    );
    l
}

#[test]
fn delete_light_requires_membership() {
    let mut vp = Viewport::new();
    let owned = light();
    let stranger = light();
    vp.add_light(&owned, None);

    assert_eq!(vp.delete_light(&stranger), Err(D3dError::InvalidObject));
    assert_eq!(vp.lights().len(), 1, "failed delete must not mutate the list");

    vp.delete_light(&owned).unwrap();
    assert!(vp.lights().is_empty());
}

#[test]
fn next_light_traversal_modes() {
    let mut vp = Viewport::new();
    let a = light();
    let b = light();
    let c = light();
    vp.add_light(&a, None);
    vp.add_light(&b, None);
    vp.add_light(&c, None);

    let head = vp.next_light(None, NEXT_HEAD).unwrap().unwrap();
    assert!(Rc::ptr_eq(&head, &a));
    let tail = vp.next_light(None, NEXT_TAIL).unwrap().unwrap();
    assert!(Rc::ptr_eq(&tail, &c));
    let after_a = vp.next_light(Some(&a), NEXT_NEXT).unwrap().unwrap();
    assert!(Rc::ptr_eq(&after_a, &b));
    assert!(vp.next_light(Some(&c), NEXT_NEXT).unwrap().is_none());
}

#[test]
fn next_light_rejects_unknown_directions() {
    let mut vp = Viewport::new();
    let a = light();
    vp.add_light(&a, None);

    assert_eq!(vp.next_light(Some(&a), 0x40).unwrap_err(), D3dError::InvalidParams);
    assert_eq!(vp.next_light(None, NEXT_NEXT).unwrap_err(), D3dError::InvalidParams);
    assert_eq!(vp.lights().len(), 1);
}

#[test]
fn slots_follow_insertion_order_on_activation() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);

    let first = directional([0.0, 0.0, -1.0]);
    let second = directional([0.0, -1.0, 0.0]);
    viewport.borrow_mut().add_light(&first, None);
    viewport.borrow_mut().add_light(&second, None);
    assert_eq!(first.borrow().slot(), None, "slots wait for activation");

    dev.set_current_viewport(&viewport).unwrap();
    assert_eq!(first.borrow().slot(), Some(0));
    assert_eq!(second.borrow().slot(), Some(1));
    assert!(first.borrow().is_active());
    assert!(dev.gl().light_enabled(0));
    assert!(dev.gl().light_enabled(1));
}

#[test]
fn adding_to_a_bound_viewport_activates_immediately() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    let l = directional([0.0, 0.0, -1.0]);
    viewport.borrow_mut().add_light(&l, Some(dev.gl_mut()));
    assert_eq!(l.borrow().slot(), Some(0));
    assert!(l.borrow().is_active());
    assert!(dev.gl().light_enabled(0));
}

#[test]
fn directional_activation_negates_the_direction_with_w_zero() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    let l = directional([0.0, 0.0, -1.0]);
    viewport.borrow_mut().add_light(&l, Some(dev.gl_mut()));

    let params = dev.gl().light_params(0).unwrap();
    assert_eq!(params.position, [0.0, 0.0, 1.0, 0.0]);
    assert_eq!(params.diffuse, [1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn set_light_on_an_active_light_pushes_new_parameters() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    let l = directional([0.0, 0.0, -1.0]);
    viewport.borrow_mut().add_light(&l, Some(dev.gl_mut()));

    l.borrow_mut().set_light(
        &LightData {
            kind: LightKind::Directional,
            color: [0.5, 0.5, 0.5, 1.0],
            direction: [1.0, 0.0, 0.0],
            ..LightData::default()
        },
        Some(dev.gl_mut()),
    );
    let params = dev.gl().light_params(0).unwrap();
    assert_eq!(params.position, [-1.0, 0.0, 0.0, 0.0]);
    assert_eq!(params.diffuse, [0.5, 0.5, 0.5, 1.0]);
    assert!(l.borrow().is_active());
}

#[test]
fn non_directional_lights_stay_inert() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    let l = light();
    l.borrow_mut().set_light(
        &LightData {
            kind: LightKind::Point,
            color: [1.0, 1.0, 1.0, 1.0],
            position: [1.0, 2.0, 3.0],
            ..LightData::default()
        },
        None,
    );
    viewport.borrow_mut().add_light(&l, Some(dev.gl_mut()));

    // The slot is claimed and enabled, but no parameters were pushed, so
    // the slot still carries context defaults (black diffuse): visually
    // inert.
    assert_eq!(l.borrow().slot(), Some(0));
    let params = dev.gl().light_params(0).unwrap();
    assert_eq!(params.diffuse, [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn geometry_descriptor_is_one_of_two_shapes() {
    let mut vp = Viewport::new();
    assert!(vp.shape().is_none());

    vp.set_viewport(&ViewportDesc {
        width: 640,
        height: 480,
        min_z: 0.0,
        max_z: 1.0,
        ..ViewportDesc::default()
    });
    assert!(matches!(vp.shape(), Some(ViewportShape::Legacy(_))));

    vp.set_viewport2(&Viewport2Desc {
        width: 320,
        height: 240,
        clip_width: 2.0,
        clip_height: 2.0,
        min_z: 0.0,
        max_z: 1.0,
        ..Viewport2Desc::default()
    });
    match vp.shape() {
        Some(ViewportShape::Extended(desc)) => assert_eq!(desc.width, 320),
        other => panic!("expected the extended shape, got {other:?}"),
    }
}

#[test]
fn viewport_list_mirrors_the_light_list_semantics() {
    let mut dev = device();
    let a = Rc::new(RefCell::new(Viewport::new()));
    let b = Rc::new(RefCell::new(Viewport::new()));
    let stranger = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&a);
    dev.add_viewport(&b);

    assert_eq!(dev.delete_viewport(&stranger), Err(D3dError::InvalidObject));
    assert_eq!(
        dev.set_current_viewport(&stranger),
        Err(D3dError::InvalidObject)
    );

    let head = dev.next_viewport(None, NEXT_HEAD).unwrap().unwrap();
    assert!(Rc::ptr_eq(&head, &a));
    let after = dev.next_viewport(Some(&a), NEXT_NEXT).unwrap().unwrap();
    assert!(Rc::ptr_eq(&after, &b));
    assert_eq!(dev.next_viewport(None, 0x99).unwrap_err(), D3dError::InvalidParams);

    dev.set_current_viewport(&a).unwrap();
    assert!(a.borrow().is_bound());
    dev.set_current_viewport(&b).unwrap();
    assert!(!a.borrow().is_bound());
    assert!(b.borrow().is_bound());

    dev.delete_viewport(&b).unwrap();
    assert!(dev.current_viewport().is_none());
    assert!(!b.borrow().is_bound());
}

#[test]
fn clear_preserves_the_depth_write_mask() {
    let mut dev = device();
    let viewport = Rc::new(RefCell::new(Viewport::new()));
    dev.add_viewport(&viewport);
    dev.set_current_viewport(&viewport).unwrap();

    dev.gl_mut().clear_depth(0.25);
    dev.clear(&[], ClearFlags::ZBUFFER).unwrap();
    assert_eq!(dev.gl().depth_at(0, 0), Some(0.25));

    dev.gl_mut().depth_mask(false);
    dev.gl_mut().clear_depth(1.0);
    dev.clear(&[], ClearFlags::TARGET | ClearFlags::ZBUFFER).unwrap();

    // The depth buffer cleared even though the mask was off, and the mask
    // came back off afterwards.
    assert_eq!(dev.gl().depth_at(0, 0), Some(1.0));
    assert!(!dev.gl().depth_mask_state());
}
