//! End-to-end scenarios driven through the public stage API

use stagecraft_3d::display::AttachmentState;
use stagecraft_3d::physics::{HeadlessPhysics, JointKind, PhysicsBackend};
use stagecraft_3d::prelude::*;
use stagecraft_3d::render::HeadlessRenderer;

fn stage() -> Stage {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut stage = Stage::new(StageConfig::default(), Box::new(HeadlessRenderer::new())).unwrap();
    stage
        .set_physics_backend(Box::new(HeadlessPhysics::new()))
        .unwrap();
    stage
}

fn body_at(stage: &mut Stage, name: &str, position: Vec3) -> PhysicsObject {
    let object = PhysicsObject::new(stage, name).unwrap();
    object
        .positioned()
        .set_position(stage.graph_mut(), position)
        .unwrap();
    object
}

fn headless(stage: &Stage) -> std::cell::Ref<'_, HeadlessPhysics> {
    std::cell::Ref::map(stage.world().borrow(), |w| {
        w.physics_as::<HeadlessPhysics>().unwrap()
    })
}

#[test]
fn test_joint_between_two_bodies_lands_at_centroid() {
    let mut stage = stage();
    let a = body_at(&mut stage, "a", Vec3::ZERO);
    let b = body_at(&mut stage, "b", Vec3::new(2.0, 0.0, 0.0));

    let joint = Joint::between(&mut stage, JointKind::Spherical, a.node(), b.node()).unwrap();
    assert_eq!(joint.state(stage.graph()), AttachmentState::PendingFrame);
    assert!(joint.native(stage.graph()).is_none());

    let report = stage.frame(0.0).unwrap();
    assert_eq!(report.tick.commits_run, 1);
    assert_eq!(joint.state(stage.graph()), AttachmentState::Committed);

    let position = joint.positioned().world_position().unwrap();
    assert!(position.approx_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
    assert_eq!(headless(&stage).stats().joints, 1);
}

#[test]
fn test_joint_disposed_before_commit_creates_nothing() {
    let mut stage = stage();
    let a = body_at(&mut stage, "a", Vec3::ZERO);
    let b = body_at(&mut stage, "b", Vec3::new(2.0, 0.0, 0.0));
    stage.tick().unwrap();

    let joint = Joint::between(&mut stage, JointKind::D6, a.node(), b.node()).unwrap();
    joint.dispose(&mut stage).unwrap();

    let report = stage.frame(0.0).unwrap();
    assert_eq!(report.tick.commits_skipped, 1);
    assert_eq!(a.physics(stage.graph()), PhysicsMode::Off);
    assert_eq!(b.physics(stage.graph()), PhysicsMode::Off);
    assert_eq!(headless(&stage).stats(), Default::default());
}

#[test]
fn test_removing_physics_tears_joints_down_through_the_backend() {
    let mut stage = stage();
    let a = body_at(&mut stage, "a", Vec3::ZERO);
    let b = body_at(&mut stage, "b", Vec3::new(0.0, 2.0, 0.0));
    let joint = Joint::between(&mut stage, JointKind::Fixed, a.node(), b.node()).unwrap();
    stage.tick().unwrap();
    assert!(joint.native(stage.graph()).is_some());

    let backend = stage.remove_physics_backend().unwrap().unwrap();
    assert_eq!(backend.stats().joints, 0);
    assert_eq!(backend.stats().actors, 0);
    assert_eq!(joint.state(stage.graph()), AttachmentState::Idle);
    assert!(a.actor(stage.graph()).is_none());

    stage
        .set_physics_backend(Box::new(HeadlessPhysics::new()))
        .unwrap();
    assert_eq!(joint.state(stage.graph()), AttachmentState::Committed);
    assert_eq!(headless(&stage).stats().joints, 1);
}

#[test]
fn test_gizmo_drag_end_pins_the_joint_position() {
    let mut stage = stage();
    let a = body_at(&mut stage, "a", Vec3::ZERO);
    let b = body_at(&mut stage, "b", Vec3::new(2.0, 0.0, 0.0));
    let joint = Joint::between(&mut stage, JointKind::Spherical, a.node(), b.node()).unwrap();
    stage.tick().unwrap();

    stage.select(Some(joint.node()));
    stage.set_editor_mode(EditorMode::Translate);
    stage.tick().unwrap();

    assert_eq!(stage.begin_drag(None).unwrap(), Some(joint.node()));
    stage.drag_to(Vec3::new(0.0, 1.0, 0.0)).unwrap();
    assert!(!joint.is_manual(stage.graph()));

    assert_eq!(stage.end_drag(), Some(joint.node()));
    assert!(joint.is_manual(stage.graph()));
    stage.tick().unwrap();

    assert_eq!(joint.state(stage.graph()), AttachmentState::Committed);
    let position = joint.positioned().world_position().unwrap();
    assert!(position.approx_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));

    let handle = joint.native(stage.graph()).unwrap();
    let physics = headless(&stage);
    let record = physics.joint(handle).unwrap();
    assert!(record.poses.0.position.approx_eq(Vec3::new(0.0, 0.5, 0.0), 1e-5));
    assert!(record.poses.1.position.approx_eq(Vec3::new(-1.0, 0.5, 0.0), 1e-5));
}

#[test]
fn test_identical_textures_are_shared_until_the_last_release() {
    let mut stage = stage();
    let world = stage.world().clone();
    let (left, right) = {
        let mut w = world.borrow_mut();
        (w.scene.insert("left"), w.scene.insert("right"))
    };

    let params = |color: &str| MaterialParams {
        color: Some(color.into()),
        texture: Some("textures/wood.jpg".into()),
        ..Default::default()
    };
    let red = TexturedMaterial::with_params(stage.graph_mut(), world.clone(), left, params("#f00"))
        .unwrap();
    let green =
        TexturedMaterial::with_params(stage.graph_mut(), world.clone(), right, params("#0f0"))
            .unwrap();

    assert_eq!(world.borrow().texture_pool().len(), 1);
    assert_eq!(world.borrow().material_pool().len(), 2);

    red.dispose(stage.graph_mut()).unwrap();
    assert_eq!(world.borrow().texture_pool().len(), 1);
    assert_eq!(world.borrow().renderer().stats().textures, 1);

    green.dispose(stage.graph_mut()).unwrap();
    assert!(world.borrow().texture_pool().is_empty());
    assert_eq!(world.borrow().renderer().stats().textures, 0);
    assert_eq!(world.borrow().renderer().stats().materials, 0);
}

#[test]
fn test_material_parameter_burst_rebuilds_once() {
    let mut stage = stage();
    let world = stage.world().clone();
    let node = world.borrow_mut().scene.insert("box");
    let material = TexturedMaterial::new(stage.graph_mut(), world.clone(), node).unwrap();

    let graph = stage.graph_mut();
    material.set_color(graph, Some("#123456".into()));
    material.set_opacity(graph, Some(0.5));
    material.set_texture(graph, Some("grid.png".into()));
    material.set_texture_repeat(graph, Some([4.0, 4.0]));
    let report = stage.tick().unwrap();

    assert_eq!(report.effects_run, 1);
    assert_eq!(world.borrow().material_pool().len(), 1);
    assert_eq!(
        world.borrow().scene.get(node).unwrap().material,
        material.material(stage.graph())
    );
}

#[test]
fn test_slow_frames_reduce_pixel_ratio_once_per_window() {
    let mut stage = stage();

    // 20 fps: the first frame has no sample, so 61 frames fill one window
    for i in 0..=60 {
        stage.frame(i as f64 * 50.0).unwrap();
    }
    assert_eq!(stage.pixel_ratio(), 0.75);
    {
        let w = stage.world().borrow();
        let renderer = w.renderer_as::<HeadlessRenderer>().unwrap();
        assert_eq!(renderer.last_pixel_ratio(), Some(0.75));
    }

    for i in 61..120 {
        stage.frame(i as f64 * 50.0).unwrap();
    }
    assert_eq!(stage.pixel_ratio(), 0.75);
}

#[test]
fn test_physics_steps_with_time_between_callback_runs() {
    let mut stage = stage();

    // 120 Hz display, callbacks every other frame
    let frame = 1000.0 / 120.0;
    for i in 0..=4 {
        stage.frame(i as f64 * frame).unwrap();
    }
    let elapsed = headless(&stage).elapsed();
    assert!((elapsed - 4.0 * frame as f32 / 1000.0).abs() < 1e-4);
}

#[test]
fn test_shutdown_after_disposing_objects_is_clean() {
    let mut stage = stage();
    let a = body_at(&mut stage, "a", Vec3::ZERO);
    stage.tick().unwrap();
    a.dispose(stage.graph_mut()).unwrap();

    let world = stage.world().clone();
    stage.shutdown().unwrap();
    assert_eq!(world.borrow().renderer().stats().renderers, 0);
    assert!(world.borrow().physics().is_none());
}
