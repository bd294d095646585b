//! Joints Demo
//!
//! This example drives a stage headlessly:
//! - Physics objects joined by a spherical and a D6 joint
//! - A textured floor sharing one texture with a crate
//! - A gizmo drag that pins a joint's position
//! - A slow frame loop that trips the resolution governor
//!
//! Run with: RUST_LOG=debug cargo run -p stagecraft_3d --example joints_demo

use stagecraft_3d::physics::{HeadlessPhysics, PhysicsBackend};
use stagecraft_3d::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut stage = Stage::new(StageConfig::default(), Box::new(HeadlessRenderer::new()))?;
    stage.set_physics_backend(Box::new(HeadlessPhysics::new()))?;

    // ========================================================================
    // Bodies and joints
    // ========================================================================

    let anchor = PhysicsObject::new(&mut stage, "anchor")?;
    anchor.set_physics(stage.graph_mut(), PhysicsMode::Static);

    let pendulum = PhysicsObject::new(&mut stage, "pendulum")?;
    pendulum
        .positioned()
        .set_position(stage.graph_mut(), Vec3::new(0.0, -2.0, 0.0))?;

    let weight = PhysicsObject::new(&mut stage, "weight")?;
    weight
        .positioned()
        .set_position(stage.graph_mut(), Vec3::new(1.5, -2.0, 0.0))?;

    let hinge = Joint::spherical(&mut stage)?;
    hinge.set_from(stage.graph_mut(), Some(anchor.node()));
    hinge.set_to(stage.graph_mut(), Some(pendulum.node()));

    let rope = Joint::d6(&mut stage)?;
    rope.set_from(stage.graph_mut(), Some(pendulum.node()));
    rope.set_to(stage.graph_mut(), Some(weight.node()));
    rope.set_distance_limit(stage.graph_mut(), Some(1.5));

    stage.frame(0.0)?;
    println!(
        "hinge {:?} at {:?}",
        hinge.state(stage.graph()),
        hinge.positioned().world_position()?
    );
    println!("rope {:?}", rope.state(stage.graph()));

    // ========================================================================
    // Materials
    // ========================================================================

    let world = stage.world().clone();
    let (floor_node, crate_node) = {
        let mut w = world.borrow_mut();
        (w.scene.insert("floor"), w.scene.insert("crate"))
    };
    let wood = |color: &str| MaterialParams {
        color: Some(color.into()),
        texture: Some("textures/wood.jpg".into()),
        texture_repeat: Some([4.0, 4.0]),
        ..Default::default()
    };
    let floor = TexturedMaterial::with_params(stage.graph_mut(), world.clone(), floor_node, wood("#886644"))?;
    let crate_material =
        TexturedMaterial::with_params(stage.graph_mut(), world.clone(), crate_node, wood("#aa8855"))?;
    println!(
        "{} materials share {} texture",
        world.borrow().material_pool().len(),
        world.borrow().texture_pool().len()
    );

    // ========================================================================
    // Gizmo drag
    // ========================================================================

    stage.select(Some(hinge.node()));
    stage.set_editor_mode(EditorMode::Translate);
    stage.tick()?;

    stage.begin_drag(Some(Axis::Y))?;
    stage.drag_to(Vec3::new(0.0, -0.5, 0.0))?;
    stage.end_drag();
    stage.tick()?;
    println!(
        "hinge pinned: {} at {:?}",
        hinge.is_manual(stage.graph()),
        hinge.positioned().world_position()?
    );

    // ========================================================================
    // Slow frame loop
    // ========================================================================

    let steps = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let counter = steps.clone();
    let _ticker = stage.add_loop(move |_, _| counter.set(counter.get() + 1));

    for i in 1..=61 {
        stage.frame(i as f64 * 50.0)?;
    }
    println!(
        "{} loop runs, pixel ratio {}",
        steps.get(),
        stage.pixel_ratio()
    );

    // ========================================================================
    // Teardown
    // ========================================================================

    floor.dispose(stage.graph_mut())?;
    crate_material.dispose(stage.graph_mut())?;
    rope.dispose(&mut stage)?;
    hinge.dispose(&mut stage)?;
    weight.dispose(stage.graph_mut())?;
    pendulum.dispose(stage.graph_mut())?;
    anchor.dispose(stage.graph_mut())?;

    if let Some(physics) = stage.remove_physics_backend()? {
        println!("physics after teardown: {:?}", physics.stats());
    }
    stage.shutdown()
}
