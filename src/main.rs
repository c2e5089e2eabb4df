use glam::{Quat, Vec3};

use scenerig::camera_view::spawn_shadow_light;
use scenerig::geometry::Geometry;
use scenerig::material::Material;
use scenerig::scene::Component;
use scenerig::{Color, EngineConfig, MeshData, Transform, run_editor};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::new()
        .title("Scenerig")
        .size(1024, 768)
        .device_size(800.0, 600.0);
    let light_config = config.clone();

    let result = run_editor(config, move |scene, library, backend| {
        let cube = library.add_mesh(MeshData::cube(80.0));
        let sphere = library.add_mesh(MeshData::sphere(50.0, 24, 16));
        let floor = library.add_mesh(MeshData::quad(800.0, 600.0));

        let ground = scene.spawn_child(scene.root(), "floor")?;
        scene.set_transform(ground, Transform::from_position(Vec3::new(400.0, 300.0, -60.0)))?;
        scene.add_component(ground, Component::Geometry(Geometry::model(floor).with_pickable(false)))?;
        scene.add_component(
            ground,
            Component::Material(Material::new().with_diffuse(Color::grey(0.8))),
        )?;

        let colors = [
            Color::rgb(0.85, 0.3, 0.25),
            Color::rgb(0.3, 0.7, 0.35),
            Color::rgb(0.25, 0.45, 0.85),
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let entity = scene.spawn_child(scene.root(), format!("cube {i}"))?;
            let transform = Transform::from_position(Vec3::new(200.0 + 200.0 * i as f32, 220.0, 0.0))
                .rotation(Quat::from_rotation_z(0.3 * i as f32));
            scene.set_transform(entity, transform)?;
            scene.add_component(entity, Component::Geometry(Geometry::model(cube)))?;
            scene.add_component(entity, Component::Material(Material::new().with_diffuse(color)))?;
        }

        // a group, so dragging the sphere moves its moon along
        let sphere_entity = scene.spawn_child(scene.root(), "sphere")?;
        scene.set_transform(sphere_entity, Transform::from_position(Vec3::new(400.0, 420.0, 0.0)))?;
        scene.add_component(sphere_entity, Component::Geometry(Geometry::model(sphere)))?;
        scene.add_component(
            sphere_entity,
            Component::Material(Material::new().with_diffuse(Color::rgba(0.9, 0.8, 0.3, 0.7))),
        )?;
        let moon = scene.spawn_child(sphere_entity, "moon")?;
        scene.set_transform(
            moon,
            Transform::from_position(Vec3::new(90.0, 0.0, 20.0)).uniform_scale(0.3),
        )?;
        scene.add_component(moon, Component::Geometry(Geometry::model(sphere)))?;

        let light = spawn_shadow_light(scene, backend, &light_config)?;
        scene.set_transform(
            light,
            Transform::from_position(Vec3::new(400.0, 300.0, 1000.0))
                .rotation(Quat::from_rotation_x(-0.2)),
        )?;
        Ok(())
    });

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
