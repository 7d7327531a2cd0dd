// ============================================
// Cubeworks - Демонстрация без рендера
// ============================================
// Строит стену, выбивает колонну, сохраняет и загружает мир

use ultraviolet::{Isometry3, Rotor3, Vec3};

use cubeworks::engine::core::{HeadlessCombiner, HeadlessSpawner, HitObject, RaycastHit};
use cubeworks::engine::cubes::{CubeCell, CubeColor, CubeHandle, STONE};
use cubeworks::engine::systems::SaveTarget;
use cubeworks::{CubeWorld, PersistenceOrchestrator, WorldConfig};

const WALL_WIDTH: usize = 6;
const WALL_HEIGHT: usize = 4;

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match WorldConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[CONFIG] {}", e);
                std::process::exit(1);
            }
        },
        None => WorldConfig::default(),
    };

    println!("=== Cubeworks ===");
    println!("Save dir: {}", config.save_dir.display());
    println!("Chunk size: {}, spawn budget: {}", config.chunk_size, config.frame_budget());
    println!("=================");

    let mut world = CubeWorld::new(config.clone());
    world.set_visual_combiner(Box::new(HeadlessCombiner::new()));

    // Стена на земле
    let wall = world.create_aggregate(Isometry3::new(Vec3::new(0.0, 0.5, 0.0), Rotor3::identity()));
    for y in 0..WALL_HEIGHT {
        for x in 0..WALL_WIDTH {
            let shade = (x + y) as f32 / (WALL_WIDTH + WALL_HEIGHT) as f32;
            let color = CubeColor::quantized(0.4 + shade * 0.5, 0.35, 0.3);
            world.add_cube(wall, CubeCell::new(Vec3::new(x as f32, y as f32, 0.0), color, STONE));
        }
    }
    println!("[DEMO] Стена: {} кубов, групп: {}", world.total_cube_count(), world.count_connected_groups(wall));

    // Верхний правый угол держится на тросе
    let corner = world
        .aggregate(wall)
        .and_then(|a| a.cube_at_local(Vec3::new((WALL_WIDTH - 1) as f32, (WALL_HEIGHT - 1) as f32, 0.0)));
    if let Some(cube) = corner {
        world.attach_tether(CubeHandle::new(wall, cube), Vec3::new(WALL_WIDTH as f32, 8.0, 0.0));
    }

    // Выбиваем колонну x = 2 снизу вверх
    for y in 0..WALL_HEIGHT {
        let hit = RaycastHit {
            point: Vec3::new(2.0, 0.5 + y as f32, -0.5),
            hit_object: HitObject::Aggregate(wall),
        };
        if let Some(outcome) = world.detach_at(&hit) {
            println!("[DEMO] Куб выбит, отделилось агрегатов: {}", outcome.split_into.len());
        }
    }

    for _ in 0..30 {
        world.tick(1.0 / 60.0);
    }
    println!(
        "[DEMO] Агрегатов: {}, кубов в агрегатах: {}, свободных: {}",
        world.aggregate_count(),
        world.total_cube_count(),
        world.detached_cubes().len()
    );

    let mut orchestrator: PersistenceOrchestrator = PersistenceOrchestrator::new(config);
    orchestrator.set_spawner(Box::new(HeadlessSpawner::new()));
    let slot = orchestrator.default_slot();

    if !pollster::block_on(orchestrator.save_world(&mut world, &SaveTarget::local(slot.clone()))) {
        std::process::exit(1);
    }
    if !pollster::block_on(orchestrator.load_world(&mut world, &slot)) {
        std::process::exit(1);
    }

    println!(
        "[SAVE] После загрузки: {} агрегатов, {} кубов",
        world.aggregate_count(),
        world.total_cube_count()
    );
}
