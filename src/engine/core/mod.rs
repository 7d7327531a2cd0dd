// ============================================
// Core Module - Мир, конфигурация, ID, интерфейсы
// ============================================

mod config;
mod ids;
mod collaborators;
mod world;

pub use config::{
    WorldConfig, SAVE_DIR, DEFAULT_SLOT, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_CUBES_PER_FRAME, DEFAULT_MIN_BATCH_SIZE, DEFAULT_RECOMBINE_DELAY,
};
pub use ids::{AggregateId, AggregateIdAllocator};
pub use collaborators::{
    NodeHandle, VisualCombiner, CubeSpawner, HitObject, RaycastHit,
    HeadlessSpawner, HeadlessCombiner,
};
pub use world::{CubeWorld, DetachOutcome, DetachedCube};
pub(crate) use world::translation_pose;
