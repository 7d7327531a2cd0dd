// ============================================
// Physics Module - Твёрдые тела агрегатов
// ============================================

mod convert;
mod world;

pub use convert::{from_na_isometry, to_na_isometry};
pub use world::{PhysicsWorld, CUBE_MASS, CUBE_HALF_EXTENT, GRAVITY};

pub use rapier3d::prelude::{ImpulseJointHandle, RigidBodyHandle};
