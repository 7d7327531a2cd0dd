// ============================================
// Cubes Module - Кубы, сетка, связность, агрегаты
// ============================================

mod types;
mod grid;
mod connectivity;
mod debounce;
mod accessory;
mod aggregate;

pub use types::{
    BlockType, CubeId, CubeColor, CubeCell, CubeHandle, quantize_channel,
    EMPTY_CELL, COLOR_LEVELS, PLAIN, WOOD, STONE, METAL, GLASS,
};
pub use grid::{CubeGrid, NEIGHBOR_OFFSETS};
pub use connectivity::{
    find_groups, plan_split, group_by_world_position, ConnectedGroup, SplitPlan,
    NEIGHBOR_DISTANCE_UNITS, POSITION_TOLERANCE_UNITS,
};
pub use debounce::Debounce;
pub use accessory::{Accessory, AccessoryKind};
pub use aggregate::{Aggregate, AggregateState};
