// ============================================
// Save System - Чанковое сохранение мира
// ============================================
// Бинарный формат фиксированной ширины: запись куба -> чанк -> мир

mod error;
mod record;
mod chunk;
mod chunk_index;
mod world_save;
mod world_file;
pub mod remote;

pub use error::SaveError;
pub use record::{CubeRecord, CUBE_RECORD_SIZE, POSITION_SCALE, to_fixed, from_fixed, fixed_units};
pub use chunk::{Chunk, ChunkCoord, CHUNK_HEADER_SIZE};
pub use chunk_index::ChunkIndex;
pub use world_save::{WorldSave, now_millis, peek_header};
pub use world_file::{WorldFile, SaveSlot, SAVE_EXTENSION};
pub use remote::{RemoteChunkStore, MemoryRemoteStore, ChunkDocument};
