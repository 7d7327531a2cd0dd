// ============================================
// Cubeworks - Разрушаемые конструкции из кубов
// ============================================
// Агрегаты связанных кубов, разделение при отрыве,
// чанковое сохранение и потоковая загрузка мира

pub mod engine;

pub use engine::core::{CubeWorld, WorldConfig};
pub use engine::save::{CubeRecord, SaveError, WorldSave};
pub use engine::systems::{PersistenceOrchestrator, SpawnScheduler};
