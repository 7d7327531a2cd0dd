// ============================================
// Systems Module - Спавн и сохранение
// ============================================

mod spawn_scheduler;
mod save_system;

pub use spawn_scheduler::{CancellationToken, SpawnScheduler, SpawnStatus, SpawnTask};
pub use save_system::{PersistenceOrchestrator, SaveTarget};
