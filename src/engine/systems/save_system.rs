// ============================================
// Save System - Сохранение и загрузка мира
// ============================================
// Сохранение: агрегаты -> записи -> чанки -> файл и/или удалённое хранилище.
// Загрузка: файл (или удалённое хранилище) -> декодирование целиком ->
// спавн по кадрам -> finalize_load -> удаление прежних агрегатов.
// При любой ошибке прежний мир остаётся как был.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::engine::core::{CubeSpawner, CubeWorld, WorldConfig};
use crate::engine::save::remote::{fetch_world, push_world};
use crate::engine::save::{MemoryRemoteStore, RemoteChunkStore, SaveError, SaveSlot, WorldFile, WorldSave};
use super::spawn_scheduler::{SpawnStatus, SpawnTask};

/// Куда писать сохранение
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    /// Локальный слот (None - без файла)
    pub slot: Option<SaveSlot>,
    /// Отправить чанки в удалённое хранилище
    pub remote: bool,
}

impl SaveTarget {
    pub fn local(slot: SaveSlot) -> Self {
        Self { slot: Some(slot), remote: false }
    }

    pub fn remote() -> Self {
        Self { slot: None, remote: true }
    }

    pub fn both(slot: SaveSlot) -> Self {
        Self { slot: Some(slot), remote: true }
    }
}

/// Координатор сохранения/загрузки
pub struct PersistenceOrchestrator<R: RemoteChunkStore = MemoryRemoteStore> {
    config: WorldConfig,
    remote: Option<R>,
    spawner: Option<Box<dyn CubeSpawner>>,
}

impl<R: RemoteChunkStore> PersistenceOrchestrator<R> {
    pub fn new(config: WorldConfig) -> Self {
        Self { config, remote: None, spawner: None }
    }

    pub fn with_remote(mut self, remote: R) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn set_spawner(&mut self, spawner: Box<dyn CubeSpawner>) {
        self.spawner = Some(spawner);
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    /// Слот по умолчанию из конфигурации
    pub fn default_slot(&self) -> SaveSlot {
        SaveSlot::Named(self.config.world_name.clone())
    }

    // ---------- Сохранение ----------

    /// Снимок мира, разложенный по чанкам
    pub fn build_save(&self, world: &CubeWorld) -> WorldSave {
        let chunks = world.chunk_index().organize_into_chunks(world.get_save_data());
        WorldSave::from_chunks(self.config.world_name.clone(), chunks)
    }

    /// Записать готовый снимок; путь файла, если был локальный слот
    pub async fn write_save(&self, save: &WorldSave, target: &SaveTarget) -> Result<Option<PathBuf>, SaveError> {
        let path = match &target.slot {
            Some(slot) => Some(WorldFile::save(&self.config.save_dir, slot, save)?),
            None => None,
        };

        if target.remote {
            let remote = self.remote.as_ref().ok_or(SaveError::MissingCollaborator("remote chunk store"))?;
            let pushed = push_world(remote, &self.config.world_id, save).await?;
            log::debug!("[SAVE] Отправлено чанков: {}", pushed);
        }

        Ok(path)
    }

    /// Сохранить мир целиком и сбросить грязные чанки
    pub async fn save(&self, world: &mut CubeWorld, target: &SaveTarget) -> Result<Option<PathBuf>, SaveError> {
        let save = self.build_save(world);
        let path = self.write_save(&save, target).await?;
        world.chunk_index_mut().clear_dirty();

        log::info!(
            "[SAVE] Мир '{}' сохранён: {} кубов в {} чанках{}",
            save.name,
            save.cube_count(),
            save.chunk_count(),
            path.as_ref().map(|p| format!(" ({})", p.display())).unwrap_or_default()
        );
        Ok(path)
    }

    /// Сохранить, ошибку только залогировать
    pub async fn save_world(&self, world: &mut CubeWorld, target: &SaveTarget) -> bool {
        match self.save(world, target).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("[SAVE] Ошибка сохранения: {}", e);
                false
            }
        }
    }

    // ---------- Загрузка ----------

    /// Прочитать и декодировать сохранение: локально, иначе удалённо
    pub async fn read_save(&self, slot: &SaveSlot) -> Result<WorldSave, SaveError> {
        let local = WorldFile::load(&self.config.save_dir, slot);
        match (local, &self.remote) {
            (Ok(save), _) => Ok(save),
            (Err(e), Some(remote)) => {
                log::warn!("[LOAD] Локальное сохранение недоступно ({}), пробуем удалённое", e);
                fetch_world(remote, &self.config.world_id, slot.base_name()).await
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Заменить мир сохранением; возвращает число созданных кубов.
    /// Старые агрегаты живут до конца спавна и удаляются только при успехе.
    pub async fn load(&mut self, world: &mut CubeWorld, slot: &SaveSlot) -> Result<usize, SaveError> {
        if self.spawner.is_none() {
            return Err(SaveError::MissingCollaborator("cube spawner"));
        }

        let save = self.read_save(slot).await?;
        let name = save.name.clone();
        let records = save.into_records();

        let previous = world.aggregate_ids();
        let index_before = world.chunk_index().clone();
        let suspend = self.config.suspend_physics_during_load;
        if suspend {
            world.physics_mut().suspend();
        }

        let spawner = self.spawner.as_deref_mut().ok_or(SaveError::MissingCollaborator("cube spawner"))?;
        let mut task = world.load_from_data(records, true);
        let result = drive(&mut task, world, spawner).await;

        if suspend {
            world.physics_mut().resume();
        }
        if let Err(e) = result {
            // Задача уже удалила своё, старый мир не тронут
            *world.chunk_index_mut() = index_before;
            return Err(e);
        }

        for id in previous {
            world.destroy_aggregate(id);
        }
        world.clear_detached();
        world.chunk_index_mut().clear_dirty();

        log::info!(
            "[LOAD] Мир '{}' загружен: {} кубов, {} агрегатов",
            name,
            task.spawned(),
            world.aggregate_count()
        );
        Ok(task.spawned())
    }

    /// Загрузить, ошибку только залогировать
    pub async fn load_world(&mut self, world: &mut CubeWorld, slot: &SaveSlot) -> bool {
        match self.load(world, slot).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("[LOAD] Ошибка загрузки: {}", e);
                false
            }
        }
    }
}

/// Шагать задачу, уступая управление между кадрами
async fn drive(task: &mut SpawnTask, world: &mut CubeWorld, spawner: &mut dyn CubeSpawner) -> Result<(), SaveError> {
    loop {
        match task.step(world, spawner)? {
            SpawnStatus::InProgress => yield_now().await,
            SpawnStatus::Finished => return Ok(()),
        }
    }
}

/// Отдать управление исполнителю один раз
fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
