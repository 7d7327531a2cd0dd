// ============================================
// Config - Настройки мира и сохранения
// ============================================

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Директория сохранений по умолчанию
pub const SAVE_DIR: &str = "saves";

/// Имя слота по умолчанию
pub const DEFAULT_SLOT: &str = "world";

/// Размер чанка сохранения (в мировых единицах)
pub const DEFAULT_CHUNK_SIZE: f32 = 32.0;

/// Сколько кубов спавнить за кадр при загрузке
pub const DEFAULT_MAX_CUBES_PER_FRAME: usize = 64;

/// Нижняя граница пачки спавна
pub const DEFAULT_MIN_BATCH_SIZE: usize = 16;

/// Задержка склейки визуала после добавления куба (сек)
pub const DEFAULT_RECOMBINE_DELAY: f32 = 0.15;

/// Настройки мира
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub chunk_size: f32,
    pub max_cubes_per_frame: usize,
    pub min_batch_size: usize,
    pub recombine_delay: f32,
    pub save_dir: PathBuf,
    /// ID мира в удалённом хранилище
    pub world_id: String,
    pub world_name: String,
    /// Пауза физики на время массовой загрузки
    pub suspend_physics_during_load: bool,
}

impl WorldConfig {
    /// Загрузить из JSON строки
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Загрузить из файла
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config: {}", e))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.chunk_size > 0.0) {
            return Err(format!("chunk_size must be positive, got {}", self.chunk_size));
        }
        if self.recombine_delay < 0.0 {
            return Err(format!("recombine_delay must not be negative, got {}", self.recombine_delay));
        }
        Ok(())
    }

    /// Кубов за один шаг спавна
    pub fn frame_budget(&self) -> usize {
        self.max_cubes_per_frame.max(self.min_batch_size).max(1)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_cubes_per_frame: DEFAULT_MAX_CUBES_PER_FRAME,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            recombine_delay: DEFAULT_RECOMBINE_DELAY,
            save_dir: PathBuf::from(SAVE_DIR),
            world_id: DEFAULT_SLOT.to_string(),
            world_name: DEFAULT_SLOT.to_string(),
            suspend_physics_during_load: true,
        }
    }
}
