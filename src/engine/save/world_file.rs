// ============================================
// World File - Чтение/запись файла мира
// ============================================
// Один файл = один WorldSave. Слот либо именованный (<name>.cubes),
// либо с меткой времени (<name>_<millis>.cubes, грузится самый свежий).
// Запись через временный файл + rename: частичный файл не остаётся.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::SaveError;
use super::world_save::WorldSave;

/// Расширение файлов сохранения
pub const SAVE_EXTENSION: &str = "cubes";

/// Куда писать сохранение
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveSlot {
    /// Один перезаписываемый файл
    Named(String),
    /// Новый файл на каждое сохранение
    Timestamped(String),
}

impl SaveSlot {
    pub fn base_name(&self) -> &str {
        match self {
            SaveSlot::Named(name) | SaveSlot::Timestamped(name) => name,
        }
    }
}

/// Основной интерфейс для работы с файлом мира
pub struct WorldFile;

impl WorldFile {
    /// Путь файла для записи
    pub fn path_for(dir: &Path, slot: &SaveSlot, timestamp: i64) -> PathBuf {
        match slot {
            SaveSlot::Named(name) => dir.join(format!("{}.{}", name, SAVE_EXTENSION)),
            SaveSlot::Timestamped(name) => dir.join(format!("{}_{}.{}", name, timestamp, SAVE_EXTENSION)),
        }
    }

    /// Найти существующий файл слота (для Timestamped - самый свежий)
    pub fn resolve_existing(dir: &Path, slot: &SaveSlot) -> Option<PathBuf> {
        match slot {
            SaveSlot::Named(_) => {
                let path = Self::path_for(dir, slot, 0);
                path.is_file().then_some(path)
            }
            SaveSlot::Timestamped(name) => {
                let prefix = format!("{}_", name);
                fs::read_dir(dir)
                    .ok()?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.extension().map_or(false, |ext| ext == SAVE_EXTENSION))
                    .filter_map(|path| {
                        let stem = path.file_stem()?.to_str()?;
                        let stamp = stem.strip_prefix(&prefix)?.parse::<i64>().ok()?;
                        Some((stamp, path))
                    })
                    .max_by_key(|(stamp, _)| *stamp)
                    .map(|(_, path)| path)
            }
        }
    }

    /// Атомарная запись: temp -> fsync -> rename
    pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SaveError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension(format!("{}.tmp", SAVE_EXTENSION));
        let result = (|| -> Result<(), SaveError> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&tmp, path)?;
            Ok(())
        })();

        if result.is_err() {
            fs::remove_file(&tmp).ok();
        }
        result
    }

    /// Сохранить мир в слот, вернуть путь файла
    pub fn save(dir: &Path, slot: &SaveSlot, world: &WorldSave) -> Result<PathBuf, SaveError> {
        let path = Self::path_for(dir, slot, world.timestamp);
        Self::write_atomic(&path, &world.encode())?;
        Ok(path)
    }

    /// Загрузить мир из слота
    pub fn load(dir: &Path, slot: &SaveSlot) -> Result<WorldSave, SaveError> {
        let path = Self::resolve_existing(dir, slot)
            .ok_or_else(|| SaveError::NotFound(format!("{} in {}", slot.base_name(), dir.display())))?;
        let bytes = fs::read(&path)?;
        WorldSave::decode(&bytes)
    }
}
