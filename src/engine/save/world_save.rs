// ============================================
// World Save - Полное сохранённое состояние мира
// ============================================
// Формат:
// i32 name_len | name (UTF-8) | WorldHeader (i32 min x,y,z | i32 max x,y,z | i64 timestamp)
// i32 chunk_count | chunk_count * (i32 byte_len | chunk bytes)
//
// Длины перед чанками позволяют читать частично и пропускать незнакомое

use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::chunk::{Chunk, ChunkCoord};
use super::error::SaveError;
use super::record::CubeRecord;

/// Текущее время в миллисекундах Unix
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Заголовок мира после имени (32 байта)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WorldHeader {
    bounds_min: [i32; 3],
    bounds_max: [i32; 3],
    timestamp: i64,
}

/// Размер WorldHeader на диске
const WORLD_HEADER_SIZE: usize = 32;

/// Сохранённый мир
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSave {
    pub name: String,
    pub bounds_min: [i32; 3],
    pub bounds_max: [i32; 3],
    pub timestamp: i64,
    pub chunks: BTreeMap<ChunkCoord, Chunk>,
}

impl WorldSave {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bounds_min: [0; 3],
            bounds_max: [0; 3],
            timestamp: now_millis(),
            chunks: BTreeMap::new(),
        }
    }

    /// Мир из готовых чанков, границы считаются по записям
    pub fn from_chunks(name: impl Into<String>, chunks: BTreeMap<ChunkCoord, Chunk>) -> Self {
        let mut save = Self { chunks, ..Self::new(name) };
        save.recompute_bounds();
        save
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Целочисленный AABB всех записей (по квантованным позициям)
    pub fn recompute_bounds(&mut self) {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        let mut any = false;

        for record in self.records() {
            let pos = record.quantized_position();
            for axis in 0..3 {
                min[axis] = min[axis].min(pos[axis]);
                max[axis] = max[axis].max(pos[axis]);
            }
            any = true;
        }

        if any {
            self.bounds_min = min.map(|v| v.floor() as i32);
            self.bounds_max = max.map(|v| v.ceil() as i32);
        } else {
            self.bounds_min = [0; 3];
            self.bounds_max = [0; 3];
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn cube_count(&self) -> usize {
        self.chunks.values().map(|c| c.len()).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &CubeRecord> {
        self.chunks.values().flat_map(|c| c.records.iter())
    }

    /// Развернуть все чанки в плоский список
    pub fn into_records(self) -> Vec<CubeRecord> {
        self.chunks.into_values().flat_map(|c| c.records).collect()
    }

    pub fn encode(&self) -> Vec<u8> {
        // Чанки кодируются параллельно, порядок сохраняется
        let encoded: Vec<Vec<u8>> = self.chunks.par_iter().map(|(_, chunk)| chunk.encode()).collect();

        let payload: usize = encoded.iter().map(|c| 4 + c.len()).sum();
        let mut out = Vec::with_capacity(4 + self.name.len() + WORLD_HEADER_SIZE + 4 + payload);
        let header = WorldHeader {
            bounds_min: self.bounds_min,
            bounds_max: self.bounds_max,
            timestamp: self.timestamp,
        };

        // Запись в Vec не падает
        let _ = bincode::serialize_into(&mut out, &(self.name.len() as i32));
        out.extend_from_slice(self.name.as_bytes());
        let _ = bincode::serialize_into(&mut out, &header);
        let _ = bincode::serialize_into(&mut out, &(encoded.len() as i32));
        for chunk in &encoded {
            let _ = bincode::serialize_into(&mut out, &(chunk.len() as i32));
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Декодировать мир; любая ошибка чанка отменяет всё
    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        let mut reader = Cursor::new(bytes);

        let name = read_name(&mut reader)?;
        let header: WorldHeader = bincode::deserialize_from(&mut reader)?;

        let chunk_count: i32 = bincode::deserialize_from(&mut reader)?;
        if chunk_count < 0 {
            return Err(SaveError::Decode("negative chunk count"));
        }

        // Ёмкость не больше остатка буфера
        let remaining = bytes.len() - reader.position() as usize;
        let mut payloads = Vec::with_capacity((chunk_count as usize).min(remaining / 4));
        for _ in 0..chunk_count {
            let len: i32 = bincode::deserialize_from(&mut reader)?;
            payloads.push(take(&mut reader, len, "chunk length out of range")?);
        }

        let trailing = bytes.len() - reader.position() as usize;
        if trailing > 0 {
            log::debug!("[LOAD] Пропущено {} байт после последнего чанка", trailing);
        }

        let decoded: Vec<Chunk> = payloads
            .par_iter()
            .map(|payload| Chunk::decode(payload))
            .collect::<Result<_, _>>()?;

        let mut chunks = BTreeMap::new();
        for chunk in decoded {
            if chunks.insert(chunk.coord, chunk).is_some() {
                return Err(SaveError::Decode("duplicate chunk coordinate"));
            }
        }

        Ok(Self {
            name,
            bounds_min: header.bounds_min,
            bounds_max: header.bounds_max,
            timestamp: header.timestamp,
            chunks,
        })
    }
}

/// Срез длиной `len` от текущей позиции
fn take<'a>(reader: &mut Cursor<&'a [u8]>, len: i32, what: &'static str) -> Result<&'a [u8], SaveError> {
    let start = reader.position() as usize;
    let data: &'a [u8] = *reader.get_ref();
    if len < 0 || start + len as usize > data.len() {
        return Err(SaveError::Decode(what));
    }
    let end = start + len as usize;
    reader.set_position(end as u64);
    Ok(&data[start..end])
}

/// Имя мира с i32 префиксом длины
fn read_name(reader: &mut Cursor<&[u8]>) -> Result<String, SaveError> {
    let len: i32 = bincode::deserialize_from(&mut *reader)?;
    let bytes = take(reader, len, "name length out of range")?;
    String::from_utf8(bytes.to_vec()).map_err(|_| SaveError::Decode("world name is not UTF-8"))
}

/// Прочитать только заголовок (имя, время) без чанков
pub fn peek_header(bytes: &[u8]) -> Result<(String, i64), SaveError> {
    let mut reader = Cursor::new(bytes);
    let name = read_name(&mut reader)?;
    let header: WorldHeader = bincode::deserialize_from(&mut reader)?;
    Ok((name, header.timestamp))
}
