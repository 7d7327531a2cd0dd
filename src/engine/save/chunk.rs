// ============================================
// Chunk - Пространственный бакет записей
// ============================================
// Формат: i32 cx,cy,cz | i32 count | count * CubeRecord

use std::io::{Cursor, Write};

use serde::{Deserialize, Serialize};

use super::error::SaveError;
use super::record::{CubeRecord, CUBE_RECORD_SIZE};

/// Размер заголовка чанка
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Координата чанка = floor(pos / chunk_size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Чанк для мировой позиции
    pub fn from_world(pos: [f32; 3], chunk_size: f32) -> Self {
        Self {
            x: (pos[0] / chunk_size).floor() as i32,
            y: (pos[1] / chunk_size).floor() as i32,
            z: (pos[2] / chunk_size).floor() as i32,
        }
    }

    /// ID документа в удалённом хранилище
    pub fn document_id(&self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }

    pub fn parse_document_id(id: &str) -> Option<Self> {
        let mut parts = id.split('_').map(|p| p.parse::<i32>().ok());
        let coord = Self::new(parts.next()??, parts.next()??, parts.next()??);
        if parts.next().is_some() {
            return None;
        }
        Some(coord)
    }
}

/// Заголовок чанка на диске
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ChunkHeader {
    x: i32,
    y: i32,
    z: i32,
    count: i32,
}

/// Чанк: координата и упорядоченный список записей
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub coord: ChunkCoord,
    pub records: Vec<CubeRecord>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord) -> Self {
        Self { coord, records: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Размер в байтах после кодирования
    pub fn encoded_len(&self) -> usize {
        CHUNK_HEADER_SIZE + self.records.len() * CUBE_RECORD_SIZE
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        // Запись в Vec не падает
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to<W: Write>(&self, w: &mut W) -> bincode::Result<()> {
        let header = ChunkHeader {
            x: self.coord.x,
            y: self.coord.y,
            z: self.coord.z,
            count: self.records.len() as i32,
        };
        bincode::serialize_into(&mut *w, &header)?;
        for record in &self.records {
            record.write_to(w)?;
        }
        Ok(())
    }

    /// Декодировать чанк; длина обязана точно совпадать с count
    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(SaveError::Decode("chunk header truncated"));
        }

        let mut reader = Cursor::new(bytes);
        let header: ChunkHeader = bincode::deserialize_from(&mut reader)?;
        if header.count < 0 {
            return Err(SaveError::Decode("negative record count"));
        }

        let coord = ChunkCoord::new(header.x, header.y, header.z);
        let count = header.count as usize;
        if bytes.len() - CHUNK_HEADER_SIZE != count * CUBE_RECORD_SIZE {
            return Err(SaveError::Decode("chunk length does not match record count"));
        }

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(CubeRecord::read_from(&mut reader)?);
        }

        Ok(Self { coord, records })
    }
}
