// ============================================
// Chunk Index - Раскладка записей по чанкам
// ============================================
// Чанк считается по квантованной позиции, чтобы запись
// после загрузки попадала в тот же чанк, что и при сохранении

use std::collections::{BTreeMap, BTreeSet};

use super::chunk::{Chunk, ChunkCoord};
use super::record::CubeRecord;

/// Индекс чанков + множество грязных чанков
#[derive(Debug, Clone)]
pub struct ChunkIndex {
    chunk_size: f32,
    /// Чанки, изменённые с последнего сохранения (пока только информативно)
    dirty: BTreeSet<ChunkCoord>,
}

impl ChunkIndex {
    pub fn new(chunk_size: f32) -> Self {
        Self {
            chunk_size,
            dirty: BTreeSet::new(),
        }
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    #[inline]
    pub fn coord_of(&self, pos: [f32; 3]) -> ChunkCoord {
        ChunkCoord::from_world(pos, self.chunk_size)
    }

    /// Сгруппировать плоский список записей по чанкам
    pub fn organize_into_chunks(&self, records: impl IntoIterator<Item = CubeRecord>) -> BTreeMap<ChunkCoord, Chunk> {
        let mut chunks: BTreeMap<ChunkCoord, Chunk> = BTreeMap::new();
        for record in records {
            let coord = self.coord_of(record.quantized_position());
            chunks
                .entry(coord)
                .or_insert_with(|| Chunk::new(coord))
                .records
                .push(record);
        }
        chunks
    }

    /// Пометить чанк по мировой позиции
    pub fn mark_dirty(&mut self, pos: [f32; 3]) {
        let coord = self.coord_of(pos);
        self.dirty.insert(coord);
    }

    pub fn mark_dirty_coord(&mut self, coord: ChunkCoord) {
        self.dirty.insert(coord);
    }

    pub fn is_dirty(&self, coord: &ChunkCoord) -> bool {
        self.dirty.contains(coord)
    }

    pub fn dirty_chunks(&self) -> impl Iterator<Item = &ChunkCoord> {
        self.dirty.iter()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}
