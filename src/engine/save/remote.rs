// ============================================
// Remote Store - Удалённое хранилище чанков
// ============================================
// Схема: worlds/{worldId}/chunks/{chunkId} -> { data: base64(chunk), timestamp }
// Каждый чанк - отдельный документ

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::chunk::{Chunk, ChunkCoord};
use super::error::SaveError;
use super::world_save::WorldSave;

/// Документ чанка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDocument {
    /// base64 байтов чанка
    pub data: String,
    pub timestamp: i64,
}

impl ChunkDocument {
    pub fn from_chunk(chunk: &Chunk, timestamp: i64) -> Self {
        Self {
            data: STANDARD.encode(chunk.encode()),
            timestamp,
        }
    }

    pub fn decode_chunk(&self) -> Result<Chunk, SaveError> {
        let bytes = STANDARD
            .decode(&self.data)
            .map_err(|_| SaveError::Decode("chunk document is not base64"))?;
        Chunk::decode(&bytes)
    }
}

/// Коллекция чанков мира
pub fn chunks_collection(world_id: &str) -> String {
    format!("worlds/{}/chunks", world_id)
}

/// Путь документа чанка
pub fn chunk_document_path(world_id: &str, coord: &ChunkCoord) -> String {
    format!("{}/{}", chunks_collection(world_id), coord.document_id())
}

/// Удалённое key-value хранилище документов
#[allow(async_fn_in_trait)]
pub trait RemoteChunkStore {
    async fn put_document(&self, path: &str, document: &ChunkDocument) -> Result<(), SaveError>;

    /// Все документы коллекции: (id документа, документ)
    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, ChunkDocument)>, SaveError>;
}

/// Отправить все чанки мира, вернуть число документов
pub async fn push_world<S: RemoteChunkStore>(store: &S, world_id: &str, world: &WorldSave) -> Result<usize, SaveError> {
    for (coord, chunk) in &world.chunks {
        let document = ChunkDocument::from_chunk(chunk, world.timestamp);
        store.put_document(&chunk_document_path(world_id, coord), &document).await?;
    }
    Ok(world.chunks.len())
}

/// Собрать мир из документов чанков; границы пересчитываются
pub async fn fetch_world<S: RemoteChunkStore>(store: &S, world_id: &str, name: &str) -> Result<WorldSave, SaveError> {
    let documents = store.list_documents(&chunks_collection(world_id)).await?;
    if documents.is_empty() {
        return Err(SaveError::NotFound(format!("remote world {}", world_id)));
    }

    let mut chunks = BTreeMap::new();
    let mut timestamp = i64::MIN;
    for (id, document) in documents {
        let chunk = document.decode_chunk()?;
        if ChunkCoord::parse_document_id(&id) != Some(chunk.coord) {
            return Err(SaveError::Decode("chunk document id does not match its coordinate"));
        }
        timestamp = timestamp.max(document.timestamp);
        chunks.insert(chunk.coord, chunk);
    }

    Ok(WorldSave::from_chunks(name, chunks).with_timestamp(timestamp))
}

/// Хранилище в памяти (документы лежат как JSON)
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    documents: RwLock<BTreeMap<String, String>>,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Имитировать недоступность сервера
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    /// Сырой JSON документа
    pub fn raw_document(&self, path: &str) -> Option<String> {
        self.documents.read().ok()?.get(path).cloned()
    }

    fn check_online(&self) -> Result<(), SaveError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SaveError::Remote("store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl RemoteChunkStore for MemoryRemoteStore {
    async fn put_document(&self, path: &str, document: &ChunkDocument) -> Result<(), SaveError> {
        self.check_online()?;
        let json = serde_json::to_string(document).map_err(|e| SaveError::Remote(e.to_string()))?;
        self.documents
            .write()
            .map_err(|_| SaveError::Remote("store lock poisoned".into()))?
            .insert(path.to_string(), json);
        Ok(())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, ChunkDocument)>, SaveError> {
        self.check_online()?;
        let prefix = format!("{}/", collection);
        let documents = self.documents.read().map_err(|_| SaveError::Remote("store lock poisoned".into()))?;

        documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, json)| -> Result<(String, ChunkDocument), SaveError> {
                let document: ChunkDocument = serde_json::from_str(json)
                    .map_err(|e| SaveError::Remote(format!("bad document {}: {}", path, e)))?;
                Ok((path[prefix.len()..].to_string(), document))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cubes::CubeColor;
    use crate::engine::save::CubeRecord;

    fn world() -> WorldSave {
        let mut chunks = BTreeMap::new();
        for x in [-1, 0, 2] {
            let coord = ChunkCoord::new(x, 0, 1);
            let mut chunk = Chunk::new(coord);
            chunk.records.push(CubeRecord::new(
                [x as f32 * 32.0 + 0.5, 1.0, 40.0],
                CubeColor::WHITE,
                1,
                3,
                [0.0, 0.0, 0.0, 1.0],
            ));
            chunks.insert(coord, chunk);
        }
        WorldSave::from_chunks("remote", chunks).with_timestamp(77)
    }

    #[test]
    fn world_goes_through_remote_documents() {
        let store = MemoryRemoteStore::new();
        let original = world();

        let pushed = pollster::block_on(push_world(&store, "w1", &original)).unwrap();
        assert_eq!(pushed, 3);
        assert_eq!(store.document_count(), 3);

        let fetched = pollster::block_on(fetch_world(&store, "w1", "remote")).unwrap();
        assert_eq!(fetched, original);
    }

    #[test]
    fn documents_follow_the_schema() {
        let store = MemoryRemoteStore::new();
        pollster::block_on(push_world(&store, "w1", &world())).unwrap();

        let raw = store.raw_document("worlds/w1/chunks/0_0_1").unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["data"].is_string());
        assert_eq!(value["timestamp"], 77);
    }

    #[test]
    fn other_worlds_are_not_listed() {
        let store = MemoryRemoteStore::new();
        pollster::block_on(push_world(&store, "w1", &world())).unwrap();
        pollster::block_on(push_world(&store, "w10", &world())).unwrap();

        let docs = pollster::block_on(store.list_documents(&chunks_collection("w1"))).unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn offline_store_reports_remote_error() {
        let store = MemoryRemoteStore::new();
        store.set_offline(true);
        let err = pollster::block_on(push_world(&store, "w1", &world())).unwrap_err();
        assert!(matches!(err, SaveError::Remote(_)));
    }

    #[test]
    fn missing_remote_world_is_not_found() {
        let store = MemoryRemoteStore::new();
        let err = pollster::block_on(fetch_world(&store, "ghost", "x")).unwrap_err();
        assert!(matches!(err, SaveError::NotFound(_)));
    }
}
