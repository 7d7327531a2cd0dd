// ============================================
// Collaborators - Интерфейсы внешних систем
// ============================================
// Рендер (склейка мешей), ввод (raycast), спавнер визуальных узлов

use std::collections::HashSet;

use ultraviolet::Vec3;

use crate::engine::cubes::CubeHandle;
use crate::engine::save::CubeRecord;
use super::ids::AggregateId;

/// Непрозрачный визуальный узел от спавнера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Склейка мешей агрегата
pub trait VisualCombiner {
    fn rebuild_visual(&mut self, aggregate: AggregateId);
    fn is_combined(&self, aggregate: AggregateId) -> bool;
}

/// Создание визуального узла куба при загрузке
pub trait CubeSpawner {
    /// None - спавн не удался, загрузка прерывается
    fn spawn_cube(&mut self, record: &CubeRecord, parent: AggregateId) -> Option<NodeHandle>;
}

/// Во что попал луч
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitObject {
    Cube(CubeHandle),
    Aggregate(AggregateId),
}

/// Результат raycast от камеры
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub point: Vec3,
    pub hit_object: HitObject,
}

/// Спавнер без рендера: просто выдаёт номера узлов
#[derive(Debug, Default)]
pub struct HeadlessSpawner {
    next: u64,
}

impl HeadlessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> u64 {
        self.next
    }
}

impl CubeSpawner for HeadlessSpawner {
    fn spawn_cube(&mut self, _record: &CubeRecord, _parent: AggregateId) -> Option<NodeHandle> {
        self.next += 1;
        Some(NodeHandle(self.next))
    }
}

/// Склейка без рендера: помнит, какие агрегаты собраны
#[derive(Debug, Default)]
pub struct HeadlessCombiner {
    combined: HashSet<AggregateId>,
    rebuilds: usize,
}

impl HeadlessCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

impl VisualCombiner for HeadlessCombiner {
    fn rebuild_visual(&mut self, aggregate: AggregateId) {
        self.rebuilds += 1;
        self.combined.insert(aggregate);
    }

    fn is_combined(&self, aggregate: AggregateId) -> bool {
        self.combined.contains(&aggregate)
    }
}
