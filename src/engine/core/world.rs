// ============================================
// Cube World - Агрегаты, оторванные кубы, физика
// ============================================
// Владеет всеми агрегатами (арена по ID), телами rapier и индексом чанков.
// Мутация -> пересборка сетки -> связность -> разделение при необходимости.

use std::collections::BTreeMap;

use ultraviolet::{Isometry3, Rotor3, Vec3};

use crate::engine::cubes::{
    plan_split, Accessory, AccessoryKind, Aggregate, AggregateState, CubeCell, CubeHandle, CubeId,
};
use crate::engine::physics::{ImpulseJointHandle, PhysicsWorld, RigidBodyHandle};
use crate::engine::save::{ChunkIndex, CubeRecord};
use crate::engine::systems::SpawnTask;
use super::collaborators::{HitObject, RaycastHit, VisualCombiner};
use super::config::WorldConfig;
use super::ids::{AggregateId, AggregateIdAllocator};

/// Куб, оторванный от агрегата; живёт отдельным телом
#[derive(Debug, Clone)]
pub struct DetachedCube {
    pub cube: CubeCell,
    pub body: RigidBodyHandle,
    /// Агрегат, из которого вырван
    pub origin: AggregateId,
}

/// Что произошло при отрыве куба
#[derive(Debug, Clone, PartialEq)]
pub struct DetachOutcome {
    /// Тело оторванного куба
    pub body: RigidBodyHandle,
    /// Исходный агрегат опустел и удалён
    pub destroyed: bool,
    /// Новые агрегаты, отделившиеся от исходного
    pub split_into: Vec<AggregateId>,
}

/// Мир кубов
pub struct CubeWorld {
    config: WorldConfig,
    ids: AggregateIdAllocator,
    aggregates: BTreeMap<AggregateId, Aggregate>,
    detached: Vec<DetachedCube>,
    physics: PhysicsWorld,
    chunk_index: ChunkIndex,
    visuals: Option<Box<dyn VisualCombiner>>,
}

impl CubeWorld {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_allocator(config, AggregateIdAllocator::new())
    }

    /// Мир с заданным аллокатором ID
    pub fn with_allocator(config: WorldConfig, ids: AggregateIdAllocator) -> Self {
        let chunk_index = ChunkIndex::new(config.chunk_size);
        Self {
            config,
            ids,
            aggregates: BTreeMap::new(),
            detached: Vec::new(),
            physics: PhysicsWorld::new(),
            chunk_index,
            visuals: None,
        }
    }

    pub fn set_visual_combiner(&mut self, visuals: Box<dyn VisualCombiner>) {
        self.visuals = Some(visuals);
    }

    pub fn is_visual_combined(&self, id: AggregateId) -> bool {
        self.visuals.as_ref().map_or(false, |v| v.is_combined(id))
    }

    // ---------- Доступ ----------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.chunk_index
    }

    pub fn chunk_index_mut(&mut self) -> &mut ChunkIndex {
        &mut self.chunk_index
    }

    pub fn aggregate(&self, id: AggregateId) -> Option<&Aggregate> {
        self.aggregates.get(&id)
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &Aggregate> {
        self.aggregates.values()
    }

    pub fn aggregate_ids(&self) -> Vec<AggregateId> {
        self.aggregates.keys().copied().collect()
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregates.len()
    }

    pub fn detached_cubes(&self) -> &[DetachedCube] {
        &self.detached
    }

    /// Кубы во всех агрегатах (без оторванных)
    pub fn total_cube_count(&self) -> usize {
        self.aggregates.values().map(|a| a.cube_count()).sum()
    }

    // ---------- Жизненный цикл агрегата ----------

    /// Пустой агрегат с телом в заданной позе
    pub fn create_aggregate(&mut self, transform: Isometry3) -> AggregateId {
        self.spawn_aggregate(transform, false)
    }

    /// Агрегат для массовой вставки: тело выключено, пересчёт отложен
    pub fn begin_loading(&mut self, transform: Isometry3) -> AggregateId {
        self.spawn_aggregate(transform, true)
    }

    fn spawn_aggregate(&mut self, transform: Isometry3, loading: bool) -> AggregateId {
        let id = self.ids.allocate();
        let mut aggregate = Aggregate::new(id, transform, self.config.recombine_delay);
        aggregate.set_body(Some(self.physics.create_aggregate_body(&transform, !loading)));
        if loading {
            aggregate.set_state(AggregateState::Loading);
        }
        self.aggregates.insert(id, aggregate);
        log::debug!("[AGGREGATE] Создан {}{}", id, if loading { " (загрузка)" } else { "" });
        id
    }

    /// Добавить куб. В режиме загрузки O(1) без пересчёта.
    /// None если агрегата нет или ячейка уже занята.
    pub fn add_cube(&mut self, id: AggregateId, cell: CubeCell) -> Option<CubeId> {
        let aggregate = self.aggregates.get_mut(&id)?;

        if aggregate.is_loading() {
            return Some(aggregate.push_cube(cell));
        }

        if aggregate.cube_at_local(cell.local_pos).is_some() {
            log::warn!("[AGGREGATE] {}: ячейка {:?} уже занята", id, cell.local_pos);
            return None;
        }

        let world_pos = aggregate.transform().transform_vec(cell.local_pos);
        aggregate.push_cube(cell);
        aggregate.schedule_recombine();
        self.chunk_index.mark_dirty([world_pos.x, world_pos.y, world_pos.z]);

        self.rebuild(id);
        // Пересчёт сохраняет порядок, добавленный куб последний
        self.aggregates.get(&id).map(|a| a.cube_count() as CubeId)
    }

    /// Пересобрать сетку и коллайдеры; пустой агрегат удаляется
    fn rebuild(&mut self, id: AggregateId) -> bool {
        let Some(aggregate) = self.aggregates.get_mut(&id) else {
            return false;
        };

        aggregate.recompute();
        if aggregate.is_empty() {
            self.destroy_aggregate(id);
            return false;
        }

        if let Some(body) = aggregate.body() {
            self.physics.rebuild_cube_colliders(body, &aggregate.local_positions());
        }
        if aggregate.state() == AggregateState::Uninitialized {
            aggregate.set_state(AggregateState::Ready);
        }
        true
    }

    /// Полный пересчёт: сетка, масса, связность.
    /// Возвращает агрегаты, отделившиеся от этого.
    pub fn recompute(&mut self, id: AggregateId) -> Vec<AggregateId> {
        if !self.rebuild(id) {
            return Vec::new();
        }

        let created = self.split_disconnected(id);
        if !created.is_empty() {
            self.rebuild(id);
        }
        created
    }

    /// Разделить агрегат по связным группам; крупнейшая остаётся
    fn split_disconnected(&mut self, id: AggregateId) -> Vec<AggregateId> {
        let Some(plan) = self.aggregates.get(&id).and_then(|a| plan_split(a.find_groups())) else {
            return Vec::new();
        };

        let created: Vec<AggregateId> = plan
            .split_off
            .iter()
            .filter_map(|group| self.migrate_group(id, &group.ids))
            .collect();

        log::info!(
            "[SPLIT] {} остаётся с {} кубами, отделилось агрегатов: {}",
            id,
            plan.keep.len(),
            created.len()
        );
        created
    }

    /// Перенести кубы в новый агрегат с той же позой и скоростью
    fn migrate_group(&mut self, source: AggregateId, cubes: &[CubeId]) -> Option<AggregateId> {
        let aggregate = self.aggregates.get_mut(&source)?;
        let transform = *aggregate.transform();
        let velocity = aggregate.body().and_then(|b| self.physics.body_velocity(b));

        let mut moved = Vec::with_capacity(cubes.len());
        for &cube in cubes {
            for accessory in aggregate.take_accessories_of(cube) {
                release_accessory(&mut self.physics, &accessory);
            }
            if let Some(cell) = aggregate.take_cube(cube) {
                moved.push(cell);
            }
        }
        if moved.is_empty() {
            return None;
        }

        let new_id = self.create_aggregate(transform);
        let target = self.aggregates.get_mut(&new_id)?;
        for cell in moved {
            target.push_cube(cell);
        }
        target.schedule_recombine();
        self.rebuild(new_id);

        let body = self.aggregates.get(&new_id).and_then(|a| a.body());
        if let (Some((linear, angular)), Some(body)) = (velocity, body) {
            self.physics.set_body_velocity(body, linear, angular);
        }
        Some(new_id)
    }

    /// Оторвать куб: отдельное тело, проверка связности.
    /// None если куба нет или сетка на него не указывает.
    pub fn detach_cube(&mut self, handle: CubeHandle) -> Option<DetachOutcome> {
        let aggregate = self.aggregates.get_mut(&handle.aggregate)?;
        if aggregate.is_loading() {
            log::warn!("[AGGREGATE] {}: отрыв во время загрузки пропущен", handle.aggregate);
            return None;
        }

        let pose = aggregate.cube_pose(aggregate.cube(handle.cube)?);
        let velocity = aggregate.body().and_then(|b| self.physics.body_velocity(b));

        let accessories = aggregate.take_accessories_of(handle.cube);
        let mut cell = match aggregate.take_cube(handle.cube) {
            Some(cell) => cell,
            None => {
                log::warn!("[AGGREGATE] {}: сетка не указывает на куб {}", handle.aggregate, handle.cube);
                for accessory in accessories {
                    aggregate.add_accessory(accessory);
                }
                return None;
            }
        };
        for accessory in &accessories {
            release_accessory(&mut self.physics, accessory);
        }
        aggregate.schedule_recombine();
        let emptied = aggregate.is_empty();

        let body = self.physics.create_cube_body(&pose);
        if let Some((linear, angular)) = velocity {
            self.physics.set_body_velocity(body, linear, angular);
        }
        cell.detached = true;
        cell.local_pos = Vec3::zero();
        self.detached.push(DetachedCube { cube: cell, body, origin: handle.aggregate });

        let p = pose.translation;
        self.chunk_index.mark_dirty([p.x, p.y, p.z]);

        let outcome = if emptied {
            self.destroy_aggregate(handle.aggregate);
            DetachOutcome { body, destroyed: true, split_into: Vec::new() }
        } else {
            let split_into = self.recompute(handle.aggregate);
            DetachOutcome { body, destroyed: false, split_into }
        };

        log::debug!(
            "[AGGREGATE] Куб {} оторван от {} (удалён: {}, отделилось: {})",
            handle.cube,
            handle.aggregate,
            outcome.destroyed,
            outcome.split_into.len()
        );
        Some(outcome)
    }

    /// Оторвать куб под лучом
    pub fn detach_at(&mut self, hit: &RaycastHit) -> Option<DetachOutcome> {
        let handle = match hit.hit_object {
            HitObject::Cube(handle) => handle,
            HitObject::Aggregate(id) => {
                let cube = self.aggregates.get(&id)?.cube_at_world(hit.point)?;
                CubeHandle::new(id, cube)
            }
        };
        self.detach_cube(handle)
    }

    /// Перенести все кубы `source` в `target`, сохранив мировые позы.
    /// None если агрегатов нет, это один агрегат или кубы пересекаются.
    pub fn merge_aggregates(&mut self, target: AggregateId, source: AggregateId) -> Option<usize> {
        if target == source {
            return None;
        }
        let into = self.aggregates.get(&target)?;
        let from = self.aggregates.get(&source)?;
        if into.is_loading() || from.is_loading() {
            return None;
        }

        let inverse = into.transform().inversed();
        let inverse_rotation = into.transform().rotation.reversed();
        let incoming: Vec<CubeCell> = from
            .cubes()
            .map(|cube| {
                let mut cell = cube.clone();
                cell.local_pos = round_to_cell(inverse.transform_vec(from.world_position(cube)));
                cell.rotation = inverse_rotation * from.world_rotation(cube);
                cell
            })
            .collect();

        let mut occupied: Vec<[i32; 3]> = into.cubes().map(|c| cell_key(c.local_pos)).collect();
        for cell in &incoming {
            let key = cell_key(cell.local_pos);
            if occupied.contains(&key) {
                log::warn!("[MERGE] {} и {} пересекаются в {:?}", target, source, key);
                return None;
            }
            occupied.push(key);
        }

        self.destroy_aggregate(source);

        let moved = incoming.len();
        let into = self.aggregates.get_mut(&target)?;
        for cell in incoming {
            let world_pos = into.transform().transform_vec(cell.local_pos);
            self.chunk_index.mark_dirty([world_pos.x, world_pos.y, world_pos.z]);
            into.push_cube(cell);
        }
        into.schedule_recombine();
        self.rebuild(target);

        log::info!("[MERGE] {} кубов из {} перенесено в {}", moved, source, target);
        Some(moved)
    }

    /// Трос от куба к неподвижной мировой точке
    pub fn attach_tether(&mut self, handle: CubeHandle, anchor: Vec3) -> Option<ImpulseJointHandle> {
        let aggregate = self.aggregates.get_mut(&handle.aggregate)?;
        let local = aggregate.cube(handle.cube)?.local_pos;
        let body = aggregate.body()?;

        let anchor_body = self.physics.create_fixed_body(anchor);
        let joint = self.physics.attach_joint(body, local, anchor_body, Vec3::zero());
        aggregate.add_accessory(Accessory {
            cube: handle.cube,
            kind: AccessoryKind::Tether,
            joint,
            anchor_body,
        });
        Some(joint)
    }

    /// Удалить агрегат вместе с телом и аксессуарами
    pub fn destroy_aggregate(&mut self, id: AggregateId) -> bool {
        let Some(mut aggregate) = self.aggregates.remove(&id) else {
            return false;
        };

        for accessory in aggregate.take_all_accessories() {
            release_accessory(&mut self.physics, &accessory);
        }
        for cube in aggregate.cubes() {
            let p = aggregate.world_position(cube);
            self.chunk_index.mark_dirty([p.x, p.y, p.z]);
        }
        if let Some(body) = aggregate.body() {
            self.physics.remove_body(body);
        }
        aggregate.set_state(AggregateState::Destroyed);

        log::debug!("[AGGREGATE] Удалён {}", id);
        true
    }

    /// Завершить загрузку: один пересчёт, тело включается.
    /// Возвращает агрегаты, отделившиеся при пересчёте.
    pub fn finalize_load(&mut self, id: AggregateId) -> Vec<AggregateId> {
        let Some(aggregate) = self.aggregates.get_mut(&id) else {
            return Vec::new();
        };
        if !aggregate.is_loading() {
            return Vec::new();
        }

        aggregate.set_state(AggregateState::Ready);
        aggregate.schedule_recombine();
        if let Some(body) = aggregate.body() {
            self.physics.set_body_enabled(body, true);
        }
        self.recompute(id)
    }

    /// Диагностика: число связных групп (0 для неизвестного агрегата)
    pub fn count_connected_groups(&self, id: AggregateId) -> usize {
        self.aggregates.get(&id).map_or(0, |a| a.count_connected_groups())
    }

    /// Плоский список записей всех агрегатов в мировых координатах
    pub fn get_save_data(&self) -> Vec<CubeRecord> {
        self.aggregates
            .values()
            .filter(|a| !a.is_loading())
            .flat_map(|a| a.save_records())
            .collect()
    }

    /// Задача массовой загрузки записей
    pub fn load_from_data(&self, records: Vec<CubeRecord>, deferred: bool) -> SpawnTask {
        SpawnTask::new(records, self.config.frame_budget(), deferred)
    }

    /// Удалить всё: агрегаты и оторванные кубы
    pub fn clear(&mut self) {
        for id in self.aggregate_ids() {
            self.destroy_aggregate(id);
        }
        self.clear_detached();
    }

    /// Убрать все оторванные кубы вместе с их телами
    pub fn clear_detached(&mut self) {
        for cube in self.detached.drain(..) {
            self.physics.remove_body(cube.body);
        }
    }

    /// Кадр: шаг физики, синхронизация поз, отложенная склейка мешей
    pub fn tick(&mut self, dt: f32) {
        self.physics.step(dt);

        let mut due = Vec::new();
        for aggregate in self.aggregates.values_mut() {
            if aggregate.is_loading() {
                continue;
            }
            if let Some(pose) = aggregate.body().and_then(|b| self.physics.body_pose(b)) {
                aggregate.set_transform(pose);
            }
            if aggregate.tick_recombine(dt) {
                due.push(aggregate.id());
            }
        }

        if let Some(visuals) = self.visuals.as_mut() {
            for id in due {
                visuals.rebuild_visual(id);
            }
        }
    }
}

/// Снять аксессуар: сустав и тело точки крепления
fn release_accessory(physics: &mut PhysicsWorld, accessory: &Accessory) {
    physics.remove_joint(accessory.joint);
    physics.remove_body(accessory.anchor_body);
}

#[inline]
fn cell_key(local: Vec3) -> [i32; 3] {
    [local.x.round() as i32, local.y.round() as i32, local.z.round() as i32]
}

#[inline]
fn round_to_cell(local: Vec3) -> Vec3 {
    let [x, y, z] = cell_key(local);
    Vec3::new(x as f32, y as f32, z as f32)
}

/// Поза агрегата без поворота
pub(crate) fn translation_pose(position: Vec3) -> Isometry3 {
    Isometry3::new(position, Rotor3::identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::HeadlessCombiner;
    use crate::engine::cubes::{CubeColor, STONE, WOOD};

    fn cell(x: f32, y: f32, z: f32) -> CubeCell {
        CubeCell::new(Vec3::new(x, y, z), CubeColor::WHITE, STONE)
    }

    fn build(world: &mut CubeWorld, origin: Vec3, cells: &[[f32; 3]]) -> AggregateId {
        let id = world.create_aggregate(translation_pose(origin));
        for c in cells {
            world.add_cube(id, cell(c[0], c[1], c[2])).unwrap();
        }
        id
    }

    fn row3(world: &mut CubeWorld) -> AggregateId {
        build(world, Vec3::zero(), &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]])
    }

    fn assert_grid_consistent(world: &CubeWorld) {
        for aggregate in world.aggregates() {
            let count = aggregate.cube_count();
            assert_eq!(aggregate.grid().occupied_count(), count);
            let mut ids: Vec<CubeId> = aggregate.grid().occupied().map(|(_, id)| id).collect();
            ids.sort();
            assert_eq!(ids, (1..=count as CubeId).collect::<Vec<_>>());
        }
    }

    #[test]
    fn add_cube_rebuilds_grid_and_mass() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        let aggregate = world.aggregate(id).unwrap();

        assert_eq!(aggregate.state(), AggregateState::Ready);
        assert_eq!(aggregate.cube_count(), 3);
        assert!((aggregate.mass() - 0.3).abs() < 1e-6);
        assert!(aggregate.recombine_pending());
        assert_eq!(world.physics().collider_count(aggregate.body().unwrap()), 3);
        assert_grid_consistent(&world);
    }

    #[test]
    fn occupied_cell_is_rejected() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        assert_eq!(world.add_cube(id, cell(1.0, 0.0, 0.0)), None);
        assert_eq!(world.add_cube(id, cell(3.0, 0.0, 0.0)), Some(4));
    }

    #[test]
    fn l_shape_is_connected() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = build(
            &mut world,
            Vec3::zero(),
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 1.0, 0.0], [2.0, 2.0, 0.0]],
        );
        assert_eq!(world.count_connected_groups(id), 1);
    }

    #[test]
    fn removing_the_middle_cube_splits_the_row() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);

        let outcome = world.detach_cube(CubeHandle::new(id, 2)).unwrap();
        assert!(!outcome.destroyed);
        assert_eq!(outcome.split_into.len(), 1);

        assert_eq!(world.aggregate_count(), 2);
        assert!(world.aggregates().all(|a| a.cube_count() == 1));
        assert_eq!(world.detached_cubes().len(), 1);
        assert!(world.physics().contains_body(outcome.body));

        // При равных размерах остаётся группа с меньшей ячейкой
        let kept = world.aggregate(id).unwrap();
        assert_eq!(kept.cubes().next().unwrap().local_pos, Vec3::zero());
        let split = world.aggregate(outcome.split_into[0]).unwrap();
        assert_eq!(split.cubes().next().unwrap().local_pos, Vec3::new(2.0, 0.0, 0.0));
        assert_grid_consistent(&world);
    }

    #[test]
    fn detaching_the_only_cube_destroys_the_aggregate() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = build(&mut world, Vec3::new(0.0, 4.0, 0.0), &[[0.0, 0.0, 0.0]]);
        let body = world.aggregate(id).unwrap().body().unwrap();

        let outcome = world.detach_cube(CubeHandle::new(id, 1)).unwrap();
        assert!(outcome.destroyed);
        assert!(world.aggregate(id).is_none());
        assert!(!world.physics().contains_body(body));
        assert_eq!(world.detached_cubes().len(), 1);

        let pose = world.physics().body_pose(outcome.body).unwrap();
        assert_eq!(pose.translation, Vec3::new(0.0, 4.0, 0.0));
    }

    #[test]
    fn stale_or_unknown_detach_is_a_noop() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        assert!(world.detach_cube(CubeHandle::new(id, 9)).is_none());
        assert!(world.detach_cube(CubeHandle::new(AggregateId(999), 1)).is_none());
        assert_eq!(world.total_cube_count(), 3);
    }

    #[test]
    fn recompute_of_connected_aggregate_changes_nothing() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        let before: Vec<(CubeId, Vec3)> = world.aggregate(id).unwrap().cubes().map(|c| (c.id, c.local_pos)).collect();

        assert!(world.recompute(id).is_empty());
        let after: Vec<(CubeId, Vec3)> = world.aggregate(id).unwrap().cubes().map(|c| (c.id, c.local_pos)).collect();
        assert_eq!(before, after);
        assert_eq!(world.aggregate_count(), 1);
    }

    #[test]
    fn splits_conserve_cubes() {
        let mut world = CubeWorld::new(WorldConfig::default());
        // Крест 3x3 в плоскости XY, центр вырывается
        let id = build(
            &mut world,
            Vec3::zero(),
            &[[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [2.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 2.0, 0.0], [1.0, 3.0, 0.0]],
        );

        let outcome = world.detach_cube(CubeHandle::new(id, 1)).unwrap();
        assert_eq!(outcome.split_into.len(), 3);
        assert_eq!(world.total_cube_count() + world.detached_cubes().len(), 6);
        // Верхняя ветка длиннее всех и остаётся
        assert_eq!(world.aggregate(id).unwrap().cube_count(), 2);
        assert!(world.aggregates().all(|a| a.count_connected_groups() == 1));
        assert_grid_consistent(&world);
    }

    #[test]
    fn split_aggregates_inherit_velocity() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        let body = world.aggregate(id).unwrap().body().unwrap();
        world.physics_mut().set_body_velocity(body, Vec3::new(2.0, 0.0, 0.0), Vec3::zero());

        let outcome = world.detach_cube(CubeHandle::new(id, 2)).unwrap();
        let split_body = world.aggregate(outcome.split_into[0]).unwrap().body().unwrap();
        let (linear, _) = world.physics().body_velocity(split_body).unwrap();
        assert_eq!(linear, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn detach_at_resolves_hit_point() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = build(&mut world, Vec3::new(10.0, 0.0, 0.0), &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        let hit = RaycastHit { point: Vec3::new(11.5, 0.0, 0.0), hit_object: HitObject::Aggregate(id) };
        let outcome = world.detach_at(&hit).unwrap();
        assert!(outcome.split_into.is_empty());
        assert_eq!(world.aggregate(id).unwrap().cube_count(), 1);

        let miss = RaycastHit { point: Vec3::new(50.0, 0.0, 0.0), hit_object: HitObject::Aggregate(id) };
        assert!(world.detach_at(&miss).is_none());
    }

    #[test]
    fn merge_preserves_world_positions() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let a = build(&mut world, Vec3::zero(), &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let b = build(&mut world, Vec3::new(2.0, 0.0, 0.0), &[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);

        assert_eq!(world.merge_aggregates(a, b), Some(2));
        assert!(world.aggregate(b).is_none());

        let merged = world.aggregate(a).unwrap();
        assert_eq!(merged.cube_count(), 4);
        assert_eq!(merged.count_connected_groups(), 1);
        let mut xs: Vec<[f32; 3]> = merged.save_records().iter().map(|r| r.position).collect();
        xs.sort_by(|l, r| l.partial_cmp(r).unwrap());
        assert_eq!(xs[3], [2.0, 1.0, 0.0]);
        assert_grid_consistent(&world);
    }

    #[test]
    fn overlapping_merge_is_refused() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let a = build(&mut world, Vec3::zero(), &[[0.0, 0.0, 0.0]]);
        let b = build(&mut world, Vec3::zero(), &[[0.0, 0.0, 0.0]]);
        assert_eq!(world.merge_aggregates(a, b), None);
        assert_eq!(world.merge_aggregates(a, a), None);
        assert_eq!(world.aggregate_count(), 2);
    }

    #[test]
    fn tether_is_released_with_its_cube() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        let joint = world.attach_tether(CubeHandle::new(id, 3), Vec3::new(2.0, 5.0, 0.0)).unwrap();
        assert_eq!(world.aggregate(id).unwrap().accessories().len(), 1);

        // Кубы 3 уходят в новый агрегат, трос снимается
        world.detach_cube(CubeHandle::new(id, 2)).unwrap();
        assert!(!world.physics().contains_joint(joint));
        assert!(world.aggregates().all(|a| a.accessories().is_empty()));
    }

    #[test]
    fn tether_survives_renumbering() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = build(&mut world, Vec3::zero(), &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);
        let joint = world.attach_tether(CubeHandle::new(id, 3), Vec3::new(1.0, 5.0, 0.0)).unwrap();

        world.detach_cube(CubeHandle::new(id, 1)).unwrap();
        let aggregate = world.aggregate(id).unwrap();
        assert_eq!(aggregate.accessories()[0].cube, 2);
        assert_eq!(aggregate.cube(2).unwrap().local_pos, Vec3::new(1.0, 1.0, 0.0));
        assert!(world.physics().contains_joint(joint));
    }

    #[test]
    fn loading_defers_recompute_until_finalize() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = world.begin_loading(translation_pose(Vec3::zero()));
        let body = world.aggregate(id).unwrap().body().unwrap();
        assert!(!world.physics().is_body_enabled(body));

        for x in 0..4 {
            world.add_cube(id, CubeCell::new(Vec3::new(x as f32, 0.0, 0.0), CubeColor::WHITE, WOOD));
        }
        let aggregate = world.aggregate(id).unwrap();
        assert!(aggregate.is_loading());
        assert!(aggregate.grid().is_empty());
        assert!(world.get_save_data().is_empty());

        assert!(world.finalize_load(id).is_empty());
        let aggregate = world.aggregate(id).unwrap();
        assert_eq!(aggregate.state(), AggregateState::Ready);
        assert_eq!(aggregate.grid().occupied_count(), 4);
        assert!(world.physics().is_body_enabled(body));
        assert_eq!(world.physics().collider_count(body), 4);
    }

    #[test]
    fn finalize_splits_disconnected_loads() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = world.begin_loading(translation_pose(Vec3::zero()));
        world.add_cube(id, cell(0.0, 0.0, 0.0));
        world.add_cube(id, cell(5.0, 0.0, 0.0));

        assert_eq!(world.finalize_load(id).len(), 1);
        assert_eq!(world.aggregate_count(), 2);
    }

    #[test]
    fn finalizing_an_empty_load_destroys_it() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = world.begin_loading(translation_pose(Vec3::zero()));
        world.finalize_load(id);
        assert!(world.aggregate(id).is_none());
    }

    #[test]
    fn save_data_uses_world_space() {
        let mut world = CubeWorld::with_allocator(WorldConfig::default(), AggregateIdAllocator::starting_at(7));
        let id = build(&mut world, Vec3::new(3.0, 2.0, 1.0), &[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(id, AggregateId(7));

        let records = world.get_save_data();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position, [3.0, 3.0, 1.0]);
        assert!(records.iter().all(|r| r.aggregate_id == 7));
        assert!(world.chunk_index().dirty_count() > 0);
    }

    #[test]
    fn tick_fires_debounced_recombine_once() {
        let mut config = WorldConfig::default();
        config.recombine_delay = 0.25;
        let mut world = CubeWorld::new(config);
        world.set_visual_combiner(Box::new(HeadlessCombiner::new()));
        world.physics_mut().suspend();

        let id = row3(&mut world);
        world.tick(0.125);
        assert!(!world.is_visual_combined(id));
        // Новое добавление перезапускает таймер
        world.add_cube(id, cell(3.0, 0.0, 0.0));
        world.tick(0.125);
        assert!(!world.is_visual_combined(id));
        world.tick(0.125);
        assert!(world.is_visual_combined(id));
        assert!(!world.aggregate(id).unwrap().recombine_pending());
    }

    #[test]
    fn tick_syncs_transforms_from_physics() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = build(&mut world, Vec3::new(0.0, 10.0, 0.0), &[[0.0, 0.0, 0.0]]);
        for _ in 0..10 {
            world.tick(1.0 / 60.0);
        }
        assert!(world.aggregate(id).unwrap().transform().translation.y < 10.0);
    }

    #[test]
    fn clear_removes_everything() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let id = row3(&mut world);
        world.detach_cube(CubeHandle::new(id, 1));
        world.clear();
        assert_eq!(world.aggregate_count(), 0);
        assert!(world.detached_cubes().is_empty());
        assert_eq!(world.physics().body_count(), 0);
    }
}
