// ============================================
// Spawn Scheduler - Массовое создание кубов по кадрам
// ============================================
// Записи группируются по мировым позициям, каждая группа становится
// агрегатом в своём минимальном углу. За шаг создаётся не больше
// frame_budget кубов, затем finalize_load для всех агрегатов.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ultraviolet::{Rotor3, Vec3};

use crate::engine::core::{translation_pose, AggregateId, CubeSpawner, CubeWorld};
use crate::engine::cubes::{group_by_world_position, CubeCell};
use crate::engine::save::{CubeRecord, SaveError};

/// Флаг отмены, общий для задачи и её владельца
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Результат одного шага
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStatus {
    /// Бюджет кадра исчерпан, нужен ещё шаг
    InProgress,
    /// Всё создано и финализировано
    Finished,
}

/// Группа записей, будущий агрегат
struct SpawnGroup {
    corner: Vec3,
    records: Vec<CubeRecord>,
}

/// Задача загрузки набора записей
pub struct SpawnTask {
    groups: Vec<SpawnGroup>,
    group: usize,
    record: usize,
    current: Option<AggregateId>,
    budget: usize,
    deferred: bool,
    token: CancellationToken,
    created: Vec<AggregateId>,
    spawned: usize,
    total: usize,
    finished: bool,
    aborted: bool,
}

impl SpawnTask {
    /// `deferred = false` - всё за один шаг
    pub fn new(records: Vec<CubeRecord>, budget: usize, deferred: bool) -> Self {
        let total = records.len();
        let groups = group_by_world_position(&records)
            .into_iter()
            .map(|indices| {
                let group: Vec<CubeRecord> = indices.into_iter().map(|i| records[i]).collect();
                SpawnGroup { corner: min_corner(&group), records: group }
            })
            .collect();

        Self {
            groups,
            group: 0,
            record: 0,
            current: None,
            budget: budget.max(1),
            deferred,
            token: CancellationToken::new(),
            created: Vec::new(),
            spawned: 0,
            total,
            finished: false,
            aborted: false,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn spawned(&self) -> usize {
        self.spawned
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Агрегаты, созданные задачей (включая отделившиеся при финализации)
    pub fn created(&self) -> &[AggregateId] {
        &self.created
    }

    /// Один шаг. При отмене или отказе спавнера созданное удаляется.
    pub fn step(&mut self, world: &mut CubeWorld, spawner: &mut dyn CubeSpawner) -> Result<SpawnStatus, SaveError> {
        if self.aborted {
            return Err(SaveError::Cancelled);
        }
        if self.finished {
            return Ok(SpawnStatus::Finished);
        }
        if self.token.is_cancelled() {
            self.abort(world);
            log::warn!("[SPAWN] Загрузка отменена после {} из {} кубов", self.spawned, self.total);
            return Err(SaveError::Cancelled);
        }

        let mut left = if self.deferred { self.budget } else { usize::MAX };
        while left > 0 && self.group < self.groups.len() {
            let group = &self.groups[self.group];
            let id = match self.current {
                Some(id) => id,
                None => {
                    let id = world.begin_loading(translation_pose(group.corner));
                    self.created.push(id);
                    self.current = Some(id);
                    id
                }
            };

            let record = group.records[self.record];
            let Some(node) = spawner.spawn_cube(&record, id) else {
                self.abort(world);
                log::error!("[SPAWN] Спавнер отказал на кубе {} из {}", self.spawned + 1, self.total);
                return Err(SaveError::Spawn(format!("cube at {:?}", record.position)));
            };

            let [x, y, z] = record.position;
            let mut cell = CubeCell::new(Vec3::new(x, y, z) - group.corner, record.color, record.block_type)
                .with_rotation(Rotor3::from_quaternion_array(record.rotation));
            cell.node = Some(node);
            world.add_cube(id, cell);

            self.spawned += 1;
            self.record += 1;
            left -= 1;
            if self.record == group.records.len() {
                self.group += 1;
                self.record = 0;
                self.current = None;
            }
        }

        if self.group < self.groups.len() {
            log::debug!("[SPAWN] {} / {} кубов", self.spawned, self.total);
            return Ok(SpawnStatus::InProgress);
        }

        let loaded = self.created.clone();
        for id in loaded {
            let split = world.finalize_load(id);
            self.created.extend(split);
        }
        self.finished = true;
        log::debug!("[SPAWN] Готово: {} кубов, {} агрегатов", self.spawned, self.created.len());
        Ok(SpawnStatus::Finished)
    }

    /// Удалить всё, что задача успела создать
    fn abort(&mut self, world: &mut CubeWorld) {
        for id in self.created.drain(..) {
            world.destroy_aggregate(id);
        }
        self.current = None;
        self.aborted = true;
    }
}

/// Минимальный угол группы по каждой оси
fn min_corner(records: &[CubeRecord]) -> Vec3 {
    let mut min = [f32::MAX; 3];
    for record in records {
        for axis in 0..3 {
            min[axis] = min[axis].min(record.position[axis]);
        }
    }
    Vec3::new(min[0], min[1], min[2])
}

/// Ведёт одну задачу спавна, по шагу за кадр
#[derive(Default)]
pub struct SpawnScheduler {
    task: Option<SpawnTask>,
    /// Вытесненные задачи, их агрегаты удаляются на следующем тике
    displaced: Vec<SpawnTask>,
    frames: usize,
}

impl SpawnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Поставить задачу. Незаконченная предыдущая отменяется,
    /// созданное ею удаляется на следующем тике.
    pub fn start(&mut self, task: SpawnTask) -> CancellationToken {
        if let Some(old) = self.task.take() {
            log::warn!("[SPAWN] Предыдущая задача заменена после {} из {} кубов", old.spawned(), old.total());
            old.token().cancel();
            self.displaced.push(old);
        }
        let token = task.token();
        self.task = Some(task);
        self.frames = 0;
        token
    }

    pub fn is_busy(&self) -> bool {
        self.task.is_some() || !self.displaced.is_empty()
    }

    /// Кадров, потраченных текущей или последней задачей
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.token().cancel();
        }
    }

    /// Шаг кадра. Some - задача закончилась (успешно или нет).
    pub fn tick(&mut self, world: &mut CubeWorld, spawner: &mut dyn CubeSpawner) -> Option<Result<Vec<AggregateId>, SaveError>> {
        for mut old in self.displaced.drain(..) {
            old.abort(world);
        }

        let task = self.task.as_mut()?;
        self.frames += 1;

        match task.step(world, spawner) {
            Ok(SpawnStatus::InProgress) => None,
            Ok(SpawnStatus::Finished) => self.task.take().map(|t| Ok(t.created)),
            Err(e) => {
                self.task = None;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::{HeadlessSpawner, NodeHandle, WorldConfig};
    use crate::engine::cubes::CubeColor;

    fn record(x: f32, y: f32, z: f32) -> CubeRecord {
        CubeRecord::new([x, y, z], CubeColor::WHITE, 1, 0, [0.0, 0.0, 0.0, 1.0])
    }

    /// Две башни по 5 кубов
    fn towers() -> Vec<CubeRecord> {
        (0..5)
            .flat_map(|y| [record(0.0, y as f32, 0.0), record(10.0, y as f32 + 3.0, 0.0)])
            .collect()
    }

    /// Отказывает после заданного числа кубов
    struct FailingSpawner {
        left: usize,
    }

    impl CubeSpawner for FailingSpawner {
        fn spawn_cube(&mut self, _record: &CubeRecord, _parent: AggregateId) -> Option<NodeHandle> {
            self.left = self.left.checked_sub(1)?;
            Some(NodeHandle(1))
        }
    }

    #[test]
    fn groups_become_aggregates_at_min_corner() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut task = world.load_from_data(towers(), false);
        assert_eq!(task.group_count(), 2);

        assert_eq!(task.step(&mut world, &mut spawner).unwrap(), SpawnStatus::Finished);
        assert_eq!(world.aggregate_count(), 2);
        assert_eq!(spawner.spawned(), 10);

        let corners: Vec<Vec3> = world.aggregates().map(|a| a.transform().translation).collect();
        assert!(corners.contains(&Vec3::new(10.0, 3.0, 0.0)));
        assert!(world.aggregates().all(|a| a.cube_count() == 5 && !a.is_loading()));
        assert!(world.aggregates().all(|a| a.cubes().all(|c| c.node.is_some())));
    }

    #[test]
    fn deferred_task_respects_frame_budget() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut task = SpawnTask::new(towers(), 4, true);

        assert_eq!(task.step(&mut world, &mut spawner).unwrap(), SpawnStatus::InProgress);
        assert_eq!(task.spawned(), 4);
        // До финализации агрегаты остаются в режиме загрузки
        assert!(world.aggregates().all(|a| a.is_loading()));

        assert_eq!(task.step(&mut world, &mut spawner).unwrap(), SpawnStatus::InProgress);
        assert_eq!(task.step(&mut world, &mut spawner).unwrap(), SpawnStatus::Finished);
        assert_eq!(task.spawned(), 10);
        assert!(world.aggregates().all(|a| !a.is_loading()));
    }

    #[test]
    fn scheduler_reports_frames() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut scheduler = SpawnScheduler::new();
        scheduler.start(SpawnTask::new(towers(), 5, true));

        let mut result = None;
        while result.is_none() {
            result = scheduler.tick(&mut world, &mut spawner);
        }
        assert_eq!(result.unwrap().unwrap().len(), 2);
        assert_eq!(scheduler.frames(), 2);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn cancellation_removes_partial_aggregates() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut task = SpawnTask::new(towers(), 3, true);
        let token = task.token();

        task.step(&mut world, &mut spawner).unwrap();
        assert_eq!(world.aggregate_count(), 1);

        token.cancel();
        assert!(matches!(task.step(&mut world, &mut spawner), Err(SaveError::Cancelled)));
        assert_eq!(world.aggregate_count(), 0);
    }

    #[test]
    fn spawner_failure_aborts_the_load() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = FailingSpawner { left: 7 };
        let mut task = world.load_from_data(towers(), false);

        assert!(matches!(task.step(&mut world, &mut spawner), Err(SaveError::Spawn(_))));
        assert_eq!(world.aggregate_count(), 0);
        assert_eq!(world.physics().body_count(), 0);
    }

    #[test]
    fn restarting_removes_the_displaced_partial_load() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut scheduler = SpawnScheduler::new();

        let first = scheduler.start(SpawnTask::new(towers(), 2, true));
        assert!(scheduler.tick(&mut world, &mut spawner).is_none());
        assert_eq!(world.aggregate_count(), 1);
        assert!(world.aggregates().all(|a| a.is_loading()));

        scheduler.start(SpawnTask::new(vec![record(50.0, 0.0, 0.0), record(51.0, 0.0, 0.0)], 2, true));
        assert!(first.is_cancelled());

        let created = scheduler.tick(&mut world, &mut spawner).unwrap().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(world.aggregate_count(), 1);
        assert!(world.aggregates().all(|a| !a.is_loading()));
        assert_eq!(world.get_save_data().len(), 2);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn aborted_task_keeps_reporting_the_failure() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut spawner = HeadlessSpawner::new();
        let mut task = SpawnTask::new(towers(), 3, true);
        task.token().cancel();

        assert!(matches!(task.step(&mut world, &mut spawner), Err(SaveError::Cancelled)));
        assert!(matches!(task.step(&mut world, &mut spawner), Err(SaveError::Cancelled)));
        assert!(!task.is_finished());
        assert_eq!(world.aggregate_count(), 0);
    }

    #[test]
    fn empty_input_finishes_immediately() {
        let mut world = CubeWorld::new(WorldConfig::default());
        let mut task = world.load_from_data(Vec::new(), true);
        assert_eq!(task.step(&mut world, &mut HeadlessSpawner::new()).unwrap(), SpawnStatus::Finished);
        assert!(task.created().is_empty());
    }
}
