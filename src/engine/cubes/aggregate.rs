// ============================================
// Aggregate - Жёсткий кластер связанных кубов
// ============================================
// Владеет массивом кубов (арена), сеткой и телом.
// Куб знает только свой ID, ссылки на агрегат у него нет.
//
// Состояния: Uninitialized -> Ready <-> Loading, конец - Destroyed (0 кубов)

use std::collections::HashMap;

use ultraviolet::{Isometry3, Rotor3, Vec3};

use crate::engine::core::AggregateId;
use crate::engine::physics::{RigidBodyHandle, CUBE_MASS};
use crate::engine::save::CubeRecord;
use super::accessory::Accessory;
use super::connectivity::{find_groups, ConnectedGroup};
use super::debounce::Debounce;
use super::grid::{CubeGrid, NEIGHBOR_OFFSETS};
use super::types::{CubeCell, CubeId, EMPTY_CELL};

/// Состояние жизненного цикла агрегата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    /// Создан, ещё ни разу не пересчитан
    Uninitialized,
    /// Сетка и тело актуальны
    Ready,
    /// Массовая вставка, пересчёт отложен до finalize
    Loading,
    /// Кубов не осталось
    Destroyed,
}

/// Агрегат кубов
#[derive(Debug)]
pub struct Aggregate {
    id: AggregateId,
    state: AggregateState,
    transform: Isometry3,
    /// Слоты кубов; индекс + 1 = ID, None = куб изъят до пересчёта
    cubes: Vec<Option<CubeCell>>,
    live: usize,
    grid: CubeGrid,
    body: Option<RigidBodyHandle>,
    accessories: Vec<Accessory>,
    recombine: Debounce,
}

impl Aggregate {
    pub(crate) fn new(id: AggregateId, transform: Isometry3, recombine_delay: f32) -> Self {
        Self {
            id,
            state: AggregateState::Uninitialized,
            transform,
            cubes: Vec::new(),
            live: 0,
            grid: CubeGrid::empty(),
            body: None,
            accessories: Vec::new(),
            recombine: Debounce::new(recombine_delay),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn state(&self) -> AggregateState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == AggregateState::Loading
    }

    pub fn transform(&self) -> &Isometry3 {
        &self.transform
    }

    pub fn body(&self) -> Option<RigidBodyHandle> {
        self.body
    }

    pub fn grid(&self) -> &CubeGrid {
        &self.grid
    }

    pub fn accessories(&self) -> &[Accessory] {
        &self.accessories
    }

    pub fn cube_count(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Масса = число кубов / 10
    pub fn mass(&self) -> f32 {
        self.live as f32 * CUBE_MASS
    }

    pub fn recombine_pending(&self) -> bool {
        self.recombine.is_pending()
    }

    pub fn cube(&self, id: CubeId) -> Option<&CubeCell> {
        let index = (id as usize).checked_sub(1)?;
        self.cubes.get(index)?.as_ref()
    }

    pub fn cubes(&self) -> impl Iterator<Item = &CubeCell> {
        self.cubes.iter().flatten()
    }

    pub fn cube_ids(&self) -> Vec<CubeId> {
        self.cubes().map(|c| c.id).collect()
    }

    pub fn local_positions(&self) -> Vec<Vec3> {
        self.cubes().map(|c| c.local_pos).collect()
    }

    pub fn world_position(&self, cube: &CubeCell) -> Vec3 {
        self.transform.transform_vec(cube.local_pos)
    }

    pub fn world_rotation(&self, cube: &CubeCell) -> Rotor3 {
        self.transform.rotation * cube.rotation
    }

    /// Мировая поза куба (для отдельного тела после отрыва)
    pub fn cube_pose(&self, cube: &CubeCell) -> Isometry3 {
        Isometry3::new(self.world_position(cube), self.world_rotation(cube))
    }

    /// Куб в ячейке, куда округляется локальная позиция
    pub fn cube_at_local(&self, local: Vec3) -> Option<CubeId> {
        let cell = self.grid.grid_position(local)?;
        let id = self.grid.get(cell);
        (id != EMPTY_CELL && self.cube(id).is_some()).then_some(id)
    }

    /// Куб под мировой точкой; точка на грани решается ближайшим соседом
    pub fn cube_at_world(&self, point: Vec3) -> Option<CubeId> {
        let local = self.transform.inversed().transform_vec(point);
        if let Some(id) = self.cube_at_local(local) {
            return Some(id);
        }

        let center = CubeGrid::cell_of(local);
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(|o| {
                let candidate = Vec3::new(
                    (center[0] + o[0]) as f32,
                    (center[1] + o[1]) as f32,
                    (center[2] + o[2]) as f32,
                );
                let id = self.cube_at_local(candidate)?;
                Some(((candidate - local).mag_sq(), id))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id)| id)
    }

    // ---------- Мутации (через CubeWorld) ----------

    pub(crate) fn set_state(&mut self, state: AggregateState) {
        self.state = state;
    }

    pub(crate) fn set_transform(&mut self, transform: Isometry3) {
        self.transform = transform;
    }

    pub(crate) fn set_body(&mut self, body: Option<RigidBodyHandle>) {
        self.body = body;
    }

    pub(crate) fn schedule_recombine(&mut self) {
        self.recombine.trigger();
    }

    pub(crate) fn tick_recombine(&mut self, dt: f32) -> bool {
        self.recombine.tick(dt)
    }

    /// Добавить куб в конец арены; O(1), сетка не трогается
    pub(crate) fn push_cube(&mut self, mut cell: CubeCell) -> CubeId {
        let id = self.cubes.len() as CubeId + 1;
        cell.id = id;
        self.cubes.push(Some(cell));
        self.live += 1;
        id
    }

    /// Изъять куб: обнулить ячейку сетки и слот.
    /// None если куба нет или сетка не указывает на него (устарела).
    pub(crate) fn take_cube(&mut self, id: CubeId) -> Option<CubeCell> {
        let local = self.cube(id)?.local_pos;
        let cell = self.grid.grid_position(local)?;
        if self.grid.get(cell) != id {
            return None;
        }

        self.grid.clear(cell);
        let taken = self.cubes.get_mut(id as usize - 1)?.take()?;
        self.live -= 1;
        Some(taken)
    }

    /// Снять аксессуары, прикреплённые к кубу
    pub(crate) fn take_accessories_of(&mut self, cube: CubeId) -> Vec<Accessory> {
        let (taken, kept) = std::mem::take(&mut self.accessories)
            .into_iter()
            .partition(|a| a.cube == cube);
        self.accessories = kept;
        taken
    }

    pub(crate) fn take_all_accessories(&mut self) -> Vec<Accessory> {
        std::mem::take(&mut self.accessories)
    }

    pub(crate) fn add_accessory(&mut self, accessory: Accessory) {
        self.accessories.push(accessory);
    }

    /// Уплотнить арену, переназначить ID 1..=count, пересобрать сетку.
    /// На уже плотном агрегате ID не меняются.
    pub(crate) fn recompute(&mut self) {
        let mut remap: HashMap<CubeId, CubeId> = HashMap::new();
        let old = std::mem::take(&mut self.cubes);

        for mut cell in old.into_iter().flatten() {
            let id = self.cubes.len() as CubeId + 1;
            if cell.id != id {
                remap.insert(cell.id, id);
            }
            cell.id = id;
            self.cubes.push(Some(cell));
        }

        if !remap.is_empty() {
            for accessory in &mut self.accessories {
                if let Some(new_id) = remap.get(&accessory.cube) {
                    accessory.cube = *new_id;
                }
            }
        }

        self.live = self.cubes.len();
        self.grid = CubeGrid::build(&self.local_positions());
    }

    // ---------- Связность ----------

    /// Связные группы живых кубов по текущей сетке
    pub fn find_groups(&self) -> Vec<ConnectedGroup> {
        let members: Vec<(CubeId, [u32; 3])> = self
            .cubes()
            .filter_map(|c| Some((c.id, self.grid.grid_position(c.local_pos)?)))
            .collect();
        find_groups(&self.grid, &members)
    }

    /// Диагностика: число связных групп
    pub fn count_connected_groups(&self) -> usize {
        self.find_groups().len()
    }

    // ---------- Сохранение ----------

    /// Записи кубов в мировых координатах
    pub fn save_records(&self) -> Vec<CubeRecord> {
        self.cubes()
            .map(|cube| {
                let pos = self.world_position(cube);
                CubeRecord::new(
                    [pos.x, pos.y, pos.z],
                    cube.color,
                    cube.block_type,
                    self.id.0,
                    self.world_rotation(cube).into_quaternion_array(),
                )
            })
            .collect()
    }
}
