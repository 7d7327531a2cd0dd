// ============================================
// Connectivity - Поиск 6-связных групп кубов
// ============================================
// Два режима:
// - по сетке агрегата (после отрыва куба)
// - по мировым позициям записей (при загрузке, сетки ещё нет)
//
// BFS выполняется целиком за один вызов

use std::collections::{HashMap, VecDeque};

use vob::Vob;

use crate::engine::save::{fixed_units, CubeRecord};
use super::grid::{CubeGrid, NEIGHBOR_OFFSETS};
use super::types::CubeId;

/// Шаг между соседями в единицах фиксированной точки (1.0)
pub const NEIGHBOR_DISTANCE_UNITS: i32 = 100;

/// Допуск шума округления при поиске соседа (±0.01)
pub const POSITION_TOLERANCE_UNITS: i32 = 1;

/// Связная группа кубов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedGroup {
    /// ID в порядке обхода
    pub ids: Vec<CubeId>,
    /// Лексикографически наименьшая ячейка группы
    pub min_cell: [u32; 3],
}

impl ConnectedGroup {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Как разделить агрегат
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    /// Остаётся в исходном агрегате
    pub keep: ConnectedGroup,
    /// Каждая уходит в новый агрегат
    pub split_off: Vec<ConnectedGroup>,
}

/// BFS по сетке. `members` - живые кубы и их ячейки, порядок задаёт порядок обхода.
pub fn find_groups(grid: &CubeGrid, members: &[(CubeId, [u32; 3])]) -> Vec<ConnectedGroup> {
    let max_id = members.iter().map(|(id, _)| *id).max().unwrap_or(0) as usize;

    let mut is_member = Vob::new();
    is_member.resize(max_id + 1, false);
    for (id, _) in members {
        is_member.set(*id as usize, true);
    }

    let mut visited = Vob::new();
    visited.resize(max_id + 1, false);

    let mut groups = Vec::new();
    let mut queue = VecDeque::new();

    for &(start, start_cell) in members {
        if visited.get(start as usize) == Some(true) {
            continue;
        }

        visited.set(start as usize, true);
        queue.push_back((start, start_cell));
        let mut group = ConnectedGroup { ids: Vec::new(), min_cell: start_cell };

        while let Some((id, cell)) = queue.pop_front() {
            group.ids.push(id);
            group.min_cell = group.min_cell.min(cell);

            for (next_cell, next) in grid.neighbors(cell) {
                let index = next as usize;
                if is_member.get(index) != Some(true) || visited.get(index) == Some(true) {
                    continue;
                }
                visited.set(index, true);
                queue.push_back((next, next_cell));
            }
        }

        groups.push(group);
    }

    groups
}

/// Ранжировать группы: больше - раньше, при равенстве - меньшая min_cell.
/// None если разделять нечего (0 или 1 группа).
pub fn plan_split(mut groups: Vec<ConnectedGroup>) -> Option<SplitPlan> {
    if groups.len() < 2 {
        return None;
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.min_cell.cmp(&b.min_cell)));
    let mut iter = groups.into_iter();
    let keep = iter.next()?;
    Some(SplitPlan { keep, split_off: iter.collect() })
}

/// Группы записей по мировым позициям (индексы в `records`).
/// Ключ - позиция в фиксированной точке, соседи ищутся на ±1.0 с допуском ±0.01.
pub fn group_by_world_position(records: &[CubeRecord]) -> Vec<Vec<usize>> {
    let key_of = |r: &CubeRecord| r.position.map(fixed_units);

    let mut by_position: HashMap<[i32; 3], Vec<usize>> = HashMap::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        by_position.entry(key_of(record)).or_default().push(index);
    }

    let mut visited = Vob::new();
    visited.resize(records.len(), false);

    let mut groups = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..records.len() {
        if visited.get(start) == Some(true) {
            continue;
        }

        visited.set(start, true);
        queue.push_back(start);
        let mut group = Vec::new();

        while let Some(index) = queue.pop_front() {
            group.push(index);
            let key = key_of(&records[index]);

            // Дубликаты позиции тоже считаются связанными
            let probes = std::iter::once([0, 0, 0]).chain(NEIGHBOR_OFFSETS.iter().map(|o| {
                [
                    o[0] * NEIGHBOR_DISTANCE_UNITS,
                    o[1] * NEIGHBOR_DISTANCE_UNITS,
                    o[2] * NEIGHBOR_DISTANCE_UNITS,
                ]
            }));

            for step in probes {
                for_each_in_tolerance(key, step, |probe| {
                    if let Some(found) = by_position.get(&probe) {
                        for &next in found {
                            if visited.get(next) != Some(true) {
                                visited.set(next, true);
                                queue.push_back(next);
                            }
                        }
                    }
                });
            }
        }

        groups.push(group);
    }

    groups
}

/// Все ключи в окне ±допуск вокруг key + step
#[inline]
fn for_each_in_tolerance(key: [i32; 3], step: [i32; 3], mut f: impl FnMut([i32; 3])) {
    let t = POSITION_TOLERANCE_UNITS;
    for dx in -t..=t {
        for dy in -t..=t {
            for dz in -t..=t {
                f([key[0] + step[0] + dx, key[1] + step[1] + dy, key[2] + step[2] + dz]);
            }
        }
    }
}
