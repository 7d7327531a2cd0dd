// ============================================
// Cube Grid - Плотная 3D сетка агрегата
// ============================================
// Локальная целочисленная координата -> ID куба (0 = пусто).
// Размер = AABB кубов + 1, origin = минимальный угол.
// Построение O(n), поиск соседа O(1).

use ndshape::{RuntimeShape, Shape};
use ultraviolet::Vec3;

use super::types::{CubeId, EMPTY_CELL};

/// 6 осевых соседей: ±x, ±y, ±z
pub const NEIGHBOR_OFFSETS: [[i32; 3]; 6] = [
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
];

/// Плотная сетка кубов агрегата
#[derive(Debug, Clone, Default)]
pub struct CubeGrid {
    origin: [i32; 3],
    dims: [u32; 3],
    cells: Vec<CubeId>,
}

impl CubeGrid {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Округление локальной позиции до ячейки (одно правило в обе стороны)
    #[inline]
    pub fn cell_of(pos: Vec3) -> [i32; 3] {
        [pos.x.round() as i32, pos.y.round() as i32, pos.z.round() as i32]
    }

    /// Построить сетку; кубу с индексом i достаётся ID i + 1
    pub fn build(positions: &[Vec3]) -> Self {
        if positions.is_empty() {
            return Self::empty();
        }

        let mut min = [i32::MAX; 3];
        let mut max = [i32::MIN; 3];
        for pos in positions {
            let cell = Self::cell_of(*pos);
            for axis in 0..3 {
                min[axis] = min[axis].min(cell[axis]);
                max[axis] = max[axis].max(cell[axis]);
            }
        }

        let dims = [
            (max[0] - min[0] + 1) as u32,
            (max[1] - min[1] + 1) as u32,
            (max[2] - min[2] + 1) as u32,
        ];
        let mut grid = Self {
            origin: min,
            dims,
            cells: vec![EMPTY_CELL; (dims[0] * dims[1] * dims[2]) as usize],
        };

        for (index, pos) in positions.iter().enumerate() {
            if let Some(cell) = grid.grid_position(*pos) {
                let id = index as CubeId + 1;
                let previous = grid.set(cell, id);
                if previous != EMPTY_CELL {
                    log::warn!("[GRID] Кубы {} и {} в одной ячейке {:?}", previous, id, cell);
                }
            }
        }

        grid
    }

    #[inline]
    fn shape(&self) -> RuntimeShape<u32, 3> {
        RuntimeShape::<u32, 3>::new(self.dims)
    }

    pub fn origin(&self) -> [i32; 3] {
        self.origin
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Локальная позиция -> ячейка сетки (None вне границ)
    pub fn grid_position(&self, local: Vec3) -> Option<[u32; 3]> {
        let cell = Self::cell_of(local);
        self.to_grid([
            cell[0] - self.origin[0],
            cell[1] - self.origin[1],
            cell[2] - self.origin[2],
        ])
    }

    /// Центр ячейки в локальных координатах агрегата
    pub fn local_position(&self, cell: [u32; 3]) -> Vec3 {
        Vec3::new(
            (self.origin[0] + cell[0] as i32) as f32,
            (self.origin[1] + cell[1] as i32) as f32,
            (self.origin[2] + cell[2] as i32) as f32,
        )
    }

    #[inline]
    fn to_grid(&self, p: [i32; 3]) -> Option<[u32; 3]> {
        let inside = (0..3).all(|axis| p[axis] >= 0 && (p[axis] as u32) < self.dims[axis]);
        inside.then(|| [p[0] as u32, p[1] as u32, p[2] as u32])
    }

    /// ID в ячейке (0 если пусто или вне границ)
    #[inline]
    pub fn get(&self, cell: [u32; 3]) -> CubeId {
        if self.to_grid([cell[0] as i32, cell[1] as i32, cell[2] as i32]).is_none() {
            return EMPTY_CELL;
        }
        self.cells[self.shape().linearize(cell) as usize]
    }

    /// Записать ID, вернуть прежний
    pub fn set(&mut self, cell: [u32; 3], id: CubeId) -> CubeId {
        if self.to_grid([cell[0] as i32, cell[1] as i32, cell[2] as i32]).is_none() {
            return EMPTY_CELL;
        }
        let index = self.shape().linearize(cell) as usize;
        std::mem::replace(&mut self.cells[index], id)
    }

    /// Обнулить ячейку, вернуть прежний ID
    pub fn clear(&mut self, cell: [u32; 3]) -> CubeId {
        self.set(cell, EMPTY_CELL)
    }

    /// Непустые соседи ячейки: (ячейка, ID)
    pub fn neighbors(&self, cell: [u32; 3]) -> impl Iterator<Item = ([u32; 3], CubeId)> + '_ {
        NEIGHBOR_OFFSETS.iter().filter_map(move |offset| {
            let p = self.to_grid([
                cell[0] as i32 + offset[0],
                cell[1] as i32 + offset[1],
                cell[2] as i32 + offset[2],
            ])?;
            let id = self.get(p);
            (id != EMPTY_CELL).then_some((p, id))
        })
    }

    /// Все занятые ячейки
    pub fn occupied(&self) -> impl Iterator<Item = ([u32; 3], CubeId)> + '_ {
        let shape = self.shape();
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, id)| **id != EMPTY_CELL)
            .map(move |(index, id)| (shape.delinearize(index as u32), *id))
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|id| **id != EMPTY_CELL).count()
    }
}
