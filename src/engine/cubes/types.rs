// ============================================
// Cube Types - Куб, цвет, тип блока
// ============================================

use ultraviolet::{Rotor3, Vec3};

use crate::engine::core::{AggregateId, NodeHandle};

/// BlockType - просто байт типа блока
pub type BlockType = u8;

pub const PLAIN: BlockType = 0;
pub const WOOD: BlockType = 1;
pub const STONE: BlockType = 2;
pub const METAL: BlockType = 3;
pub const GLASS: BlockType = 4;

/// ID куба внутри агрегата (1-based, 0 = пустая ячейка сетки)
pub type CubeId = u32;

/// Пустая ячейка сетки
pub const EMPTY_CELL: CubeId = 0;

/// Количество уровней квантования на канал
pub const COLOR_LEVELS: u8 = 8;

/// Цвет куба RGBA8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl CubeColor {
    pub const WHITE: CubeColor = CubeColor { r: 255, g: 255, b: 255, a: 255 };

    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Цвет из float RGB, каждый канал квантуется в 8 ступеней
    pub fn quantized(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: quantize_channel(r),
            g: quantize_channel(g),
            b: quantize_channel(b),
            a: 255,
        }
    }

    pub fn to_rgb(&self) -> [f32; 3] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0]
    }
}

/// Канал 0..1 -> ближайшая из 8 ступеней -> байт
#[inline]
pub fn quantize_channel(c: f32) -> u8 {
    let steps = (COLOR_LEVELS - 1) as f32;
    let level = (c.clamp(0.0, 1.0) * steps).round() as u32;
    ((level * 255 + 3) / (COLOR_LEVELS - 1) as u32) as u8
}

/// Воксель-куб, принадлежит ровно одному агрегату
#[derive(Debug, Clone)]
pub struct CubeCell {
    /// Индекс в массиве агрегата + 1
    pub id: CubeId,
    /// Позиция относительно агрегата
    pub local_pos: Vec3,
    pub color: CubeColor,
    pub block_type: BlockType,
    /// Поворот относительно агрегата
    pub rotation: Rotor3,
    /// Оторван и живёт отдельным телом
    pub detached: bool,
    /// Визуальный узел, выданный спавнером
    pub node: Option<NodeHandle>,
}

impl CubeCell {
    pub fn new(local_pos: Vec3, color: CubeColor, block_type: BlockType) -> Self {
        Self {
            id: EMPTY_CELL,
            local_pos,
            color,
            block_type,
            rotation: Rotor3::identity(),
            detached: false,
            node: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotor3) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Ссылка на куб снаружи: агрегат + ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeHandle {
    pub aggregate: AggregateId,
    pub cube: CubeId,
}

impl CubeHandle {
    pub fn new(aggregate: AggregateId, cube: CubeId) -> Self {
        Self { aggregate, cube }
    }
}
