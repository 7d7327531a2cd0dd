// ============================================
// Accessory - Прикреплённые к кубам объекты
// ============================================
// Список собирается при креплении и хранится на агрегате;
// перед переносом или отрывом куба аксессуар снимается

use crate::engine::physics::{ImpulseJointHandle, RigidBodyHandle};
use super::types::CubeId;

/// Вид аксессуара
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryKind {
    /// Трос к неподвижной точке
    Tether,
}

/// Аксессуар на кубе агрегата
#[derive(Debug, Clone)]
pub struct Accessory {
    pub cube: CubeId,
    pub kind: AccessoryKind,
    pub joint: ImpulseJointHandle,
    /// Неподвижное тело точки крепления
    pub anchor_body: RigidBodyHandle,
}
