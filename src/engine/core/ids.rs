// ============================================
// Aggregate Ids - Выдача ID агрегатов
// ============================================
// Монотонный счётчик принадлежит миру (без глобального состояния)

use std::fmt;

/// Уникальный в пределах мира ID агрегата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateId(pub i32);

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Монотонный аллокатор ID
#[derive(Debug, Clone)]
pub struct AggregateIdAllocator {
    next: i32,
}

impl AggregateIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Аллокатор с заданным первым ID (детерминированные тесты)
    pub fn starting_at(first: i32) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> AggregateId {
        let id = AggregateId(self.next);
        self.next += 1;
        id
    }

    /// Следующий ID, который будет выдан
    pub fn peek(&self) -> AggregateId {
        AggregateId(self.next)
    }
}

impl Default for AggregateIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
