// ============================================
// Engine Module - Связность агрегатов и сохранение
// ============================================
// Поток данных:
// мутация -> CubeGrid -> анализ связности -> разделение агрегата
// сохранение: агрегаты -> записи -> чанки -> бинарный кодек -> хранилище
// загрузка: хранилище -> записи -> связность по позициям -> спавн по кадрам

pub mod core;
pub mod cubes;
pub mod physics;
pub mod save;
pub mod systems;
