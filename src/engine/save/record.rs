// ============================================
// Cube Record - Запись куба (31 байт)
// ============================================
// Раскладка (little-endian):
// i16 x,y,z (позиция * 100) | u8 r,g,b,a | u8 block_type | i32 aggregate_id | f32 rot x,y,z,w
//
// Округление позиции: к ближайшему, половинки от нуля (0.125 -> 0.13, -0.125 -> -0.13).
// Вне диапазона ±327.67 позиция насыщается до границ i16.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::engine::cubes::{BlockType, CubeColor};

/// Размер записи в байтах
pub const CUBE_RECORD_SIZE: usize = 31;

/// Масштаб фиксированной точки (шаг 0.01)
pub const POSITION_SCALE: f64 = 100.0;

/// Мировая координата -> фиксированная точка i16
#[inline]
pub fn to_fixed(v: f32) -> i16 {
    let scaled = (v as f64 * POSITION_SCALE).round();
    scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Фиксированная точка -> мировая координата
#[inline]
pub fn from_fixed(v: i16) -> f32 {
    v as f32 / POSITION_SCALE as f32
}

/// Та же сетка округления без ограничения i16 (для ключей связности)
#[inline]
pub fn fixed_units(v: f32) -> i32 {
    (v as f64 * POSITION_SCALE).round() as i32
}

/// Раскладка записи на диске; bincode пишет поля подряд без префиксов
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RecordWire {
    x: i16,
    y: i16,
    z: i16,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
    block: u8,
    aggregate: i32,
    rotation: [f32; 4],
}

/// Сохраняемый куб в мировых координатах
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeRecord {
    pub position: [f32; 3],
    pub color: CubeColor,
    pub block_type: BlockType,
    /// ID агрегата на момент сохранения (при загрузке только информативен)
    pub aggregate_id: i32,
    /// Кватернион [x, y, z, w]
    pub rotation: [f32; 4],
}

impl CubeRecord {
    pub fn new(position: [f32; 3], color: CubeColor, block_type: BlockType, aggregate_id: i32, rotation: [f32; 4]) -> Self {
        Self { position, color, block_type, aggregate_id, rotation }
    }

    pub fn fixed_position(&self) -> [i16; 3] {
        [
            to_fixed(self.position[0]),
            to_fixed(self.position[1]),
            to_fixed(self.position[2]),
        ]
    }

    /// Позиция такой, какой она вернётся после декодирования
    pub fn quantized_position(&self) -> [f32; 3] {
        self.fixed_position().map(from_fixed)
    }

    /// Копия записи с квантованной позицией
    pub fn quantized(&self) -> Self {
        Self { position: self.quantized_position(), ..*self }
    }

    fn wire(&self) -> RecordWire {
        let [x, y, z] = self.fixed_position();
        RecordWire {
            x,
            y,
            z,
            r: self.color.r,
            g: self.color.g,
            b: self.color.b,
            a: self.color.a,
            block: self.block_type,
            aggregate: self.aggregate_id,
            rotation: self.rotation,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> bincode::Result<()> {
        bincode::serialize_into(w, &self.wire())
    }

    pub fn read_from<R: Read>(r: &mut R) -> bincode::Result<Self> {
        let wire: RecordWire = bincode::deserialize_from(r)?;
        Ok(Self {
            position: [from_fixed(wire.x), from_fixed(wire.y), from_fixed(wire.z)],
            color: CubeColor::from_rgba8(wire.r, wire.g, wire.b, wire.a),
            block_type: wire.block,
            aggregate_id: wire.aggregate,
            rotation: wire.rotation,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CUBE_RECORD_SIZE);
        // Запись в Vec не падает
        let _ = self.write_to(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CubeRecord {
        CubeRecord::new(
            [1.25, -3.5, 200.0],
            CubeColor::from_rgba8(255, 36, 0, 255),
            7,
            42,
            [0.0, 0.70710677, 0.0, 0.70710677],
        )
    }

    #[test]
    fn record_is_31_bytes() {
        assert_eq!(sample().to_bytes().len(), CUBE_RECORD_SIZE);
        assert_eq!(bincode::serialized_size(&sample().wire()).unwrap(), CUBE_RECORD_SIZE as u64);
    }

    #[test]
    fn record_layout_is_little_endian() {
        let bytes = sample().to_bytes();
        // x = 125, y = -350, z = 20000
        assert_eq!(&bytes[0..6], &[125, 0, 0xA2, 0xFE, 0x20, 0x4E]);
        assert_eq!(&bytes[6..11], &[255, 36, 0, 255, 7]);
        assert_eq!(&bytes[11..15], &42i32.to_le_bytes());
        assert_eq!(&bytes[19..23], &0.70710677f32.to_le_bytes());
    }

    #[test]
    fn position_rounds_to_hundredths() {
        let rec = CubeRecord { position: [1.234, -5.0, 100.009], ..sample() };
        let decoded = CubeRecord::read_from(&mut &rec.to_bytes()[..]).unwrap();
        assert_eq!(decoded.position, [1.23, -5.0, 100.01]);
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(to_fixed(0.125), 13);
        assert_eq!(to_fixed(-0.125), -13);
        assert_eq!(to_fixed(0.5), 50);
    }

    #[test]
    fn out_of_range_positions_saturate() {
        assert_eq!(to_fixed(400.0), i16::MAX);
        assert_eq!(to_fixed(-400.0), i16::MIN);
        assert_eq!(from_fixed(i16::MAX), 327.67);
        // Без ограничения сетка та же
        assert_eq!(fixed_units(400.0), 40000);
    }

    #[test]
    fn quantized_record_survives_decode() {
        let rec = sample().quantized();
        let decoded = CubeRecord::read_from(&mut &rec.to_bytes()[..]).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let bytes = sample().to_bytes();
        assert!(CubeRecord::read_from(&mut &bytes[..30]).is_err());
    }
}
