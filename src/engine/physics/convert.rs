// ============================================
// Convert - ultraviolet <-> nalgebra (rapier)
// ============================================

use rapier3d::na::{Isometry3 as NaIsometry, Quaternion, Translation3, UnitQuaternion, Vector3};
use ultraviolet::{Isometry3, Rotor3, Vec3};

#[inline]
pub fn to_na_vec(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline]
pub fn from_na_vec(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Ротор -> единичный кватернион
#[inline]
pub fn to_na_rotation(r: Rotor3) -> UnitQuaternion<f32> {
    let [x, y, z, w] = r.into_quaternion_array();
    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
}

#[inline]
pub fn from_na_rotation(q: &UnitQuaternion<f32>) -> Rotor3 {
    Rotor3::from_quaternion_array([q.i, q.j, q.k, q.w])
}

pub fn to_na_isometry(iso: &Isometry3) -> NaIsometry<f32> {
    let t = iso.translation;
    NaIsometry::from_parts(Translation3::new(t.x, t.y, t.z), to_na_rotation(iso.rotation))
}

pub fn from_na_isometry(iso: &NaIsometry<f32>) -> Isometry3 {
    Isometry3::new(from_na_vec(&iso.translation.vector), from_na_rotation(&iso.rotation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isometry_survives_conversion() {
        let rotation = Rotor3::from_rotation_xz(0.7);
        let iso = Isometry3::new(Vec3::new(1.0, -2.0, 3.5), rotation);
        let back = from_na_isometry(&to_na_isometry(&iso));

        let p = Vec3::new(0.3, 0.2, -1.0);
        let a = iso.transform_vec(p);
        let b = back.transform_vec(p);
        assert!((a - b).mag() < 1e-5);
    }
}
