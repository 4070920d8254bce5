//! Rigid-body pose helpers.
//!
//! Poses are `nalgebra` isometries. Solvers work in `f64` on 6-vector
//! twists ordered `(ρ, φ)`: translation first, then axis-angle rotation.

use nalgebra::{Isometry3, Matrix6, Quaternion, Translation3, UnitQuaternion, Vector3, Vector6};

/// Rigid transform, camera-to-world unless noted otherwise.
pub type Pose = Isometry3<f32>;

/// Widen a pose to double precision for solver use.
pub fn to_f64(pose: &Pose) -> Isometry3<f64> {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    Isometry3::from_parts(
        Translation3::new(t.x as f64, t.y as f64, t.z as f64),
        UnitQuaternion::new_normalize(Quaternion::new(
            q.w as f64, q.i as f64, q.j as f64, q.k as f64,
        )),
    )
}

/// Narrow a solver pose back to single precision.
pub fn to_f32(pose: &Isometry3<f64>) -> Pose {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    Isometry3::from_parts(
        Translation3::new(t.x as f32, t.y as f32, t.z as f32),
        UnitQuaternion::new_normalize(Quaternion::new(
            q.w as f32, q.i as f32, q.j as f32, q.k as f32,
        )),
    )
}

/// Retraction from a twist `(ρ, φ)` to a rigid transform.
///
/// Agrees with the SE(3) exponential to first order, which is all the
/// Gauss-Newton and LM updates rely on.
#[inline]
pub fn exp_twist(twist: &Vector6<f64>) -> Isometry3<f64> {
    Isometry3::new(
        Vector3::new(twist[0], twist[1], twist[2]),
        Vector3::new(twist[3], twist[4], twist[5]),
    )
}

/// Inverse of [`exp_twist`]: translation and scaled rotation axis.
#[inline]
pub fn log_pose(pose: &Isometry3<f64>) -> Vector6<f64> {
    let t = pose.translation.vector;
    let r = pose.rotation.scaled_axis();
    Vector6::new(t.x, t.y, t.z, r.x, r.y, r.z)
}

/// Adjoint of a pose acting on `(ρ, φ)` twists.
pub fn adjoint(pose: &Isometry3<f64>) -> Matrix6<f64> {
    let r = pose.rotation.to_rotation_matrix().into_inner();
    let t = pose.translation.vector;
    let mut ad = Matrix6::zeros();
    ad.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    ad.fixed_view_mut::<3, 3>(0, 3).copy_from(&(t.cross_matrix() * r));
    ad.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    ad
}

/// Camera motion magnitude used to gate integration.
///
/// Rotation angle (radians) plus half the translation norm (meters).
#[inline]
pub fn motion_magnitude(delta: &Pose) -> f32 {
    delta.rotation.angle() + delta.translation.vector.norm() / 2.0
}

/// Check that every component of a pose is finite.
pub fn is_finite(pose: &Isometry3<f64>) -> bool {
    pose.translation.vector.iter().all(|v| v.is_finite())
        && pose.rotation.coords.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_twist_roundtrip_small() {
        let twist = Vector6::new(0.1, -0.2, 0.05, 0.01, 0.02, -0.03);
        let back = log_pose(&exp_twist(&twist));
        for i in 0..6 {
            assert_relative_eq!(back[i], twist[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_precision_conversion() {
        let pose = Pose::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3));
        let back = to_f32(&to_f64(&pose));
        assert_relative_eq!(back.translation.vector, pose.translation.vector, epsilon = 1e-6);
        assert_relative_eq!(back.rotation.angle_to(&pose.rotation), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_adjoint_matches_conjugation() {
        // T exp(ξ) T⁻¹ == exp(Ad(T) ξ) to first order
        let pose = exp_twist(&Vector6::new(0.5, -1.0, 2.0, 0.3, -0.2, 0.1));
        let xi = Vector6::new(1e-4, -2e-4, 3e-4, 1e-4, 2e-4, -1e-4);
        let lhs = log_pose(&(pose * exp_twist(&xi) * pose.inverse()));
        let rhs = adjoint(&pose) * xi;
        for i in 0..6 {
            assert_relative_eq!(lhs[i], rhs[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_motion_magnitude() {
        let delta = Pose::translation(0.2, 0.0, 0.0);
        assert_relative_eq!(motion_magnitude(&delta), 0.1, epsilon = 1e-6);
        assert_eq!(motion_magnitude(&Pose::identity()), 0.0);
    }
}
