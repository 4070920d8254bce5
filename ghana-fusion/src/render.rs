//! Phong shading of raycast point/normal maps.
//!
//! ```text
//! I = Ka + Kd · max(0, n·l) + Ks · max(0, r·v)^sp
//! ```
//!
//! with `l` toward the light, `v` toward the camera and `r` the reflection
//! of `l` about `n`. Pixels without a surface are dark green.

use nalgebra::Point3;
use rayon::prelude::*;

use crate::core::{Image, NormalMap, PointMap, is_valid_point, is_valid_vec};

/// RGBA8 image.
pub type RgbaImage = Image<[u8; 4]>;

const AMBIENT: f32 = 0.3;
const DIFFUSE: f32 = 0.5;
const SPECULAR: f32 = 0.2;
const SHININESS: i32 = 20;

/// Color of pixels without a surface.
pub const BACKGROUND: [u8; 4] = [0, 32, 0, 0];

/// Shade camera-frame points and normals lit from `light` (camera frame).
pub fn render_phong(points: &PointMap, normals: &NormalMap, light: &Point3<f32>) -> RgbaImage {
    let width = points.width();
    let mut image = Image::filled(width, points.height(), BACKGROUND);
    if width == 0 {
        return image;
    }

    image
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.iter_mut().enumerate() {
                let p = points.at(x, y);
                let n = normals.at(x, y);
                if !is_valid_point(p) || !is_valid_vec(n) {
                    continue;
                }
                let to_light = (light - p).normalize();
                let to_camera = (-p.coords).normalize();
                let reflect = (n * (2.0 * n.dot(&to_light)) - to_light).normalize();

                let intensity = AMBIENT
                    + DIFFUSE * n.dot(&to_light).max(0.0)
                    + SPECULAR * reflect.dot(&to_camera).max(0.0).powi(SHININESS);
                let level = (intensity.clamp(0.0, 1.0) * 255.0).round() as u8;
                *pixel = [level, level, level, 255];
            }
        });

    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{nan_point, nan_vector};
    use nalgebra::Vector3;

    #[test]
    fn test_facing_light_is_brightest() {
        let mut points = Image::filled(2, 1, Point3::new(0.0, 0.0, 1.0f32));
        let mut normals = Image::filled(2, 1, Vector3::new(0.0, 0.0, -1.0f32));
        // Second pixel tilted away from the light
        *points.at_mut(1, 0) = Point3::new(0.0, 0.0, 1.0);
        *normals.at_mut(1, 0) = Vector3::new(1.0, 0.0, -1.0).normalize();

        let image = render_phong(&points, &normals, &Point3::origin());
        let facing = image.at(0, 0);
        let tilted = image.at(1, 0);
        assert_eq!(facing[0], 255);
        assert_eq!(facing[3], 255);
        assert!(tilted[0] < facing[0]);
        assert!(tilted[0] >= (AMBIENT * 255.0) as u8);
    }

    #[test]
    fn test_missing_pixels_use_background() {
        let points = Image::filled(3, 2, nan_point());
        let normals = Image::filled(3, 2, nan_vector());
        let image = render_phong(&points, &normals, &Point3::origin());
        assert!(image.data().iter().all(|px| *px == BACKGROUND));
    }
}
