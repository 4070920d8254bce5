//! Zero-crossing surface extraction.
//!
//! Emits one point wherever the TSDF changes sign between a voxel and its
//! +x, +y or +z neighbor. Cheap and order-stable, not a mesher.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::voxel::{TsdfSource, VoxelCoord};

/// Collect surface points and normals (volume frame) around `coords`.
pub(crate) fn extract_surface<S, I>(source: &S, coords: I) -> (Vec<Point3<f32>>, Vec<Vector3<f32>>)
where
    S: TsdfSource,
    I: ParallelIterator<Item = VoxelCoord>,
{
    coords
        .flat_map_iter(|c| crossings_at(source, c))
        .collect::<Vec<_>>()
        .into_iter()
        .unzip()
}

fn crossings_at<S: TsdfSource>(
    source: &S,
    c: VoxelCoord,
) -> impl Iterator<Item = (Point3<f32>, Vector3<f32>)> + '_ {
    let vs = source.voxel_size();
    let here = source.voxel(c);
    [(1, 0, 0), (0, 1, 0), (0, 0, 1)]
        .into_iter()
        .filter_map(move |(dx, dy, dz)| {
            let v0 = here?;
            let n = c.offset(dx, dy, dz);
            let v1 = source.voxel(n)?;
            if (v0.tsdf > 0.0) == (v1.tsdf > 0.0) {
                return None;
            }
            let p0 = c.center(vs);
            let p1 = n.center(vs);
            let t = v0.tsdf / (v0.tsdf - v1.tsdf);
            let p = p0 + (p1 - p0) * t;
            let normal = source.normal_at(&p)?;
            Some((p, normal))
        })
}
