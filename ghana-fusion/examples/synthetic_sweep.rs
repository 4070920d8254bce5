//! Synthetic room sweep through the full fusion pipeline.
//!
//! This example demonstrates:
//! - Rendering depth frames of a box room from a panning camera
//! - Tracking and fusing them with `LargeKinfu`
//! - Watching submap transitions and pose graph commits
//! - Exporting the fused cloud (PLY) and a shaded render (PPM)
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release --example synthetic_sweep -- --frames 120 --output output
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use ghana_fusion::{
    DepthFrame, FrameSize, Image, Intrinsics, LargeKinfu, Params, PointCloud, Pose, RgbaImage,
};
use nalgebra::{Point3, Vector3};

#[derive(Parser, Debug)]
#[command(name = "synthetic_sweep", about = "Fuse a synthetic panning sweep of a room")]
struct Args {
    /// Number of frames to render
    #[arg(long, default_value_t = 120)]
    frames: usize,

    /// Camera rotation per frame (radians)
    #[arg(long, default_value_t = 0.03)]
    step: f32,

    /// YAML configuration (defaults to the coarse hashed preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the pose graph solve on a worker thread
    #[arg(long, default_value_t = false)]
    background: bool,

    /// Directory for the PLY cloud and PPM render
    #[arg(long, default_value = "output")]
    output: PathBuf,
}

/// Room interior as (min, max) corners; world frame is the first camera.
const ROOM: ([f32; 3], [f32; 3]) = ([-3.0, -1.4, -2.5], [3.0, 1.0, 3.5]);

/// Pillars standing on the floor, giving ICP something besides planes.
const PILLARS: [([f32; 3], [f32; 3]); 4] = [
    ([-1.0, -1.4, 2.0], [-0.6, 1.0, 2.4]),
    ([1.6, -1.4, 0.4], [2.0, 1.0, 0.8]),
    ([0.4, -1.4, -1.8], [0.8, 1.0, -1.4]),
    ([-2.2, -1.4, -0.6], [-1.8, 1.0, -0.2]),
];

/// Distance along `dir` to the first surface seen from inside the room.
fn cast(origin: &Point3<f32>, dir: &Vector3<f32>) -> f32 {
    let (room_min, room_max) = ROOM;
    let mut t = f32::INFINITY;
    for axis in 0..3 {
        if dir[axis] > 1e-9 {
            t = t.min((room_max[axis] - origin[axis]) / dir[axis]);
        } else if dir[axis] < -1e-9 {
            t = t.min((room_min[axis] - origin[axis]) / dir[axis]);
        }
    }

    for (lo, hi) in PILLARS {
        let mut near = f32::NEG_INFINITY;
        let mut far = f32::INFINITY;
        for axis in 0..3 {
            if dir[axis].abs() < 1e-9 {
                if origin[axis] < lo[axis] || origin[axis] > hi[axis] {
                    near = f32::INFINITY;
                }
                continue;
            }
            let t0 = (lo[axis] - origin[axis]) / dir[axis];
            let t1 = (hi[axis] - origin[axis]) / dir[axis];
            near = near.max(t0.min(t1));
            far = far.min(t0.max(t1));
        }
        if near <= far && near > 0.0 {
            t = t.min(near);
        }
    }
    if t.is_finite() { t } else { 0.0 }
}

fn render_depth(pose: &Pose, intr: &Intrinsics, size: FrameSize) -> DepthFrame {
    let origin = Point3::from(pose.translation.vector);
    let mut depth = Image::filled(size.width, size.height, 0.0f32);
    for y in 0..size.height {
        for x in 0..size.width {
            let ray = Vector3::new(
                (x as f32 - intr.cx) / intr.fx,
                (y as f32 - intr.cy) / intr.fy,
                1.0,
            );
            *depth.at_mut(x, y) = cast(&origin, &(pose.rotation * ray));
        }
    }
    depth
}

fn write_ply(path: &Path, cloud: &PointCloud) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "ply\nformat ascii 1.0\nelement vertex {}", cloud.len())?;
    writeln!(out, "property float x\nproperty float y\nproperty float z")?;
    writeln!(out, "property float nx\nproperty float ny\nproperty float nz\nend_header")?;
    for (p, n) in cloud.points.iter().zip(&cloud.normals) {
        writeln!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z)?;
    }
    out.flush()
}

fn write_ppm(path: &Path, image: &RgbaImage) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "P6\n{} {}\n255", image.width(), image.height())?;
    for px in image.data() {
        out.write_all(&px[..3])?;
    }
    out.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => Params::load(path)?,
        None => {
            let mut params = Params::hash_tsdf_params(true);
            params.camera.frame_size = FrameSize::new(160, 120);
            params.camera.intrinsics = Intrinsics::centered(params.camera.frame_size, 140.0);
            params.tracking.icp_min_correspondences = 60;
            params.volume.max_ray_distance = 8.0;
            params.volume.depth_trunc_threshold = 8.0;
            params.preprocess.truncate_threshold = 8.0;
            params
        }
    };
    params.optimizer.background |= args.background;

    let intr = params.camera.intrinsics;
    let size = params.camera.frame_size;
    let mut kinfu = LargeKinfu::new(params)?;

    let start = Instant::now();
    let mut lost = 0;
    let mut worst_error = 0.0f32;
    for i in 0..args.frames {
        let truth = Pose::new(Vector3::zeros(), Vector3::new(0.0, i as f32 * args.step, 0.0));
        let status = kinfu.update(&render_depth(&truth, &intr, size))?;
        if !status.tracked {
            lost += 1;
        }
        if let Some(id) = status.new_submap {
            println!("frame {:4}: started {} (visibility {:.2})", i, id, status.visibility);
        }
        let estimated = kinfu.get_pose();
        worst_error = worst_error.max((truth.inverse() * estimated).rotation.angle());
    }
    let elapsed = start.elapsed();

    println!();
    println!("Frames:        {} ({} lost)", args.frames, lost);
    println!(
        "Throughput:    {:.1} fps",
        args.frames as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    println!("Submaps:       {}", kinfu.submaps().len());
    println!("Divergences:   {}", kinfu.divergence_count());
    println!("Worst heading: {:.2} deg", worst_error.to_degrees());

    std::fs::create_dir_all(&args.output)?;
    let cloud = kinfu.get_cloud();
    let ply = args.output.join("sweep.ply");
    let ppm = args.output.join("sweep.ppm");
    write_ply(&ply, &cloud)?;
    write_ppm(&ppm, &kinfu.render())?;
    println!("Wrote {} points to {} and render to {}", cloud.len(), ply.display(), ppm.display());

    Ok(())
}
