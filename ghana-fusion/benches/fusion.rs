//! Benchmark the per-frame pipeline stages.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ghana_fusion::{
    BilateralFilter, DepthFilter, DepthFrame, FramePyramid, FrameSize, GraphOptimizer,
    GraphOptimizerConfig, Image, IcpConfig, IcpTracker, Intrinsics, LargeKinfu, Params, Pose,
    PoseGraph, SubmapId, Volume, VolumeKind, VolumeParams,
};
use ghana_fusion::graph::default_information;
use nalgebra::Vector3;

const SIZE: FrameSize = FrameSize {
    width: 320,
    height: 240,
};

/// Depth of a slanted wall with a step, enough structure for ICP.
fn slanted_wall(size: FrameSize, shift: f32) -> DepthFrame {
    let mut depth = Image::filled(size.width, size.height, 0.0f32);
    for y in 0..size.height {
        for x in 0..size.width {
            let u = x as f32 / size.width as f32;
            let v = y as f32 / size.height as f32;
            let step = if u > 0.5 + shift { 0.3 } else { 0.0 };
            *depth.at_mut(x, y) = 1.5 + 0.4 * u + 0.2 * v - step;
        }
    }
    depth
}

fn bench_preprocess(c: &mut Criterion) {
    let intr = Intrinsics::centered(SIZE, 262.5);
    let depth = slanted_wall(SIZE, 0.0);
    let filter = BilateralFilter::default();

    c.bench_function("bilateral_filter_320x240", |b| {
        b.iter(|| filter.filter(black_box(&depth)))
    });
    c.bench_function("pyramid_3_levels_320x240", |b| {
        b.iter(|| FramePyramid::from_depth(black_box(&depth), &intr, 3, 0.04))
    });
}

fn bench_volume(c: &mut Criterion) {
    let intr = Intrinsics::centered(SIZE, 262.5);
    let depth = slanted_wall(SIZE, 0.0);
    let mut group = c.benchmark_group("volume");

    for kind in [VolumeKind::Tsdf, VolumeKind::HashTsdf] {
        let params = VolumeParams::coarse_params(kind);
        group.bench_with_input(BenchmarkId::new("integrate", format!("{:?}", kind)), &params, |b, params| {
            let mut volume = Volume::new(params);
            b.iter(|| volume.integrate(black_box(&depth), &Pose::identity(), &intr))
        });

        let mut volume = Volume::new(&params);
        volume.integrate(&depth, &Pose::identity(), &intr);
        group.bench_with_input(BenchmarkId::new("raycast", format!("{:?}", kind)), &volume, |b, volume| {
            b.iter(|| volume.raycast(black_box(&Pose::identity()), &intr, SIZE))
        });
    }
    group.finish();
}

fn bench_icp(c: &mut Criterion) {
    let intr = Intrinsics::centered(SIZE, 262.5);
    let reference = FramePyramid::from_depth(&slanted_wall(SIZE, 0.0), &intr, 3, 0.04);
    let current = FramePyramid::from_depth(&slanted_wall(SIZE, 0.01), &intr, 3, 0.04);
    let tracker = IcpTracker::new(IcpConfig {
        min_correspondences: 50,
        ..Default::default()
    });

    c.bench_function("icp_track_320x240", |b| {
        b.iter(|| tracker.track(black_box(&current), &reference, &intr, &Pose::identity()))
    });
}

fn bench_pose_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_graph");
    for n in [10u32, 50, 100] {
        let mut graph = PoseGraph::new();
        for i in 0..n {
            let drift = Vector3::new(0.0, 0.01 * i as f32, 0.0);
            graph.add_node(SubmapId::new(i), Pose::new(Vector3::new(i as f32, 0.0, 0.0), drift));
        }
        for i in 0..n - 1 {
            let _ = graph.add_edge(
                SubmapId::new(i),
                SubmapId::new(i + 1),
                Pose::translation(1.0, 0.0, 0.0),
                default_information(),
            );
        }
        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        group.bench_with_input(BenchmarkId::new("optimize_chain", n), &graph, |b, graph| {
            b.iter(|| optimizer.optimize(black_box(graph)))
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut params = Params::hash_tsdf_params(true);
    params.camera.frame_size = SIZE;
    params.camera.intrinsics = Intrinsics::centered(SIZE, 262.5);
    let frames: Vec<DepthFrame> = (0..10).map(|i| slanted_wall(SIZE, 0.002 * i as f32)).collect();

    c.bench_function("large_kinfu_update_320x240", |b| {
        b.iter_batched(
            || LargeKinfu::new(params.clone()).map(|k| (k, frames.clone())),
            |setup| {
                if let Ok((mut kinfu, frames)) = setup {
                    for depth in &frames {
                        let _ = kinfu.update(black_box(depth));
                    }
                }
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_preprocess,
    bench_volume,
    bench_icp,
    bench_pose_graph,
    bench_update
);
criterion_main!(benches);
