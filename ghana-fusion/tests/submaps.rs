//! Submap lifecycle tests on synthetic trajectories.
//!
//! Run with: cargo test --test submaps -- --nocapture

mod common;

use common::{Scene, pan_path, straight_path, test_params};
use ghana_fusion::{
    FrameStatus, LargeKinfu, Params, Pose, SubmapId, SubmapState, VisibilityMetric, VolumeKind,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Feed a trajectory and collect per-frame statuses plus the submap count after each frame.
fn run(params: Params, path: &[Pose]) -> (LargeKinfu, Vec<FrameStatus>, Vec<usize>) {
    let scene = Scene::room();
    let intr = params.camera.intrinsics;
    let size = params.camera.frame_size;
    let mut kinfu = LargeKinfu::new(params).unwrap();
    let mut statuses = Vec::new();
    let mut counts = Vec::new();
    for pose in path {
        let status = kinfu.update(&scene.render_depth(pose, &intr, size)).unwrap();
        statuses.push(status);
        counts.push(kinfu.submaps().len());
    }
    (kinfu, statuses, counts)
}

fn transitions(statuses: &[FrameStatus]) -> usize {
    statuses.iter().skip(1).filter(|s| s.new_submap.is_some()).count()
}

#[test]
fn test_straight_path_submap_count() {
    init_logging();
    let mut params = test_params();
    // Dense volume: the path runs past its extent
    params.volume.kind = VolumeKind::Tsdf;
    params.volume.resolution = [96; 3];
    params.volume.origin = [-1.44, -1.44, 0.5];
    params.submap.min_visibility_ratio = 0.6;
    params.submap.min_frames_between_submaps = 5;

    let path = straight_path(40, 0.075);
    let (kinfu, statuses, counts) = run(params, &path);

    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "count decreased: {:?}", counts);
    assert_eq!(kinfu.submaps().len(), 1 + transitions(&statuses));

    // Ids are assigned in creation order
    for (i, submap) in kinfu.submaps().iter().enumerate() {
        assert_eq!(submap.id, SubmapId::new(i as u32));
    }
    // Exactly one submap receives frames
    let active = kinfu
        .submaps()
        .iter()
        .filter(|s| s.state == SubmapState::Active)
        .count();
    assert_eq!(active, 1);
}

#[test]
fn test_turning_away_spawns_submap() {
    init_logging();
    let mut params = test_params();
    params.submap.min_frames_between_submaps = 5;
    params.submap.overlap_frames = 3;

    // A quarter turn leaves the first view entirely
    let path = pan_path(60, 0.03);
    let (kinfu, statuses, counts) = run(params, &path);

    assert!(statuses.iter().all(|s| s.tracked));
    let created = transitions(&statuses);
    assert!(created >= 1, "no transition after a quarter turn");
    assert_eq!(*counts.last().unwrap(), 1 + created);

    // Consecutive submaps are linked in the pose graph
    let graph = kinfu.submap_manager().graph();
    assert_eq!(graph.num_nodes(), kinfu.submaps().len());
    for pair in kinfu.submaps().windows(2) {
        assert!(graph.edge_between(pair[0].id, pair[1].id).is_some());
    }

    // Overlap tracking ends after the configured number of frames
    let last = kinfu.submaps().len() - 1;
    let lingering = kinfu.submaps()[..last]
        .iter()
        .filter(|s| s.state == SubmapState::Overlapping)
        .filter(|s| s.overlap_started_at.is_some_and(|f| f + 3 < kinfu.frame_count() - 1))
        .count();
    assert_eq!(lingering, 0);

    // Each new submap starts at the camera pose it was created from
    for submap in &kinfu.submaps()[1..] {
        let start = path[submap.created_at_frame as usize];
        let angle = (submap.pose.inverse() * start).rotation.angle();
        assert!(angle < 0.05, "{} seeded {:.3} rad off", submap.id, angle);
    }
}

#[test]
fn test_raycast_coverage_metric() {
    init_logging();
    let mut params = test_params();
    params.submap.visibility_metric = VisibilityMetric::RaycastCoverage;
    params.submap.min_visibility_ratio = 0.5;
    params.submap.min_frames_between_submaps = 5;

    let (kinfu, statuses, counts) = run(params.clone(), &pan_path(60, 0.03));
    assert!(transitions(&statuses) >= 1);
    assert_eq!(*counts.last().unwrap(), kinfu.submaps().len());

    // Standing still never drops coverage
    let (still, statuses, _) = run(params, &vec![Pose::identity(); 20]);
    assert_eq!(still.submaps().len(), 1);
    assert!(statuses.iter().all(|s| s.visibility > 0.5));
}

#[test]
fn test_background_optimization_commits() {
    init_logging();
    let mut params = test_params();
    params.submap.min_frames_between_submaps = 5;
    params.optimizer.background = true;

    let (mut kinfu, _, _) = run(params, &pan_path(60, 0.03));
    assert_eq!(kinfu.divergence_count(), 0);

    // Manual solve waits for any background job and keeps the gauge fixed
    let result = kinfu.optimize_pose_graph().unwrap();
    assert!(result.final_error <= result.initial_error + 1e-9);
    assert_eq!(kinfu.submaps()[0].pose, Pose::identity());
}

#[test]
fn test_frame_trigger_optimizes_on_schedule() {
    init_logging();
    let mut params = test_params();
    params.submap.min_frames_between_submaps = 5;
    params.optimizer.optimize_every_n_submaps = 0;
    params.optimizer.optimize_every_n_frames = 5;

    let (kinfu, statuses, _) = run(params, &pan_path(60, 0.03));
    let first = statuses
        .iter()
        .skip(1)
        .find(|s| s.new_submap.is_some())
        .map(|s| s.frame_id)
        .expect("no transition after a quarter turn");

    for status in statuses.iter().filter(|s| s.optimized) {
        assert_eq!(status.frame_id % 5, 0, "optimized off schedule at {}", status.frame_id);
        assert!(status.frame_id >= first);
    }

    // Every scheduled frame with an edge either committed or was discarded
    let due = statuses
        .iter()
        .filter(|s| s.frame_id % 5 == 0 && s.frame_id >= first)
        .count();
    let committed = statuses.iter().filter(|s| s.optimized).count();
    assert_eq!(committed + kinfu.divergence_count(), due);
}
