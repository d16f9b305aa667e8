mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeConcat, FakeMedia, FakeTrimmer, Harness};
use quiclip::app::JobState;
use quiclip::domain::model::{ClipRequest, JobSpec};
use quiclip::error::{ErrorKind, QuiclipError};

fn request(file: &str, start: f64, end: f64, position: usize) -> ClipRequest {
    ClipRequest::new(file, start, end, position).unwrap()
}

#[tokio::test]
async fn test_clip_job_snaps_and_assembles() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("talk.mp4", &FakeMedia::h264(60.0, 2.0));

    let spec = JobSpec::Clip(vec![
        request("talk.mp4", 0.0, 10.0, 0),
        request("talk.mp4", 10.0, 20.0, 1),
        request("talk.mp4", 25.3, 30.0, 2),
    ]);
    let handle = harness
        .pipeline
        .submit_job(spec, Some(Path::new("highlights.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done, "{:?}", status.failure);
    assert_eq!(status.progress, 1.0);

    let cuts: Vec<f64> = status.segments.iter().map(|s| s.cut_start).collect();
    let exact: Vec<bool> = status.segments.iter().map(|s| s.exact).collect();
    assert_eq!(cuts, vec![0.0, 10.0, 24.0]);
    assert_eq!(exact, vec![true, true, false]);

    let output = harness.output_dir().join("highlights.mp4");
    assert_eq!(status.output, output);
    assert_eq!(harness.outputs(), vec![output.clone()]);

    // Copy cuts can only start early, by less than one keyframe interval
    let requested = 10.0 + 10.0 + 4.7;
    let duration = FakeMedia::read(&output).unwrap().duration();
    assert!(duration >= requested - 1e-9);
    assert!(duration - requested <= 2.0 + 1e-9, "duration {}", duration);

    assert!(harness.temp_leftovers().is_empty(), "{:?}", harness.temp_leftovers());
}

#[tokio::test]
async fn test_snap_tolerance_warning_is_reported() {
    let harness = Harness::with(FakeTrimmer::default(), FakeConcat::default(), |config| {
        config.snap_tolerance = Some(1.0);
    });
    harness.add_media("talk.mp4", &FakeMedia::h264(60.0, 2.0));

    let spec = JobSpec::Clip(vec![
        request("talk.mp4", 4.5, 8.0, 0),
        request("talk.mp4", 25.9, 30.0, 1),
    ]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done);
    assert_eq!(status.warnings.len(), 1);
    assert_eq!(status.warnings[0].position, 1);
    assert_eq!(status.warnings[0].cut_start, 24.0);
}

#[tokio::test]
async fn test_cuts_count_from_first_frame() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("cam.ts", &FakeMedia::h264(60.0, 2.0).with_start_time(1.4));

    let spec = JobSpec::Clip(vec![
        request("cam.ts", 10.0, 14.0, 0),
        request("cam.ts", 21.0, 25.0, 1),
    ]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done, "{:?}", status.failure);
    assert!(status.segments[0].exact);
    assert!((status.segments[0].cut_start - 10.0).abs() < 1e-9);
    assert!(!status.segments[1].exact);
    assert!((status.segments[1].cut_start - 20.0).abs() < 1e-9);
    assert!(status.output.extension().is_some_and(|e| e == "ts"));
}

#[tokio::test]
async fn test_failed_segment_fails_whole_job() {
    let harness = Harness::new(FakeTrimmer::failing_on("bad.mp4"));
    for name in ["a.mp4", "bad.mp4", "c.mp4"] {
        harness.add_media(name, &FakeMedia::h264(30.0, 2.0));
    }

    let spec = JobSpec::Clip(vec![
        request("a.mp4", 0.0, 5.0, 0),
        request("bad.mp4", 0.0, 5.0, 1),
        request("c.mp4", 0.0, 5.0, 2),
    ]);
    let handle = harness
        .pipeline
        .submit_job(spec, Some(Path::new("joined.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Failed);
    let failure = status.error().unwrap();
    assert_eq!(failure.kind, ErrorKind::Extraction);
    assert_eq!(failure.segment_index, Some(1));
    assert!(failure.message.contains("Invalid data"));

    assert!(harness.outputs().is_empty());
    assert!(harness.temp_leftovers().is_empty(), "{:?}", harness.temp_leftovers());
}

#[tokio::test]
async fn test_assembly_failure_leaves_no_output() {
    let harness = Harness::with(
        FakeTrimmer::default(),
        FakeConcat { fail: true },
        |_| {},
    );
    harness.add_media("a.mp4", &FakeMedia::h264(30.0, 2.0));

    let spec = JobSpec::Clip(vec![request("a.mp4", 0.0, 5.0, 0)]);
    let handle = harness
        .pipeline
        .submit_job(spec, Some(Path::new("out.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.error().unwrap().kind, ErrorKind::Assembly);
    assert!(harness.outputs().is_empty(), "{:?}", harness.outputs());
    assert!(harness.temp_leftovers().is_empty());
}

#[tokio::test]
async fn test_cancel_during_extraction() {
    let harness = Harness::new(FakeTrimmer::slow(Duration::from_secs(30)));
    harness.add_media("a.mp4", &FakeMedia::h264(60.0, 2.0));

    let spec = JobSpec::Clip(vec![
        request("a.mp4", 0.0, 10.0, 0),
        request("a.mp4", 20.0, 30.0, 1),
        request("a.mp4", 40.0, 50.0, 2),
    ]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.trimmer.started() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("extraction never started");
    assert_eq!(
        harness.pipeline.status(&handle).unwrap().state,
        JobState::Extracting
    );

    harness.pipeline.cancel(&handle).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), harness.pipeline.wait(&handle))
        .await
        .expect("job did not stop after cancel")
        .unwrap();

    assert_eq!(status.state, JobState::Cancelled);
    assert_ne!(status.state, JobState::Done);
    assert_eq!(status.error().unwrap().kind, ErrorKind::Cancelled);
    assert!(harness.outputs().is_empty());
    assert!(harness.temp_leftovers().is_empty(), "{:?}", harness.temp_leftovers());

    // Cancelling again is harmless and the state stays terminal
    harness.pipeline.cancel(&handle).unwrap();
    assert_eq!(
        harness.pipeline.status(&handle).unwrap().state,
        JobState::Cancelled
    );
}

#[tokio::test]
async fn test_extraction_respects_worker_limit() {
    let harness = Harness::new(FakeTrimmer::slow(Duration::from_millis(30)));
    harness.add_media("a.mp4", &FakeMedia::h264(60.0, 2.0));

    let requests = (0..6)
        .map(|i| request("a.mp4", i as f64 * 8.0, i as f64 * 8.0 + 4.0, i))
        .collect();
    let handle = harness
        .pipeline
        .submit_job(JobSpec::Clip(requests), None)
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done);
    assert_eq!(harness.trimmer.started(), 6);
    let peak = harness.trimmer.max_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency {}", peak);
}

#[tokio::test]
async fn test_segments_follow_position_order() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("a.mp4", &FakeMedia::h264(60.0, 2.0));
    harness.add_media("b.mp4", &FakeMedia::h264(60.0, 2.0));

    let spec = JobSpec::Clip(vec![
        request("b.mp4", 30.0, 40.0, 1),
        request("a.mp4", 0.0, 5.0, 0),
    ]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done);
    let names: Vec<String> = status
        .segments
        .iter()
        .map(|s| s.source.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.mp4", "b.mp4"]);
    // Each distinct source is probed once for planning, plus once per extracted part
    assert_eq!(harness.prober.probes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_empty_range_fails_at_planning() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("short.mp4", &FakeMedia::h264(20.0, 2.0));

    let spec = JobSpec::Clip(vec![
        request("short.mp4", 0.0, 5.0, 0),
        request("short.mp4", 25.0, 30.0, 1),
    ]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Failed);
    let failure = status.error().unwrap();
    assert_eq!(failure.kind, ErrorKind::EmptyRange);
    assert_eq!(failure.segment_index, Some(1));
    assert_eq!(harness.trimmer.started(), 0);
}

#[tokio::test]
async fn test_merge_job_joins_whole_files() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("day1/a.mp4", &FakeMedia::h264(12.0, 2.0));
    harness.add_media("day1/b.mp4", &FakeMedia::h264(8.5, 2.0));

    let spec = JobSpec::Merge(vec![PathBuf::from("day1/a.mp4"), PathBuf::from("day1/b.mp4")]);
    let handle = harness.pipeline.submit_job(spec, None).unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done, "{:?}", status.failure);
    assert_eq!(harness.trimmer.started(), 0);

    let name = status.output.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("quiclip-merge-"), "{}", name);
    assert!(name.ends_with(".mp4"));
    assert_eq!(FakeMedia::read(&status.output).unwrap().duration(), 20.5);
}

#[tokio::test]
async fn test_incompatible_merge_is_rejected() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));
    harness.add_media("b.mp4", &FakeMedia::h264(10.0, 2.0));
    harness.add_media("c.mp4", &FakeMedia::h264(10.0, 2.0).with_video_codec("hevc"));

    let spec = JobSpec::Merge(vec![
        PathBuf::from("a.mp4"),
        PathBuf::from("b.mp4"),
        PathBuf::from("c.mp4"),
    ]);
    let handle = harness
        .pipeline
        .submit_job(spec, Some(Path::new("all.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Failed);
    let failure = status.error().unwrap();
    assert_eq!(failure.kind, ErrorKind::IncompatibleSegments);
    assert_eq!(failure.segment_index, Some(2));
    assert!(failure.message.contains("video codec"), "{}", failure.message);
    assert!(harness.outputs().is_empty());
}

#[tokio::test]
async fn test_paths_outside_scope_are_rejected_at_submission() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));
    std::fs::write(harness.base.path().join("secret.mp4"), b"{}").unwrap();

    let outside = JobSpec::Clip(vec![request("../secret.mp4", 0.0, 5.0, 0)]);
    assert!(matches!(
        harness.pipeline.submit_job(outside, None),
        Err(QuiclipError::PathScope { .. })
    ));

    let absolute = JobSpec::Merge(vec![harness.base.path().join("secret.mp4")]);
    assert!(matches!(
        harness.pipeline.submit_job(absolute, None),
        Err(QuiclipError::PathScope { .. })
    ));

    let inside = JobSpec::Clip(vec![request("a.mp4", 0.0, 5.0, 0)]);
    assert!(matches!(
        harness
            .pipeline
            .submit_job(inside, Some(Path::new("../escape.mp4"))),
        Err(QuiclipError::PathScope { .. })
    ));
    assert_eq!(harness.trimmer.started(), 0);
}

#[tokio::test]
async fn test_existing_output_is_not_replaced() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));
    std::fs::write(harness.output_dir().join("taken.mp4"), b"keep me").unwrap();

    let spec = JobSpec::Clip(vec![request("a.mp4", 0.0, 5.0, 0)]);
    let err = harness
        .pipeline
        .submit_job(spec, Some(Path::new("taken.mp4")))
        .unwrap_err();
    assert!(matches!(err, QuiclipError::OutputExists { .. }));
    assert_eq!(
        std::fs::read(harness.output_dir().join("taken.mp4")).unwrap(),
        b"keep me"
    );
}

#[tokio::test]
async fn test_overwrite_replaces_existing_output() {
    let harness = Harness::with(FakeTrimmer::default(), FakeConcat::default(), |config| {
        config.overwrite = true;
    });
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));
    std::fs::write(harness.output_dir().join("taken.mp4"), b"old").unwrap();

    let spec = JobSpec::Clip(vec![request("a.mp4", 2.0, 6.0, 0)]);
    let handle = harness
        .pipeline
        .submit_job(spec, Some(Path::new("taken.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&handle).await.unwrap();

    assert_eq!(status.state, JobState::Done);
    let media = FakeMedia::read(&harness.output_dir().join("taken.mp4")).unwrap();
    assert_eq!(media.duration(), 4.0);
}

#[tokio::test]
async fn test_output_claimed_by_running_job_is_rejected() {
    let harness = Harness::with(
        FakeTrimmer::slow(Duration::from_millis(200)),
        FakeConcat::default(),
        |config| config.overwrite = true,
    );
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));
    let spec = || JobSpec::Clip(vec![request("a.mp4", 0.0, 4.0, 0)]);

    let first = harness
        .pipeline
        .submit_job(spec(), Some(Path::new("shared.mp4")))
        .unwrap();
    let err = harness
        .pipeline
        .submit_job(spec(), Some(Path::new("shared.mp4")))
        .unwrap_err();
    assert!(matches!(err, QuiclipError::OutputExists { .. }));
    assert_eq!(err.kind(), ErrorKind::OutputExists);

    let status = harness.pipeline.wait(&first).await.unwrap();
    assert_eq!(status.state, JobState::Done);

    // Released once the first job finished
    let again = harness
        .pipeline
        .submit_job(spec(), Some(Path::new("shared.mp4")))
        .unwrap();
    let status = harness.pipeline.wait(&again).await.unwrap();
    assert_eq!(status.state, JobState::Done, "{:?}", status.failure);
    assert_eq!(harness.outputs().len(), 1);
}

#[tokio::test]
async fn test_concurrent_default_outputs_are_distinct() {
    let harness = Harness::new(FakeTrimmer::slow(Duration::from_millis(100)));
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let spec = JobSpec::Clip(vec![request("a.mp4", 0.0, 4.0, 0)]);
            harness.pipeline.submit_job(spec, None).unwrap()
        })
        .collect();

    let mut outputs = Vec::new();
    for handle in &handles {
        let status = harness.pipeline.wait(handle).await.unwrap();
        assert_eq!(status.state, JobState::Done, "{:?}", status.failure);
        outputs.push(status.output);
    }
    outputs.sort();
    outputs.dedup();
    assert_eq!(outputs.len(), 3);
    assert_eq!(harness.outputs(), outputs);
}

#[tokio::test]
async fn test_oldest_finished_jobs_are_forgotten() {
    let harness = Harness::with(FakeTrimmer::default(), FakeConcat::default(), |config| {
        config.retained_jobs = 1;
    });
    harness.add_media("a.mp4", &FakeMedia::h264(10.0, 2.0));

    let first = harness
        .pipeline
        .submit_job(JobSpec::Clip(vec![request("a.mp4", 0.0, 2.0, 0)]), None)
        .unwrap();
    harness.pipeline.wait(&first).await.unwrap();
    assert!(harness.pipeline.status(&first).is_ok());

    let second = harness
        .pipeline
        .submit_job(JobSpec::Clip(vec![request("a.mp4", 2.0, 4.0, 0)]), None)
        .unwrap();
    let status = harness.pipeline.wait(&second).await.unwrap();
    assert_eq!(status.state, JobState::Done);

    assert!(matches!(
        harness.pipeline.status(&first),
        Err(QuiclipError::JobNotFound { .. })
    ));
    assert_eq!(harness.pipeline.status(&second).unwrap().state, JobState::Done);
}

#[tokio::test]
async fn test_list_video_files() {
    let harness = Harness::new(FakeTrimmer::default());
    harness.add_media("b.mkv", &FakeMedia::h264(10.0, 2.0));
    harness.add_media("a.MP4", &FakeMedia::h264(10.0, 2.0));
    harness.add_media("nested/c.mp4", &FakeMedia::h264(10.0, 2.0));
    std::fs::write(harness.base.path().join("media/notes.txt"), b"x").unwrap();

    let root: Vec<PathBuf> = harness
        .pipeline
        .list_video_files(Path::new(""))
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(root, vec![PathBuf::from("a.MP4"), PathBuf::from("b.mkv")]);

    let nested = harness.pipeline.list_video_files(Path::new("nested")).unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].path, PathBuf::from("nested/c.mp4"));

    assert!(matches!(
        harness.pipeline.list_video_files(Path::new("..")),
        Err(QuiclipError::PathScope { .. })
    ));
}
