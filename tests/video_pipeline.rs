use std::cell::Cell;

use headcount::detect::{ScriptedBackend, SyntheticCrowdBackend};
use headcount::ingest::{DiscardSink, MemorySink, MemorySource, VideoFileSink, VideoFileSource};
use headcount::{
    build_detector, Annotator, CancelToken, Completion, DetectorSettings, Frame, FrameSource,
    MediaPipeline, ModelFamily, PipelineError, RawOutput,
};

fn people(count: usize) -> RawOutput {
    let rows: Vec<Vec<f32>> = (0..count)
        .map(|i| {
            let cx = 0.1 + i as f32 * 0.15;
            vec![cx, 0.5, 0.1, 0.6, 1.0, 0.9, 0.05]
        })
        .collect();
    if rows.is_empty() {
        RawOutput::grid(&[vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.2, 0.1]])
    } else {
        RawOutput::grid(&rows)
    }
}

fn scripted_pipeline(counts: &[usize]) -> MediaPipeline {
    let backend = ScriptedBackend::new(counts.iter().map(|&c| people(c)));
    let detector = build_detector(
        ModelFamily::GridAnchor,
        Box::new(backend),
        DetectorSettings::default(),
    );
    MediaPipeline::new(detector, Annotator::new())
}

fn clip(n: usize) -> MemorySource {
    MemorySource::new(vec![Frame::filled(320, 180, [30, 60, 90]); n])
}

#[test]
fn aggregate_is_the_peak_frame_count() {
    let mut pipeline = scripted_pipeline(&[2, 5, 3, 0]);
    let mut source = clip(4);
    let mut sink = MemorySink::new();
    let result = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap();

    assert_eq!(result.aggregate_count(), 5);
    assert_eq!(result.completion(), Completion::Finished);
    let counts: Vec<usize> = result.frame_results().iter().map(|r| r.count()).collect();
    assert_eq!(counts, vec![2, 5, 3, 0]);
    assert_eq!(sink.frames().len(), 4);
    assert!(sink.is_finished());
    assert!((result.mean_count() - 2.5).abs() < 1e-9);
}

#[test]
fn cancellation_after_k_frames_covers_only_those_frames() {
    let mut pipeline = scripted_pipeline(&[1, 4, 2, 6, 3]);
    let mut source = clip(5);
    let mut sink = MemorySink::new();
    let cancel = CancelToken::new();
    let result = pipeline
        .process_video(&mut source, &mut sink, &cancel, |progress| {
            if progress.frame_index + 1 == 3 {
                cancel.cancel();
            }
        })
        .unwrap();

    assert_eq!(
        result.completion(),
        Completion::Cancelled { frames_processed: 3 }
    );
    assert_eq!(result.frames_processed(), 3);
    assert_eq!(result.frame_results().len(), 3);
    assert_eq!(result.aggregate_count(), 4);
    assert_eq!(sink.frames().len(), 3);
    assert!(sink.is_finished());
}

#[test]
fn empty_video_finishes_with_zero() {
    let mut pipeline = scripted_pipeline(&[]);
    let mut source = clip(0);
    let mut sink = MemorySink::new();
    let result = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap();
    assert_eq!(result.aggregate_count(), 0);
    assert_eq!(result.frames_processed(), 0);
    assert_eq!(result.completion(), Completion::Finished);
    assert!(sink.is_finished());
}

#[test]
fn sink_fault_stops_the_run_and_still_finalizes() {
    let mut pipeline = scripted_pipeline(&[1, 1, 1, 1]);
    let mut source = clip(4);
    let mut sink = MemorySink::new().rejecting_at(2);
    let err = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap_err();
    assert!(matches!(err, PipelineError::Sink { frame_index: 2, .. }));
    assert_eq!(sink.frames().len(), 2);
    assert!(sink.is_finished());
}

#[test]
fn failed_finalize_is_a_sink_fault() {
    let mut pipeline = scripted_pipeline(&[1]);
    let mut source = clip(1);
    let mut sink = MemorySink::new().failing_finish();
    let err = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap_err();
    assert!(matches!(err, PipelineError::Sink { frame_index: 1, .. }));
}

#[test]
fn inference_fault_is_not_a_zero_count() {
    let backend = ScriptedBackend::new([people(2), people(2)]).failing_at(1, "device lost");
    let detector = build_detector(
        ModelFamily::GridAnchor,
        Box::new(backend),
        DetectorSettings::default(),
    );
    let mut pipeline = MediaPipeline::new(detector, Annotator::new());
    let mut source = clip(3);
    let mut sink = MemorySink::new();
    let err = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap_err();
    assert!(matches!(err, PipelineError::Inference { backend: "scripted", .. }));
    assert_eq!(sink.frames().len(), 1);
}

#[test]
fn frames_reach_the_sink_in_order() {
    let frames: Vec<Frame> = (0..4u8)
        .map(|shade| Frame::filled(64, 64, [shade * 50, 0, 0]))
        .collect();
    let mut pipeline = scripted_pipeline(&[0, 0, 0, 0]);
    let mut source = MemorySource::new(frames);
    let mut sink = MemorySink::new();
    pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap();
    let shades: Vec<u8> = sink
        .frames()
        .iter()
        .map(|frame| frame.pixel(63, 0).unwrap()[0])
        .collect();
    assert_eq!(shades, vec![0, 50, 100, 150]);
}

#[test]
fn synthetic_clip_and_crowd_agree_end_to_end() {
    let counts = vec![3, 0, 7, 2, 7, 1];
    let backend = SyntheticCrowdBackend::new(ModelFamily::GridAnchor, 11).with_counts(counts.clone());
    let detector = build_detector(
        ModelFamily::GridAnchor,
        Box::new(backend),
        DetectorSettings::default(),
    );
    let mut pipeline = MediaPipeline::new(detector, Annotator::new());
    let mut source = VideoFileSource::open("stub://e2e?frames=6&width=640&height=360").unwrap();
    let mut sink = VideoFileSink::create("stub://out", source.info()).unwrap();
    let updates = Cell::new(0);
    let result = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |progress| {
            assert_eq!(progress.frame_count_hint, Some(6));
            updates.set(updates.get() + 1);
        })
        .unwrap();

    assert_eq!(updates.get(), 6);
    assert_eq!(result.aggregate_count(), 7);
    let detected: Vec<usize> = result.frame_results().iter().map(|r| r.count()).collect();
    assert_eq!(detected, counts);
    assert_eq!(sink.frames_written(), 6);
}

#[test]
fn single_shot_family_runs_over_a_clip() {
    let backend = SyntheticCrowdBackend::new(ModelFamily::SingleShot, 3).with_counts(vec![2, 4]);
    let detector = build_detector(
        ModelFamily::SingleShot,
        Box::new(backend),
        DetectorSettings::default(),
    );
    let mut pipeline = MediaPipeline::new(detector, Annotator::new());
    let mut source = VideoFileSource::open("stub://ssd?frames=4&width=300&height=300").unwrap();
    let mut sink = DiscardSink::new();
    let result = pipeline
        .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
        .unwrap();
    assert_eq!(result.aggregate_count(), 4);
    assert_eq!(sink.written(), 4);
}
