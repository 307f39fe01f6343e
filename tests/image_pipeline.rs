use headcount::detect::ScriptedBackend;
use headcount::ingest::{ImageFileSink, ImageFileSource, MemorySink, MemorySource};
use headcount::{
    build_detector, Annotator, DetectorSettings, Frame, FrameSink, MediaPipeline, ModelFamily,
    PipelineError, RawOutput,
};

const GREY: [u8; 3] = [120, 120, 120];

fn pipeline(family: ModelFamily, outputs: Vec<RawOutput>) -> MediaPipeline {
    let detector = build_detector(
        family,
        Box::new(ScriptedBackend::new(outputs)),
        DetectorSettings::default(),
    );
    MediaPipeline::new(detector, Annotator::new())
}

#[test]
fn image_without_people_counts_zero_and_only_gains_a_label() {
    let mut pipeline = pipeline(ModelFamily::SingleShot, vec![RawOutput::single_shot_table(&[])]);
    let frame = Frame::filled(320, 240, GREY);
    let (annotated, result) = pipeline.process_image(frame.clone()).unwrap();

    assert_eq!(result.aggregate_count(), 0);
    assert_eq!(result.frames_processed(), 1);
    let region = pipeline.annotator().label_region(320, 240, 0).unwrap();
    for y in 0..240u32 {
        for x in 0..320u32 {
            let (xi, yi) = (x as i32, y as i32);
            let in_label = xi >= region.left()
                && xi <= region.right()
                && yi >= region.top()
                && yi <= region.bottom();
            if !in_label {
                assert_eq!(annotated.pixel(x, y), frame.pixel(x, y));
            }
        }
    }
    assert_ne!(annotated, frame);
}

#[test]
fn single_candidate_decodes_to_one_scaled_person() {
    let mut pipeline = pipeline(
        ModelFamily::GridAnchor,
        vec![RawOutput::grid(&[vec![0.5, 0.5, 0.25, 0.5, 0.3, 0.1, 0.8, 0.05]])],
    );
    let (_, result) = pipeline.process_image(Frame::filled(400, 200, GREY)).unwrap();
    // class scores are [0.1, 0.8, 0.05]: the best class is 1, not a person
    assert_eq!(result.aggregate_count(), 0);

    let mut pipeline = pipeline_with_person();
    let (_, result) = pipeline.process_image(Frame::filled(400, 200, GREY)).unwrap();
    assert_eq!(result.aggregate_count(), 1);
    let person = &result.frame_results()[0].boxes()[0];
    let bbox = person.bbox();
    assert_eq!((bbox.x1(), bbox.y1(), bbox.x2(), bbox.y2()), (150, 50, 250, 150));
    assert_eq!(person.class_id(), 0);
    assert!((person.confidence() - 0.8).abs() < 1e-6);
}

fn pipeline_with_person() -> MediaPipeline {
    pipeline(
        ModelFamily::GridAnchor,
        vec![RawOutput::grid(&[vec![0.5, 0.5, 0.25, 0.5, 0.3, 0.8, 0.1, 0.05]])],
    )
}

#[test]
fn empty_image_source_is_an_error_not_zero() {
    let mut pipeline = pipeline(ModelFamily::SingleShot, vec![]);
    let mut source = MemorySource::new(Vec::new());
    let mut sink = MemorySink::new();
    let err = pipeline
        .process_image_source(&mut source, &mut sink)
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyMedia));
    assert!(sink.frames().is_empty());
}

#[test]
fn image_file_round_trip_writes_annotated_copy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("crowd.png");
    let output = dir.path().join("processed/result.png");
    let mut sink = ImageFileSink::create(&input).unwrap();
    sink.write_frame(&Frame::filled(120, 90, GREY)).unwrap();
    sink.finish().unwrap();

    let mut pipeline = pipeline(
        ModelFamily::SingleShot,
        vec![RawOutput::single_shot_table(&[
            [0.0, 15.0, 0.95, 0.1, 0.1, 0.3, 0.6],
            [0.0, 15.0, 0.35, 0.5, 0.1, 0.7, 0.6],
        ])],
    );
    let mut source = ImageFileSource::open(&input).unwrap();
    let mut sink = ImageFileSink::create(&output).unwrap();
    let result = pipeline
        .process_image_source(&mut source, &mut sink)
        .unwrap();
    assert_eq!(result.aggregate_count(), 1);

    let written = image::open(&output).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), (120, 90));
    // top-left corner of the person box at (12, 9)
    assert_eq!(written.get_pixel(12, 9).0, [255, 0, 0]);
}

#[test]
fn sink_rejection_surfaces_as_sink_fault() {
    let mut pipeline = pipeline(ModelFamily::SingleShot, vec![RawOutput::single_shot_table(&[])]);
    let mut source = MemorySource::new(vec![Frame::filled(10, 10, GREY)]);
    let mut sink = MemorySink::new().rejecting_at(0);
    let err = pipeline
        .process_image_source(&mut source, &mut sink)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Sink { frame_index: 0, .. }));
}
