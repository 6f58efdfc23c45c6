//! Batch coordination and concurrency bound tests.

mod common;

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use better_images::{JobError, JobStatus, OutputFormat, PipelineOptions, UpscaleFactor};
use common::{png_bytes, TestHarness};

fn files(names: &[&str]) -> Vec<(String, Vec<u8>)> {
    names
        .iter()
        .map(|name| (name.to_string(), png_bytes(8, 8)))
        .collect()
}

#[test]
fn test_create_batch_skips_invalid_files() {
    let harness = TestHarness::new();
    let mut upload = files(&["a.png", "b.png"]);
    upload.push(("notes.txt".to_string(), b"hello".to_vec()));

    let batch = harness.service.batches().create_batch(upload).unwrap();
    assert_eq!(batch.jobs.len(), 2);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].filename, "notes.txt");

    let status = harness.service.batches().batch_status(&batch.batch_id).unwrap();
    assert_eq!(status.total, 2);
    assert!(status.jobs.iter().all(|j| j.status == JobStatus::Uploaded));
    assert_eq!(status.jobs[0].filename, "a.png");
}

#[test]
fn test_create_batch_without_valid_files_fails() {
    let harness = TestHarness::new();
    let upload = vec![("x.gif".to_string(), b"GIF89a".to_vec())];
    assert!(matches!(
        harness.service.batches().create_batch(upload),
        Err(JobError::Validation(_))
    ));
    assert!(matches!(
        harness.service.batches().create_batch(Vec::new()),
        Err(JobError::Validation(_))
    ));
}

#[test]
fn test_batch_all_done_only_after_every_member() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let batch = batches
        .create_batch(files(&["a.png", "b.png", "c.png"]))
        .unwrap();
    let ids: Vec<String> = batch.jobs.iter().map(|j| j.id.clone()).collect();

    harness.provider.hold();
    let trigger = batches
        .trigger_batch(
            &ids,
            &PipelineOptions {
                upscale: Some(UpscaleFactor::X2),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(trigger.started, ids);
    assert!(trigger.skipped.is_empty());

    let status = batches.batch_status(&batch.batch_id).unwrap();
    assert!(!status.all_done);
    assert!(status.any_processing);

    harness.provider.release();
    for id in &ids {
        harness.wait_for_terminal(id);
    }

    let status = batches.batch_status(&batch.batch_id).unwrap();
    assert!(status.all_done);
    assert!(!status.any_error);
    assert!(!status.any_processing);
    assert!(status.jobs.iter().all(|j| j.has_results));
}

#[test]
fn test_failing_member_does_not_affect_siblings() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let batch = batches
        .create_batch(files(&["a.png", "b.png", "c.png"]))
        .unwrap();
    let ids: Vec<String> = batch.jobs.iter().map(|j| j.id.clone()).collect();
    harness.provider.fail_job(&ids[1], "remove_background");

    batches
        .trigger_batch(
            &ids,
            &PipelineOptions {
                remove_bg: true,
                ..Default::default()
            },
        )
        .unwrap();
    for id in &ids {
        harness.wait_for_terminal(id);
    }

    let status = batches.batch_status(&batch.batch_id).unwrap();
    assert!(status.any_error);
    assert!(!status.all_done);
    assert_eq!(status.jobs[0].status, JobStatus::Done);
    assert_eq!(status.jobs[1].status, JobStatus::Error);
    assert!(!status.jobs[1].error.as_deref().unwrap_or("").is_empty());
    assert_eq!(status.jobs[2].status, JobStatus::Done);
}

#[test]
fn test_trigger_skips_unknown_and_non_uploaded() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let batch = batches.create_batch(files(&["a.png", "b.png"])).unwrap();
    let a = batch.jobs[0].id.clone();
    let b = batch.jobs[1].id.clone();

    harness
        .service
        .process(&a, &PipelineOptions::default())
        .unwrap();
    harness.wait_for_terminal(&a);

    let trigger = batches
        .trigger_batch(
            &[a.clone(), b.clone(), "ghost".to_string()],
            &PipelineOptions::default(),
        )
        .unwrap();
    assert_eq!(trigger.started, vec![b.clone()]);
    assert_eq!(trigger.skipped, vec![a, "ghost".to_string()]);
    harness.wait_for_terminal(&b);

    assert!(matches!(
        batches.trigger_batch(&[], &PipelineOptions::default()),
        Err(JobError::Validation(_))
    ));
}

#[test]
fn test_unknown_batch_is_not_found() {
    let harness = TestHarness::new();
    assert!(matches!(
        harness.service.batches().batch_status("missing"),
        Err(JobError::NotFound { what: "Batch", .. })
    ));
    assert!(matches!(
        harness.service.batches().bundle("missing"),
        Err(JobError::NotFound { .. })
    ));
}

#[test]
fn test_bundle_requires_every_member_done() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let batch = batches.create_batch(files(&["a.png", "b.png"])).unwrap();

    assert!(matches!(
        batches.bundle(&batch.batch_id),
        Err(JobError::Validation(_))
    ));
}

#[test]
fn test_bundle_deduplicates_names() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let batch = batches
        .create_batch(files(&["cat.png", "cat.png", "dog.png"]))
        .unwrap();
    let ids: Vec<String> = batch.jobs.iter().map(|j| j.id.clone()).collect();

    batches
        .trigger_batch(
            &ids,
            &PipelineOptions {
                format: OutputFormat::Svg,
                ..Default::default()
            },
        )
        .unwrap();
    for id in &ids {
        harness.wait_for_terminal(id);
    }

    let archive_path = batches.bundle(&batch.batch_id).unwrap();
    assert!(archive_path.starts_with(harness.output_dir()));

    let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "cat_processed.svg".to_string(),
            "cat_processed_2.svg".to_string(),
            "dog_processed.svg".to_string(),
        ]
    );

    let mut svg = String::new();
    archive
        .by_name("dog_processed.svg")
        .unwrap()
        .read_to_string(&mut svg)
        .unwrap();
    assert!(svg.starts_with("<svg"));
}

#[test]
fn test_never_more_than_worker_count_at_once() {
    let harness = TestHarness::with_workers(2);
    harness.provider.set_delay(Duration::from_millis(30));

    let batch = harness
        .service
        .batches()
        .create_batch(files(&["1.png", "2.png", "3.png", "4.png", "5.png", "6.png"]))
        .unwrap();
    let ids: Vec<String> = batch.jobs.iter().map(|j| j.id.clone()).collect();

    harness
        .service
        .batches()
        .trigger_batch(
            &ids,
            &PipelineOptions {
                upscale: Some(UpscaleFactor::X2),
                ..Default::default()
            },
        )
        .unwrap();

    harness.wait_until("batch to finish", || {
        let health = harness.service.health();
        assert!(health.active <= 2, "active {} exceeds pool size", health.active);
        ids.iter().all(|id| {
            harness
                .service
                .status(id)
                .map(|s| s.status.is_terminal())
                .unwrap_or(false)
        })
    });

    assert!(harness.provider.peak() <= 2);
    assert_eq!(harness.provider.calls(), 6);
    for id in &ids {
        assert_eq!(harness.service.status(id).unwrap().status, JobStatus::Done);
    }
}

#[test]
fn test_overlapping_bundles_are_complete_archives() {
    let harness = TestHarness::new();
    let batches = harness.service.batches();
    let upload = ["a.png", "b.png", "c.png", "d.png"]
        .iter()
        .map(|name| (name.to_string(), png_bytes(400, 400)))
        .collect();
    let batch = batches.create_batch(upload).unwrap();
    let ids: Vec<String> = batch.jobs.iter().map(|j| j.id.clone()).collect();

    batches
        .trigger_batch(&ids, &PipelineOptions::default())
        .unwrap();
    for id in &ids {
        harness.wait_for_terminal(id);
    }

    let corrupt: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                scope.spawn(|| {
                    let mut corrupt = 0;
                    for _ in 0..8 {
                        let path = batches.bundle(&batch.batch_id).unwrap();
                        let bytes = std::fs::read(&path).unwrap();
                        let complete = zip::ZipArchive::new(std::io::Cursor::new(bytes))
                            .map(|mut archive| {
                                archive.len() == 4
                                    && (0..archive.len()).all(|i| {
                                        let mut sink = Vec::new();
                                        archive
                                            .by_index(i)
                                            .map(|mut f| f.read_to_end(&mut sink).is_ok())
                                            .unwrap_or(false)
                                    })
                            })
                            .unwrap_or(false);
                        if !complete {
                            corrupt += 1;
                        }
                    }
                    corrupt
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });
    assert_eq!(corrupt, 0);
}
