//! Download manager tests: pagination, chunk loop termination, size and
//! checksum verification, and skipping files already on disk.

use std::cell::RefCell;
use std::rc::Rc;

use badgehub::protocol::{Request, crc32};
use badgehub::{
    BadgeSession, DownloadManager, DownloadOutcome, DownloadProgress, Error, HubConfig,
};
use futures_lite::future::block_on;
use tempfile::tempdir;

use crate::sim_badge::{BadgeState, SimBadge};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

fn connected(state: BadgeState) -> (BadgeSession<SimBadge>, Rc<RefCell<BadgeState>>) {
    let (badge, state) = SimBadge::new(state);
    let mut session = BadgeSession::new("4@sim", badge, &HubConfig::default());
    block_on(session.connect()).unwrap();
    (session, state)
}

// ── Listing ──────────────────────────────────────────────────

#[test]
fn listing_pages_through_all_files() {
    let names: Vec<String> = (0..7).map(|i| format!("AUDIO_{i:04}.bin")).collect();
    let files: Vec<(&str, Vec<u8>)> = names.iter().map(|n| (n.as_str(), vec![1])).collect();
    let (mut session, state) = connected(BadgeState::with_files(&files));

    let listed = block_on(DownloadManager::new(&mut session).list_files()).unwrap();

    assert_eq!(listed.len(), 7);
    assert_eq!(listed[6].filename.as_str(), "AUDIO_0006.bin");
    let starts: Vec<u8> = state
        .borrow()
        .requests
        .iter()
        .filter_map(|r| match r {
            Request::ListFiles { start_index, .. } => Some(*start_index),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0, 3, 6]);
}

#[test]
fn empty_badge_lists_nothing_in_one_request() {
    let (mut session, state) = connected(BadgeState::default());

    let listed = block_on(DownloadManager::new(&mut session).list_files()).unwrap();

    assert!(listed.is_empty());
    assert_eq!(state.borrow().requests.len(), 1);
}

// ── Single file ──────────────────────────────────────────────

#[test]
fn download_stops_at_last_chunk() {
    let data = pattern(200);
    let (mut session, state) = connected(BadgeState::with_files(&[("a.bin", data.clone())]));
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");

    let outcome =
        block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true)).unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            bytes: 200,
            chunks: 4,
            verified: true
        }
    );
    assert_eq!(std::fs::read(&path).unwrap(), data);
    assert_eq!(state.borrow().chunk_requests(), 4);
}

#[test]
fn last_chunk_flag_wins_over_advertised_count() {
    let data = pattern(200);
    let (mut session, state) = connected(BadgeState {
        extra_advertised_chunks: 3,
        ..BadgeState::with_files(&[("a.bin", data)])
    });
    let dir = tempdir().unwrap();

    block_on(DownloadManager::new(&mut session).download_file(
        "a.bin",
        &dir.path().join("a.bin"),
        true,
    ))
    .unwrap();

    assert_eq!(state.borrow().chunk_requests(), 4);
}

#[test]
fn empty_file_needs_no_chunks() {
    let (mut session, state) = connected(BadgeState::with_files(&[("empty.bin", Vec::new())]));
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.bin");

    let outcome =
        block_on(DownloadManager::new(&mut session).download_file("empty.bin", &path, true))
            .unwrap();

    assert!(matches!(outcome, DownloadOutcome::Downloaded { bytes: 0, chunks: 0, .. }));
    assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    assert_eq!(state.borrow().chunk_requests(), 0);
}

#[test]
fn progress_is_reported_per_chunk() {
    let (mut session, _state) = connected(BadgeState::with_files(&[("a.bin", pattern(200))]));
    let dir = tempdir().unwrap();
    let mut seen = Vec::new();

    block_on(DownloadManager::new(&mut session).download_file_with_progress(
        "a.bin",
        &dir.path().join("a.bin"),
        false,
        |p| seen.push(p.clone()),
    ))
    .unwrap();

    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].received_bytes, 64);
    assert_eq!(
        seen[3],
        DownloadProgress {
            chunk_index: 3,
            total_chunks: 4,
            received_bytes: 200,
            expected_size: 200,
        }
    );
}

#[test]
fn checksum_mismatch_keeps_file() {
    let data = pattern(100);
    let (mut session, _state) = connected(BadgeState {
        corrupt_checksum: true,
        ..BadgeState::with_files(&[("a.bin", data.clone())])
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");

    let err = block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true))
        .unwrap_err();

    let local = crc32(&data);
    assert_eq!(
        err,
        Error::ChecksumMismatch {
            expected: local ^ 1,
            actual: local
        }
    );
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn unverified_download_skips_checksum_request() {
    let (mut session, state) = connected(BadgeState {
        corrupt_checksum: true,
        ..BadgeState::with_files(&[("a.bin", pattern(10))])
    });
    let dir = tempdir().unwrap();

    let outcome = block_on(DownloadManager::new(&mut session).download_file(
        "a.bin",
        &dir.path().join("a.bin"),
        false,
    ))
    .unwrap();

    assert!(matches!(outcome, DownloadOutcome::Downloaded { verified: false, .. }));
    assert_eq!(
        state
            .borrow()
            .count(|r| matches!(r, Request::GetFileChecksum { .. })),
        0
    );
}

#[test]
fn matching_local_copy_is_not_downloaded_again() {
    let (mut session, state) = connected(BadgeState::with_files(&[("a.bin", pattern(150))]));
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");
    block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true)).unwrap();
    state.borrow_mut().requests.clear();

    let outcome =
        block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true)).unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::AlreadyPresent {
            checksum: crc32(&pattern(150))
        }
    );
    let s = state.borrow();
    assert_eq!(s.chunk_requests(), 0);
    assert_eq!(s.count(|r| matches!(r, Request::StartDownload { .. })), 0);
    assert_eq!(s.count(|r| matches!(r, Request::GetFileChecksum { .. })), 1);
}

#[test]
fn stale_local_copy_is_replaced() {
    let data = pattern(90);
    let (mut session, state) = connected(BadgeState::with_files(&[("a.bin", data.clone())]));
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");
    std::fs::write(&path, b"old contents").unwrap();

    let outcome =
        block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true)).unwrap();

    assert!(matches!(outcome, DownloadOutcome::Downloaded { bytes: 90, .. }));
    assert_eq!(std::fs::read(&path).unwrap(), data);
    assert_eq!(state.borrow().chunk_requests(), 2);
}

#[test]
fn rejected_download_is_reported() {
    let (mut session, _state) = connected(BadgeState {
        rejected_files: vec!["a.bin".into()],
        ..BadgeState::with_files(&[("a.bin", pattern(10))])
    });
    let dir = tempdir().unwrap();

    let err = block_on(DownloadManager::new(&mut session).download_file(
        "a.bin",
        &dir.path().join("a.bin"),
        true,
    ))
    .unwrap_err();

    assert_eq!(
        err,
        Error::DownloadRejected {
            filename: "a.bin".into()
        }
    );
}

#[test]
fn empty_chunk_aborts_download() {
    let (mut session, _state) = connected(BadgeState {
        empty_chunk_at: Some(1),
        ..BadgeState::with_files(&[("a.bin", pattern(200))])
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");

    let err = block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true))
        .unwrap_err();

    assert_eq!(err, Error::EmptyChunk { index: 1 });
    assert!(!path.exists());
}

#[test]
fn short_transfer_is_a_size_mismatch() {
    let (mut session, _state) = connected(BadgeState {
        size_skew: 5,
        ..BadgeState::with_files(&[("a.bin", pattern(200))])
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");

    let err = block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true))
        .unwrap_err();

    assert_eq!(
        err,
        Error::SizeMismatch {
            expected: 205,
            actual: 200
        }
    );
    assert!(!path.exists());
}

#[test]
fn size_beyond_chunk_capacity_is_rejected_before_transfer() {
    // 200 real bytes advertised as u32::MAX bytes in 4 chunks.
    let (mut session, state) = connected(BadgeState {
        size_skew: u32::MAX - 200,
        ..BadgeState::with_files(&[("a.bin", pattern(200))])
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.bin");

    let err = block_on(DownloadManager::new(&mut session).download_file("a.bin", &path, true))
        .unwrap_err();

    assert_eq!(
        err,
        Error::SizeMismatch {
            expected: u32::MAX,
            actual: 0
        }
    );
    assert_eq!(state.borrow().chunk_requests(), 0);
    assert!(!path.exists());
    assert!(session.is_connected());
}

// ── Whole badge ──────────────────────────────────────────────

#[test]
fn download_all_isolates_failing_file() {
    let (mut session, _state) = connected(BadgeState {
        rejected_files: vec!["b.bin".into()],
        ..BadgeState::with_files(&[
            ("a.bin", pattern(70)),
            ("b.bin", pattern(10)),
            ("c.bin", pattern(300)),
        ])
    });
    let dir = tempdir().unwrap();
    let out = dir.path().join("badge");

    let summary = block_on(DownloadManager::new(&mut session).download_all_files(&out)).unwrap();

    assert_eq!(
        (summary.success, summary.failed, summary.total),
        (2, 1, 3)
    );
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, "b.bin");
    assert_eq!(std::fs::read(out.join("c.bin")).unwrap(), pattern(300));
    assert!(!out.join("b.bin").exists());
}

#[test]
fn download_all_refuses_path_traversal_names() {
    let (mut session, state) = connected(BadgeState::with_files(&[
        ("../escape.bin", pattern(10)),
        ("ok.bin", pattern(10)),
    ]));
    let dir = tempdir().unwrap();
    let out = dir.path().join("badge");

    let summary = block_on(DownloadManager::new(&mut session).download_all_files(&out)).unwrap();

    assert_eq!((summary.success, summary.failed), (1, 1));
    assert!(matches!(summary.failures[0].1, Error::Io(_)));
    assert!(!dir.path().join("escape.bin").exists());
    assert_eq!(
        state
            .borrow()
            .count(|r| matches!(r, Request::StartDownload { .. })),
        1
    );
}
