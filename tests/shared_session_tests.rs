//! Concurrency tests for shared sessions.
//!
//! Many threads claim engines and fold slots from one session at once; the
//! resource lock must keep every claim exclusive.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use tiledma::prelude::*;

const THREADS: usize = 8;
const FRAMES_PER_THREAD: usize = 8;

#[test]
fn test_concurrent_attach_never_double_allocates() {
    let frames = THREADS * FRAMES_PER_THREAD;
    let config = SessionConfig::new(frames).with_engines(frames, frames * 2);
    let shared = SharedSession::create(config).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let shared = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut claimed = Vec::new();
                for i in 0..FRAMES_PER_THREAD {
                    let addr = 0x10_0000 * (t + 1) + 0x1000 * i;
                    let desc = FrameDescriptor::new(addr, PixelFormat::Nv12, Direction::Read, 64, 64);
                    shared.attach(&desc).unwrap();
                    let engine = shared.lock().unwrap().engine_of(addr).unwrap();
                    claimed.push(engine);
                }
                claimed
            })
        })
        .collect();

    let mut engines = HashSet::new();
    for handle in handles {
        for engine in handle.join().unwrap() {
            assert!(engines.insert(engine), "{engine} claimed twice");
        }
    }
    assert_eq!(engines.len(), frames);

    let stats = shared.lock().unwrap().stats().unwrap();
    assert_eq!(stats.live_frames, frames);
    assert_eq!(stats.read_engines_in_use, frames);
}

#[test]
fn test_concurrent_fold_claims_are_exclusive() {
    let shared = SharedSession::create(SessionConfig::new(THREADS).with_engines(THREADS, THREADS * 2))
        .unwrap();

    // Pre-register every staging buffer so threads race on find + link.
    {
        let mut session = shared.lock().unwrap();
        for i in 0..THREADS {
            session
                .set_fold_storage(0x100_0000 + i * 0x1_0000, RegionHandles::default())
                .unwrap();
        }
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let shared = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let addr = 0x1000 * (t + 1);
                let desc = FrameDescriptor::new(addr, PixelFormat::Nv12, Direction::Write, 64, 64);
                shared.attach(&desc).unwrap();
                barrier.wait();

                // Find and link must happen under one guard.
                let mut session = shared.lock().unwrap();
                let fold = session.find_free_fold().unwrap().unwrap();
                session.link_storage(addr, fold).unwrap();
                let params = session
                    .update_tile(fold, Roi::new(0, 0, 64, 2), t * 64)
                    .unwrap();
                assert_eq!(params.offset, t * 64);
                fold
            })
        })
        .collect();

    let folds: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(folds.len(), THREADS);

    let session = shared.lock().unwrap();
    assert_eq!(session.find_free_fold().unwrap(), None);
    assert_eq!(session.stats().unwrap().folds_in_use, THREADS);
}

#[test]
fn test_poisoned_lock_is_reported() {
    let shared = SharedSession::create(SessionConfig::default()).unwrap();

    let poisoner = shared.clone();
    let _ = thread::spawn(move || {
        let _guard = poisoner.lock().unwrap();
        panic!("holder panicked");
    })
    .join();

    assert_eq!(shared.lock().err(), Some(Error::LockPoisoned));
    assert_eq!(shared.try_lock().err(), Some(Error::LockPoisoned));
}
