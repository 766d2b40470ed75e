use kernel_alloc::{
    Frame, FrameAllocator, FrameError, FrameRange, FreeOutcome, PhysicalAddress, RamPhysMapper,
};
use kernel_info::memory::{ALLOC_FILL, FRAME_SIZE, FREE_FILL, KERNBASE};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

fn pool(frames: u64) -> FrameAllocator<RamPhysMapper> {
    let range = FrameRange::covering(
        PhysicalAddress::new(KERNBASE),
        PhysicalAddress::new(KERNBASE + frames * FRAME_SIZE),
    );
    FrameAllocator::new(range, RamPhysMapper::new(range))
}

fn contents(frames: &FrameAllocator<RamPhysMapper>, frame: Frame) -> Vec<u8> {
    // SAFETY: single-threaded test, nobody else writes the frame.
    unsafe { frames.mapper().snapshot(frame) }.unwrap().to_vec()
}

#[test]
fn four_frame_pool_end_to_end() {
    let frames = pool(4);
    assert_eq!(frames.free_count(), 4);

    let taken: Vec<_> = (0..4).map(|_| frames.allocate().unwrap()).collect();
    assert_eq!(frames.free_count(), 0);
    assert_eq!(frames.allocate(), None);

    assert_eq!(frames.free(taken[2]), Ok(FreeOutcome::Released));
    assert_eq!(frames.free_count(), 1);
    assert_eq!(frames.free_bytes(), FRAME_SIZE);

    assert_eq!(frames.allocate(), Some(taken[2]));
    assert_eq!(frames.allocate(), None);
}

#[test]
fn seeding_skips_the_kernel_image() {
    // Kernel image ends mid-frame; the pool starts at the next boundary and
    // a trailing partial frame is not managed.
    let end_of_kernel = PhysicalAddress::new(KERNBASE + 0x1234);
    let phystop = PhysicalAddress::new(KERNBASE + 5 * FRAME_SIZE + 0x800);
    let range = FrameRange::covering(end_of_kernel, phystop);
    let frames = FrameAllocator::new(range, RamPhysMapper::new(range));

    assert_eq!(frames.total_frames(), 4);
    assert_eq!(frames.range().start().as_u64(), KERNBASE + FRAME_SIZE);

    let mut seen = HashSet::new();
    while let Some(f) = frames.allocate() {
        assert!(f.base().as_u64() >= KERNBASE + FRAME_SIZE);
        assert!(f.end().as_u64() <= phystop.as_u64());
        assert!(seen.insert(f));
    }
    assert_eq!(seen.len(), 4);
}

#[test]
fn allocation_fills_with_sentinel() {
    let frames = pool(2);
    let f = frames.allocate().unwrap();
    assert!(contents(&frames, f).iter().all(|&b| b == ALLOC_FILL));
}

#[test]
fn release_fills_with_junk() {
    let frames = pool(2);
    let f = frames.allocate().unwrap();
    frames.free(f).unwrap();
    assert!(contents(&frames, f).iter().all(|&b| b == FREE_FILL));
}

#[test]
fn shared_frame_survives_until_last_reference() {
    let frames = pool(3);
    let f = frames.allocate().unwrap();
    assert_eq!(frames.reference_count(f), Ok(1));

    let increments = 3;
    for n in 0..increments {
        assert_eq!(frames.increment_reference(f), Ok(n + 2));
    }
    assert_eq!(frames.reference_count(f), Ok(increments + 1));

    // N = increments + 1 frees; only the last one releases.
    for _ in 0..increments {
        assert!(matches!(frames.free(f), Ok(FreeOutcome::StillShared(_))));
        assert_eq!(frames.free_count(), 2);
        assert!(contents(&frames, f).iter().all(|&b| b == ALLOC_FILL));
    }
    assert_eq!(frames.free(f), Ok(FreeOutcome::Released));
    assert_eq!(frames.free_count(), 3);
    assert_eq!(frames.reference_count(f), Ok(0));
}

#[test]
fn free_outside_pool_is_fatal() {
    let frames = pool(2);
    let below = PhysicalAddress::new(KERNBASE - FRAME_SIZE);
    let above = PhysicalAddress::new(KERNBASE + 2 * FRAME_SIZE);
    assert_eq!(frames.free(below), Err(FrameError::OutOfRange(below)));
    assert_eq!(frames.free(above), Err(FrameError::OutOfRange(above)));
    assert_eq!(frames.free_count(), 2);
}

#[test]
fn free_misaligned_is_fatal() {
    let frames = pool(2);
    let f = frames.allocate().unwrap();
    let inside = f.base() + 8;
    assert_eq!(frames.free(inside), Err(FrameError::Misaligned(inside)));
    assert_eq!(frames.reference_count(f), Ok(1));
}

#[test]
fn double_free_is_fatal() {
    let frames = pool(2);
    let f = frames.allocate().unwrap();
    assert_eq!(frames.free(f), Ok(FreeOutcome::Released));
    assert_eq!(frames.free(f), Err(FrameError::NotAllocated(f)));
    assert_eq!(frames.free_count(), 2);
}

#[test]
fn increment_on_free_frame_is_fatal() {
    let frames = pool(1);
    let f = Frame::from_base(frames.range().start()).unwrap();
    assert_eq!(frames.increment_reference(f), Err(FrameError::NotAllocated(f)));
}

#[test]
fn free_list_membership_tracks_reference_count() {
    // Deterministic mix of allocate / share / free; after every step a frame
    // is on the free list exactly when its count is zero.
    let frames = pool(8);
    let mut live: Vec<Frame> = Vec::new();
    let mut seed = 0x2545_f491_u32;

    for _ in 0..400 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        match seed % 3 {
            0 => {
                if let Some(f) = frames.allocate() {
                    live.push(f);
                }
            }
            1 if !live.is_empty() => {
                let f = live[seed as usize % live.len()];
                frames.increment_reference(f).unwrap();
                live.push(f);
            }
            _ if !live.is_empty() => {
                let f = live.swap_remove(seed as usize % live.len());
                frames.free(f).unwrap();
            }
            _ => {}
        }

        let zero = frames
            .range()
            .frames()
            .filter(|f| frames.reference_count(*f) == Ok(0))
            .count();
        assert_eq!(zero, frames.free_count());
        for f in frames.range().frames() {
            let held = live.iter().filter(|l| **l == f).count() as u32;
            assert_eq!(frames.reference_count(f), Ok(held));
        }
    }
}

#[test]
fn concurrent_allocate_and_free_never_hand_out_a_frame_twice() {
    let threads = 8;
    let rounds = 500;
    let frames = Arc::new(pool(16));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let frames = Arc::clone(&frames);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..rounds {
                    let Some(f) = frames.allocate() else {
                        thread::yield_now();
                        continue;
                    };
                    // Exclusive owner: the count must be exactly one.
                    assert_eq!(frames.reference_count(f), Ok(1));
                    frames.increment_reference(f).unwrap();
                    assert!(matches!(frames.free(f), Ok(FreeOutcome::StillShared(_))));
                    assert_eq!(frames.free(f), Ok(FreeOutcome::Released));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(frames.free_count(), 16);
}
