//! Dual capture buffer for handing audio frames to the render loop
//!
//! Two fixed-size halves of interleaved stereo scalars. The audio callback
//! appends to whichever half is active-for-write; once per display frame the
//! render loop swaps the halves and reads the one that was just filled.
//!
//! ## Handoff protocol
//!
//! There is exactly one writer and one reader. The active half and the write
//! cursor are packed into a single atomic word, so the swap (record the cursor,
//! flip the active half, reset the cursor) is one atomic operation and is the
//! only synchronization point. No locks are taken on either side.
//!
//! The writer stores a frame's scalars at the cursor and then publishes the
//! advanced cursor with a compare-exchange. If a swap slipped in between, the
//! exchange fails and the frame is written again into the new active half.
//! The stale store sits at the old cursor position, which is exactly one past
//! the region the reader was told is valid, so the reader never sees it.
//!
//! Scalars are stored as `AtomicU32` bit patterns. The memory layout is fixed
//! at construction and never reallocated, so restarting the producer against
//! the same buffer is always memory safe.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::{FromSample, Sample};

/// Default capacity of each half, in scalars (4096 stereo frames)
pub const DEFAULT_CAPACITY: usize = 8192;

/// One time-sample of stereo audio
/// Left channel = X, Right channel = Y
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

/// Packed `(cursor, active)` state: the low bit selects the active half,
/// the remaining bits hold the cursor in scalars.
#[inline]
fn pack(active: usize, cursor: usize) -> usize {
    (cursor << 1) | active
}

#[inline]
fn unpack(state: usize) -> (usize, usize) {
    (state & 1, state >> 1)
}

struct Shared {
    halves: [Box<[AtomicU32]>; 2],
    capacity: usize,
    state: AtomicUsize,
    writer_claimed: AtomicBool,
    reader_claimed: AtomicBool,
}

/// Double buffer shared between the audio callback and the render loop
///
/// Cloning the buffer clones the handle, not the storage. Roles are claimed
/// with [`writer`](Self::writer) and [`reader`](Self::reader); each role can
/// be held by one handle at a time and is released when that handle drops.
#[derive(Clone)]
pub struct DualCaptureBuffer {
    shared: Arc<Shared>,
}

impl DualCaptureBuffer {
    /// Create a buffer whose halves each hold `capacity` scalars.
    ///
    /// # Panics
    /// If `capacity` is not a power of two or is smaller than one stereo frame.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capture buffer capacity must be a power of two >= 2, got {capacity}"
        );

        let half = || (0..capacity).map(|_| AtomicU32::new(0)).collect::<Box<[_]>>();

        Self {
            shared: Arc::new(Shared {
                halves: [half(), half()],
                capacity,
                state: AtomicUsize::new(pack(0, 0)),
                writer_claimed: AtomicBool::new(false),
                reader_claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Capacity of each half in stereo frames
    pub fn frame_capacity(&self) -> usize {
        self.shared.capacity / 2
    }

    /// Claim the producer role. `None` while another writer is alive.
    pub fn writer(&self) -> Option<CaptureWriter> {
        if self.shared.writer_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(CaptureWriter {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Claim the consumer role. `None` while another reader is alive.
    pub fn reader(&self) -> Option<CaptureReader> {
        if self.shared.reader_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(CaptureReader {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Producer half of the buffer (owned by the audio callback)
pub struct CaptureWriter {
    shared: Arc<Shared>,
}

impl CaptureWriter {
    /// Append one frame to the active half.
    ///
    /// Lock-free and allocation-free. When the cursor reaches capacity it
    /// wraps to the start and older frames are overwritten.
    #[inline]
    pub fn write(&mut self, frame: StereoFrame) {
        let mut state = self.shared.state.load(Ordering::Acquire);

        loop {
            let next = self.store(state, frame);
            match self.publish(state, next) {
                Ok(()) => return,
                // Swapped underneath us: write again into the new active half
                Err(current) => state = current,
            }
        }
    }

    /// Store `frame` at the cursor encoded in `state` and return the state
    /// that would publish it. Nothing is visible to the reader yet.
    #[inline]
    fn store(&self, state: usize, frame: StereoFrame) -> usize {
        let (active, cursor) = unpack(state);
        let half = &self.shared.halves[active];
        half[cursor].store(frame.left.to_bits(), Ordering::Relaxed);
        half[cursor + 1].store(frame.right.to_bits(), Ordering::Relaxed);
        pack(active, (cursor + 2) & (self.shared.capacity - 1))
    }

    /// Advance the cursor from `state` to `next`. Fails with the current
    /// state if a swap happened since `state` was read.
    #[inline]
    fn publish(&self, state: usize, next: usize) -> Result<(), usize> {
        self.shared
            .state
            .compare_exchange(state, next, Ordering::Release, Ordering::Acquire)
            .map(|_| ())
    }

    /// Append a block of interleaved driver samples, converted to `f32`.
    ///
    /// Mono input is duplicated to both channels; channels past the second
    /// are ignored.
    pub fn write_interleaved<T>(&mut self, data: &[T], channels: usize)
    where
        T: Copy,
        f32: FromSample<T>,
    {
        if channels == 0 {
            return;
        }
        for frame in data.chunks_exact(channels) {
            let left = f32::from_sample(frame[0]);
            let right = if channels > 1 {
                f32::from_sample(frame[1])
            } else {
                left
            };
            self.write(StereoFrame::new(left, right));
        }
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        self.shared.writer_claimed.store(false, Ordering::Release);
    }
}

/// Consumer half of the buffer (owned by the render loop)
pub struct CaptureReader {
    shared: Arc<Shared>,
}

impl CaptureReader {
    /// Swap halves and hand back the one that was just filled.
    ///
    /// Call once per render frame. The returned snapshot borrows the reader,
    /// so it must be dropped before the next swap.
    pub fn swap_and_take(&mut self) -> CaptureSnapshot<'_> {
        let shared = &*self.shared;
        let mut state = shared.state.load(Ordering::Acquire);

        // Record the cursor, flip the active half and reset the cursor in one step
        let (filled, cursor) = loop {
            let (active, cursor) = unpack(state);
            match shared.state.compare_exchange_weak(
                state,
                pack(active ^ 1, 0),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break (active, cursor),
                Err(current) => state = current,
            }
        };

        CaptureSnapshot {
            half: &shared.halves[filled],
            frames: cursor / 2,
        }
    }
}

impl Drop for CaptureReader {
    fn drop(&mut self) {
        self.shared.reader_claimed.store(false, Ordering::Release);
    }
}

/// Read-only view of the half returned by the latest swap
pub struct CaptureSnapshot<'a> {
    half: &'a [AtomicU32],
    frames: usize,
}

impl<'a> CaptureSnapshot<'a> {
    /// Number of valid frames, derived from the cursor at swap time
    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Frame at `index`, `None` past the valid region
    pub fn get(&self, index: usize) -> Option<StereoFrame> {
        (index < self.frames).then(|| read_frame(self.half, index))
    }

    /// Valid frames in write order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = StereoFrame> + 'a {
        let half = self.half;
        (0..self.frames).map(move |i| read_frame(half, i))
    }
}

#[inline]
fn read_frame(half: &[AtomicU32], index: usize) -> StereoFrame {
    StereoFrame::new(
        f32::from_bits(half[2 * index].load(Ordering::Relaxed)),
        f32::from_bits(half[2 * index + 1].load(Ordering::Relaxed)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_count_matches_scalars_written() {
        let buffer = DualCaptureBuffer::new(64);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        for i in 0..10 {
            writer.write(StereoFrame::new(i as f32, -(i as f32)));
        }

        let snapshot = reader.swap_and_take();
        assert_eq!(snapshot.len(), 10);
        let frames: Vec<_> = snapshot.iter().collect();
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[3], StereoFrame::new(3.0, -3.0));
        assert_eq!(snapshot.get(9), Some(StereoFrame::new(9.0, -9.0)));
        assert_eq!(snapshot.get(10), None);
    }

    #[test]
    fn test_swap_resets_cursor() {
        let buffer = DualCaptureBuffer::new(16);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        writer.write(StereoFrame::new(0.5, 0.5));
        assert_eq!(reader.swap_and_take().len(), 1);
        assert_eq!(unpack(buffer.shared.state.load(Ordering::Acquire)).1, 0);

        // Nothing written since: stale contents of the other half count as empty
        assert!(reader.swap_and_take().is_empty());
        assert!(reader.swap_and_take().is_empty());
    }

    #[test]
    fn test_writes_after_swap_skip_snapshot() {
        let buffer = DualCaptureBuffer::new(16);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        for i in 0..4 {
            writer.write(StereoFrame::new(i as f32, i as f32));
        }

        let snapshot = reader.swap_and_take();
        for _ in 0..8 {
            writer.write(StereoFrame::new(-9.0, -9.0));
        }

        let frames: Vec<_> = snapshot.iter().collect();
        assert_eq!(
            frames,
            (0..4)
                .map(|i| StereoFrame::new(i as f32, i as f32))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_write_racing_swap_retries_outside_valid_region() {
        let buffer = DualCaptureBuffer::new(16);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        writer.write(StereoFrame::new(1.0, 1.0));
        writer.write(StereoFrame::new(2.0, 2.0));

        // Store lands, then the swap slips in before the cursor is published
        let late = StereoFrame::new(9.0, 9.0);
        let state = buffer.shared.state.load(Ordering::Acquire);
        let next = writer.store(state, late);

        let snapshot = reader.swap_and_take();
        assert_eq!(snapshot.len(), 2);

        let current = writer.publish(state, next).unwrap_err();
        assert_eq!(unpack(current), (unpack(state).0 ^ 1, 0));
        let retried = writer.store(current, late);
        assert!(writer.publish(current, retried).is_ok());

        // The stale store sits one past the valid region and is never read
        assert_eq!(read_frame(snapshot.half, 2), late);
        assert_eq!(snapshot.get(2), None);
        let frames: Vec<_> = snapshot.iter().collect();
        assert_eq!(
            frames,
            vec![StereoFrame::new(1.0, 1.0), StereoFrame::new(2.0, 2.0)]
        );

        let next_frames: Vec<_> = reader.swap_and_take().iter().collect();
        assert_eq!(next_frames, vec![late]);
    }

    #[test]
    fn test_wraparound_overwrites_oldest() {
        // 4 frames per half
        let buffer = DualCaptureBuffer::new(8);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        for i in 0..6 {
            writer.write(StereoFrame::new(i as f32, 0.0));
        }

        // Cursor wrapped once: only the frames past the wrap are counted
        let snapshot = reader.swap_and_take();
        assert_eq!(snapshot.len(), 2);
        let lefts: Vec<f32> = snapshot.iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![4.0, 5.0]);
    }

    #[test]
    fn test_exact_wrap_reports_empty() {
        let buffer = DualCaptureBuffer::new(8);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        for _ in 0..4 {
            writer.write(StereoFrame::new(1.0, 1.0));
        }
        assert!(reader.swap_and_take().is_empty());
    }

    #[test]
    fn test_interleaved_mono_and_multichannel() {
        let buffer = DualCaptureBuffer::new(32);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        writer.write_interleaved(&[0.25_f32, -0.25], 1);
        writer.write_interleaved(&[0.1_f32, 0.2, 0.3, 0.4, 0.5, 0.6], 3);
        writer.write_interleaved(&[1.0_f32, 1.0], 0);

        let frames: Vec<_> = reader.swap_and_take().iter().collect();
        assert_eq!(
            frames,
            vec![
                StereoFrame::new(0.25, 0.25),
                StereoFrame::new(-0.25, -0.25),
                StereoFrame::new(0.1, 0.2),
                StereoFrame::new(0.4, 0.5),
            ]
        );
    }

    #[test]
    fn test_interleaved_integer_samples() {
        let buffer = DualCaptureBuffer::new(16);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        writer.write_interleaved(&[i16::MIN, 0_i16], 2);

        let frame = reader.swap_and_take().get(0).unwrap();
        assert_eq!(frame.left, -1.0);
        assert_eq!(frame.right, 0.0);
    }

    #[test]
    fn test_roles_claimed_once() {
        let buffer = DualCaptureBuffer::new(16);

        let writer = buffer.writer();
        assert!(writer.is_some());
        assert!(buffer.writer().is_none());
        drop(writer);
        assert!(buffer.writer().is_some());

        let _reader = buffer.reader().unwrap();
        assert!(buffer.clone().reader().is_none());
    }

    #[test]
    #[should_panic]
    fn test_rejects_non_power_of_two() {
        let _ = DualCaptureBuffer::new(6);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const FRAMES: usize = 20_000;

        // Large enough that the producer can never wrap between two swaps
        let buffer = DualCaptureBuffer::new(1 << 16);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        let producer = thread::spawn(move || {
            for i in 0..FRAMES {
                writer.write(StereoFrame::new(i as f32, -(i as f32)));
            }
        });

        let mut seen = Vec::with_capacity(FRAMES);
        loop {
            let done = producer.is_finished();
            let snapshot = reader.swap_and_take();
            seen.extend(snapshot.iter().map(|f| {
                assert_eq!(f.left, -f.right);
                f.left as usize
            }));
            if done {
                break;
            }
        }
        producer.join().unwrap();
        seen.extend(reader.swap_and_take().iter().map(|f| f.left as usize));

        assert_eq!(seen.len(), FRAMES);
        assert!(seen.iter().enumerate().all(|(i, &v)| i == v));
    }
}
