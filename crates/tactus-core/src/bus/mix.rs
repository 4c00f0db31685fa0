//! Per-bus sample buffers and the accumulation primitives behind
//! `addToBus`/`mixToBus`.
//!
//! Instrument output arrives interleaved; the mixer picks one channel by
//! striding (`src[0], src[chans], src[2*chans], ...`) and sums it into the
//! de-interleaved destination bus buffer. In the threaded regime, workers
//! never touch the buffers directly: each appends [`MixData`] records to
//! its own queue in [`MixQueues`], and the main thread applies every queue
//! after the parallel phase — per-thread order is deterministic,
//! cross-thread contributions to one bus commute.

use parking_lot::Mutex;

use super::BusError;

/// Which buffer family a mixing call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    /// A device output bus.
    Out,
    /// An aux bus written by an instrument.
    AuxOut,
}

/// One deferred accumulation, recorded by a worker thread.
#[derive(Debug, Clone)]
pub struct MixData {
    /// Destination buffer family.
    pub bus_type: BusType,
    /// Destination bus index.
    pub bus: u16,
    /// First destination frame.
    pub offset: usize,
    /// De-strided samples, one per frame.
    pub samples: Vec<f32>,
}

impl MixData {
    /// Captures one channel of an interleaved source for frames
    /// `offset..end_frame`, copying so the record can cross threads.
    pub fn from_interleaved(
        bus_type: BusType,
        bus: u16,
        src: &[f32],
        offset: usize,
        end_frame: usize,
        chans: usize,
    ) -> Self {
        let frames = end_frame.saturating_sub(offset);
        let samples = (0..frames)
            .map_while(|i| src.get(i * chans).copied())
            .collect();
        Self {
            bus_type,
            bus,
            offset,
            samples,
        }
    }
}

/// The per-bus sample storage.
///
/// Output buffers exist for every bus flagged `OutInUse`; aux buffers for
/// every bus in aux use. Buffers are sized to the block length and zeroed
/// after each drain.
#[derive(Debug)]
pub struct BusBuffers {
    block_frames: usize,
    out: Vec<Option<Vec<f32>>>,
    aux: Vec<Option<Vec<f32>>>,
}

impl BusBuffers {
    /// Creates unallocated buffer slots for `bus_count` buses.
    pub fn new(bus_count: usize, block_frames: usize) -> Self {
        Self {
            block_frames,
            out: vec![None; bus_count],
            aux: vec![None; bus_count],
        }
    }

    /// The block length in frames.
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Changes the block length, resizing every allocated buffer.
    pub fn set_block_frames(&mut self, frames: usize) {
        self.block_frames = frames;
        for buf in self.out.iter_mut().chain(self.aux.iter_mut()).flatten() {
            buf.resize(frames, 0.0);
            buf.fill(0.0);
        }
    }

    /// Ensures an output buffer exists for `bus`.
    pub fn allocate_out_buffer(&mut self, bus: u16) {
        let slot = &mut self.out[usize::from(bus)];
        if slot.is_none() {
            *slot = Some(vec![0.0; self.block_frames]);
        }
    }

    /// Ensures an aux buffer of at least `frames` exists for `bus`.
    pub fn allocate_aux_buffer(&mut self, bus: u16, frames: usize) {
        let frames = frames.max(self.block_frames);
        match &mut self.aux[usize::from(bus)] {
            Some(buf) if buf.len() < frames => buf.resize(frames, 0.0),
            Some(_) => {}
            slot @ None => *slot = Some(vec![0.0; frames]),
        }
    }

    /// Read access to an aux buffer.
    pub fn aux(&self, bus: u16) -> Option<&[f32]> {
        self.aux[usize::from(bus)].as_deref()
    }

    /// Read access to an output buffer.
    pub fn out(&self, bus: u16) -> Option<&[f32]> {
        self.out[usize::from(bus)].as_deref()
    }

    fn target(&mut self, bus_type: BusType, bus: u16) -> Result<&mut Vec<f32>, BusError> {
        let slot = match bus_type {
            BusType::Out => &mut self.out[usize::from(bus)],
            BusType::AuxOut => &mut self.aux[usize::from(bus)],
        };
        slot.as_mut().ok_or(BusError::Unallocated(bus))
    }

    /// Sums one channel of an interleaved source into a bus buffer.
    ///
    /// Reads `src[0], src[chans], ...` and accumulates into destination
    /// frames `offset..end_frame`.
    pub fn add_to_bus(
        &mut self,
        bus_type: BusType,
        bus: u16,
        src: &[f32],
        offset: usize,
        end_frame: usize,
        chans: usize,
    ) -> Result<(), BusError> {
        self.mix_to_bus(bus_type, bus, src, offset, end_frame, chans, 1.0)
    }

    /// [`add_to_bus`](Self::add_to_bus) with a gain applied to every sample.
    pub fn mix_to_bus(
        &mut self,
        bus_type: BusType,
        bus: u16,
        src: &[f32],
        offset: usize,
        end_frame: usize,
        chans: usize,
        gain: f32,
    ) -> Result<(), BusError> {
        let dst = self.target(bus_type, bus)?;
        let end = end_frame.min(dst.len());
        for (i, frame) in (offset..end).enumerate() {
            let Some(&sample) = src.get(i * chans) else {
                break;
            };
            dst[frame] += sample * gain;
        }
        Ok(())
    }

    /// Applies one queued record.
    pub fn apply(&mut self, data: &MixData) -> Result<(), BusError> {
        let dst = self.target(data.bus_type, data.bus)?;
        for (i, &sample) in data.samples.iter().enumerate() {
            let Some(frame) = dst.get_mut(data.offset + i) else {
                break;
            };
            *frame += sample;
        }
        Ok(())
    }

    /// Adds aux buffer `from` into aux buffer `to`. Used by the aux-to-aux
    /// walk; the play order guarantees `from != to`.
    pub fn add_aux_to_aux(&mut self, from: u16, to: u16) -> Result<(), BusError> {
        let (from, to) = (usize::from(from), usize::from(to));
        if from == to {
            return Ok(());
        }
        // Split so source and destination borrow disjoint slice halves.
        let (src, dst) = if from < to {
            let (lo, hi) = self.aux.split_at_mut(to);
            (lo[from].as_deref(), hi[0].as_mut())
        } else {
            let (lo, hi) = self.aux.split_at_mut(from);
            (hi[0].as_deref(), lo[to].as_mut())
        };
        let src = src.ok_or(BusError::Unallocated(from as u16))?;
        let dst = dst.ok_or(BusError::Unallocated(to as u16))?;
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d += *s;
        }
        Ok(())
    }

    /// Interleaves the listed output buses into a device frame
    /// (`frame[i * chans + bus]`), then zeroes every buffer for the next
    /// block.
    pub fn drain_out(&mut self, order: &[u16], frame: &mut [f32], chans: usize) {
        for &bus in order {
            let channel = usize::from(bus);
            if channel >= chans {
                continue;
            }
            if let Some(buf) = &self.out[channel] {
                for (i, &sample) in buf.iter().enumerate() {
                    if let Some(slot) = frame.get_mut(i * chans + channel) {
                        *slot += sample;
                    }
                }
            }
        }
        for buf in self.out.iter_mut().chain(self.aux.iter_mut()).flatten() {
            buf.fill(0.0);
        }
    }
}

/// Per-worker mix queues for the threaded regime.
///
/// Each worker owns exactly one queue, so the parallel phase never writes a
/// shared buffer. Draining applies queues in thread order, keeping each
/// thread's contributions deterministic.
#[derive(Debug)]
pub struct MixQueues {
    queues: Vec<Mutex<Vec<MixData>>>,
}

impl MixQueues {
    /// Creates one queue per worker thread.
    pub fn new(threads: usize) -> Self {
        Self {
            queues: (0..threads).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Number of worker queues.
    pub fn thread_count(&self) -> usize {
        self.queues.len()
    }

    /// Appends a record to one worker's queue.
    pub fn push(&self, thread: usize, data: MixData) {
        self.queues[thread].lock().push(data);
    }

    /// Applies and clears every queue, in thread order.
    pub fn drain(&self, buffers: &mut BusBuffers) -> Result<(), BusError> {
        for queue in &self.queues {
            let mut queue = queue.lock();
            for data in queue.drain(..) {
                buffers.apply(&data)?;
            }
        }
        Ok(())
    }

    /// Applies and clears every queue in play-list bus order: aux
    /// contributions grouped by `to_aux`, then output contributions by
    /// `to_out`. Within one bus, records land in thread order, then queue
    /// order. Records for a bus missing from its list (a configuration
    /// changed mid-flight) still land, in a trailing pass.
    pub fn drain_in_bus_order(
        &self,
        buffers: &mut BusBuffers,
        to_aux: &[u16],
        to_out: &[u16],
    ) -> Result<(), BusError> {
        let mut records: Vec<MixData> = Vec::new();
        for queue in &self.queues {
            records.append(&mut queue.lock());
        }

        for &bus in to_aux {
            for data in &records {
                if data.bus_type == BusType::AuxOut && data.bus == bus {
                    buffers.apply(data)?;
                }
            }
        }
        for &bus in to_out {
            for data in &records {
                if data.bus_type == BusType::Out && data.bus == bus {
                    buffers.apply(data)?;
                }
            }
        }
        for data in &records {
            let ordered = match data.bus_type {
                BusType::AuxOut => to_aux.contains(&data.bus),
                BusType::Out => to_out.contains(&data.bus),
            };
            if !ordered {
                tracing::debug!(bus = data.bus, "mix record for unlisted bus");
                buffers.apply(data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_to_bus_strides_interleaved_source() {
        let mut buffers = BusBuffers::new(4, 4);
        buffers.allocate_out_buffer(0);
        // Stereo-interleaved source; channel 0 is 1, 2, 3, 4.
        let src = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        buffers.add_to_bus(BusType::Out, 0, &src, 0, 4, 2).unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_add_to_bus_offset_window() {
        let mut buffers = BusBuffers::new(4, 8);
        buffers.allocate_aux_buffer(1, 8);
        let src = [0.5, 0.5];
        buffers
            .add_to_bus(BusType::AuxOut, 1, &src, 3, 5, 1)
            .unwrap();
        let buf = buffers.aux(1).unwrap();
        assert_eq!(&buf[3..5], &[0.5, 0.5]);
        assert_eq!(buf[0], 0.0);
        assert_eq!(buf[5], 0.0);
    }

    #[test]
    fn test_accumulation_sums() {
        let mut buffers = BusBuffers::new(2, 2);
        buffers.allocate_out_buffer(0);
        buffers.add_to_bus(BusType::Out, 0, &[1.0, 1.0], 0, 2, 1).unwrap();
        buffers.add_to_bus(BusType::Out, 0, &[0.25, 0.5], 0, 2, 1).unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[1.25, 1.5]);
    }

    #[test]
    fn test_mix_to_bus_applies_gain() {
        let mut buffers = BusBuffers::new(2, 2);
        buffers.allocate_out_buffer(0);
        buffers
            .mix_to_bus(BusType::Out, 0, &[1.0, 1.0], 0, 2, 1, 0.5)
            .unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[0.5, 0.5]);
    }

    #[test]
    fn test_unallocated_bus_is_an_error() {
        let mut buffers = BusBuffers::new(2, 2);
        let err = buffers
            .add_to_bus(BusType::Out, 1, &[1.0], 0, 1, 1)
            .unwrap_err();
        assert_eq!(err, BusError::Unallocated(1));
    }

    #[test]
    fn test_aux_to_aux_addition_both_directions() {
        let mut buffers = BusBuffers::new(4, 2);
        buffers.allocate_aux_buffer(0, 2);
        buffers.allocate_aux_buffer(3, 2);
        buffers
            .add_to_bus(BusType::AuxOut, 0, &[1.0, 2.0], 0, 2, 1)
            .unwrap();
        buffers
            .add_to_bus(BusType::AuxOut, 3, &[10.0, 20.0], 0, 2, 1)
            .unwrap();

        buffers.add_aux_to_aux(0, 3).unwrap();
        assert_eq!(buffers.aux(3).unwrap(), &[11.0, 22.0]);

        buffers.add_aux_to_aux(3, 0).unwrap();
        assert_eq!(buffers.aux(0).unwrap(), &[12.0, 24.0]);
    }

    #[test]
    fn test_queue_drain_applies_in_thread_order() {
        let mut buffers = BusBuffers::new(2, 2);
        buffers.allocate_out_buffer(0);
        let queues = MixQueues::new(2);

        queues.push(
            1,
            MixData::from_interleaved(BusType::Out, 0, &[1.0, 1.0], 0, 2, 1),
        );
        queues.push(
            0,
            MixData::from_interleaved(BusType::Out, 0, &[2.0, 2.0], 0, 2, 1),
        );
        queues.drain(&mut buffers).unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[3.0, 3.0]);

        // Queues are empty after a drain.
        queues.drain(&mut buffers).unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[3.0, 3.0]);
    }

    #[test]
    fn test_drain_in_bus_order_covers_both_lists() {
        let mut buffers = BusBuffers::new(4, 2);
        buffers.allocate_aux_buffer(0, 2);
        buffers.allocate_aux_buffer(1, 2);
        buffers.allocate_out_buffer(0);
        let queues = MixQueues::new(2);

        queues.push(
            1,
            MixData::from_interleaved(BusType::AuxOut, 1, &[2.0, 2.0], 0, 2, 1),
        );
        queues.push(
            0,
            MixData::from_interleaved(BusType::AuxOut, 0, &[1.0, 1.0], 0, 2, 1),
        );
        queues.push(
            0,
            MixData::from_interleaved(BusType::Out, 0, &[3.0, 3.0], 0, 2, 1),
        );

        queues
            .drain_in_bus_order(&mut buffers, &[0, 1], &[0])
            .unwrap();
        assert_eq!(buffers.aux(0).unwrap(), &[1.0, 1.0]);
        assert_eq!(buffers.aux(1).unwrap(), &[2.0, 2.0]);
        assert_eq!(buffers.out(0).unwrap(), &[3.0, 3.0]);

        // Queues are empty afterwards.
        queues.drain_in_bus_order(&mut buffers, &[0, 1], &[0]).unwrap();
        assert_eq!(buffers.out(0).unwrap(), &[3.0, 3.0]);
    }

    #[test]
    fn test_drain_in_bus_order_keeps_unlisted_contributions() {
        let mut buffers = BusBuffers::new(4, 2);
        buffers.allocate_aux_buffer(2, 2);
        let queues = MixQueues::new(1);
        queues.push(
            0,
            MixData::from_interleaved(BusType::AuxOut, 2, &[1.0, 1.0], 0, 2, 1),
        );
        // Bus 2 is on no play list; its audio must not be dropped.
        queues.drain_in_bus_order(&mut buffers, &[0], &[]).unwrap();
        assert_eq!(buffers.aux(2).unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_mix_data_captures_stride() {
        let data = MixData::from_interleaved(BusType::Out, 0, &[1.0, 9.0, 2.0, 9.0], 0, 2, 2);
        assert_eq!(data.samples, vec![1.0, 2.0]);
    }

    #[test]
    fn test_drain_out_interleaves_and_clears() {
        let mut buffers = BusBuffers::new(2, 2);
        buffers.allocate_out_buffer(0);
        buffers.allocate_out_buffer(1);
        buffers.add_to_bus(BusType::Out, 0, &[1.0, 2.0], 0, 2, 1).unwrap();
        buffers.add_to_bus(BusType::Out, 1, &[3.0, 4.0], 0, 2, 1).unwrap();

        let mut frame = vec![0.0; 4];
        buffers.drain_out(&[0, 1], &mut frame, 2);
        assert_eq!(frame, vec![1.0, 3.0, 2.0, 4.0]);
        // Buffers are zeroed for the next block.
        assert_eq!(buffers.out(0).unwrap(), &[0.0, 0.0]);
    }
}
