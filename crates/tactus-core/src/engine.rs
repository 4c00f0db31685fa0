//! The engine: one value owning every piece of mutable state the score
//! language and the mixer touch.
//!
//! [`Engine`] pairs a score interpreter with [`EngineState`]. The state
//! implements the interpreter's [`ExternalDispatch`] seam, which is how
//! score calls like `bus_config(...)`, `tempo(...)`, `time_beat(...)`, and
//! `set_option(...)` reach the routing graph, the tempo map, and the option
//! store. Everything instrument-shaped (schedulers, table builders, audio
//! device setup beyond bookkeeping) remains the host's business: unknown
//! names keep falling through.
//!
//! Mutable mixing state sits behind dedicated locks (`graph`, `buffers`,
//! one per worker queue) so the threaded regime can record contributions
//! from workers while configuration reads stay consistent. Score evaluation
//! itself runs between render blocks, single-threaded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;

use tactus_config::{ConfigError, Options};
use tactus_lang::ast::Node;
use tactus_lang::dispatch::{DispatchError, ExternalDispatch};
use tactus_lang::error::MincError;
use tactus_lang::interp::Interpreter;
use tactus_lang::value::MincValue;

use crate::bus::config::BusGraph;
use crate::bus::mix::{BusBuffers, BusType, MixData, MixQueues};
use crate::bus::{BusError, DEFAULT_BUS_COUNT};
use crate::tempo::{TempoError, TempoMap};

/// Worker threads in the threaded render regime.
pub const DEFAULT_RT_THREADS: usize = 2;

/// Default sample rate before `rtsetparams` runs.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Errors from the engine's public surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bus routing failure (loops, bad names, bad channels).
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Tempo-map construction failure.
    #[error(transparent)]
    Tempo(#[from] TempoError),

    /// Option store or rc-file failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fatal score-language error.
    #[error(transparent)]
    Score(#[from] MincError),

    /// A score-visible engine function was called with bad arguments.
    #[error("invalid parameter: {0}")]
    Param(String),
}

/// Everything the mixer and the score-visible engine functions operate on.
pub struct EngineState {
    options: Options,
    tempo: TempoMap,
    graph: Mutex<BusGraph>,
    buffers: Mutex<BusBuffers>,
    queues: MixQueues,
    /// Per-channel output peaks, tracked when `check_peaks` is on.
    peaks: Mutex<Vec<f32>>,
    sample_rate: f64,
    input_channels: usize,
    output_channels: usize,
    /// True once `rtsetparams` has run; freezes record/full-duplex.
    audio_configured: bool,
}

impl EngineState {
    fn new(options: Options, worker_threads: usize) -> Self {
        let buffer_frames = options.buffer_frames;
        Self {
            options,
            tempo: TempoMap::new(),
            graph: Mutex::new(BusGraph::new(DEFAULT_BUS_COUNT)),
            buffers: Mutex::new(BusBuffers::new(DEFAULT_BUS_COUNT, buffer_frames)),
            queues: MixQueues::new(worker_threads),
            peaks: Mutex::new(vec![0.0; 2]),
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_channels: 2,
            output_channels: 2,
            audio_configured: false,
        }
    }

    // -----------------------------------------------------------------------
    // Host-facing mixing surface
    // -----------------------------------------------------------------------

    /// Frames per render block.
    pub fn buf_samps(&self) -> usize {
        self.lock_buffers().block_frames()
    }

    /// Output channel count.
    pub fn chans(&self) -> usize {
        self.output_channels
    }

    /// Engine-wide bus count.
    pub fn bus_count(&self) -> usize {
        self.lock_graph().bus_count()
    }

    /// Current sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// The option store.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The tempo map.
    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// Runs `f` against the routing graph under its lock.
    pub fn with_graph<T>(&self, f: impl FnOnce(&BusGraph) -> T) -> T {
        f(&self.lock_graph())
    }

    /// Makes sure `instrument` has a routing slot, synthesizing the default
    /// all-inputs/all-outputs binding if it never called `bus_config`.
    pub fn ensure_instrument(&self, instrument: &str) -> Result<(), EngineError> {
        let created = self.lock_graph().ensure_default_config(
            instrument,
            self.input_channels,
            self.output_channels,
        )?;
        if created {
            self.allocate_configured_buffers();
        }
        Ok(())
    }

    /// Direct accumulation into a bus buffer (single-threaded regime).
    pub fn add_to_bus(
        &self,
        bus_type: BusType,
        bus: u16,
        src: &[f32],
        offset: usize,
        end_frame: usize,
        chans: usize,
    ) -> Result<(), EngineError> {
        self.lock_buffers()
            .add_to_bus(bus_type, bus, src, offset, end_frame, chans)?;
        Ok(())
    }

    /// Gain-scaled accumulation into a bus buffer.
    pub fn mix_to_bus(
        &self,
        bus_type: BusType,
        bus: u16,
        src: &[f32],
        offset: usize,
        end_frame: usize,
        chans: usize,
        gain: f32,
    ) -> Result<(), EngineError> {
        self.lock_buffers()
            .mix_to_bus(bus_type, bus, src, offset, end_frame, chans, gain)?;
        Ok(())
    }

    /// Ensures an aux buffer of at least `frames` exists for `bus`.
    pub fn allocate_aux_buffer(&self, bus: u16, frames: usize) {
        self.lock_buffers().allocate_aux_buffer(bus, frames);
    }

    /// Records a deferred contribution from worker `thread`.
    pub fn queue_mix(&self, thread: usize, data: MixData) {
        self.queues.push(thread, data);
    }

    /// Runs instrument jobs across the worker pool for one block.
    ///
    /// Jobs are claimed from a shared index, each receiving its worker's
    /// thread index for [`queue_mix`](Self::queue_mix). Returning from this
    /// function is the barrier between the parallel DSP phase and the
    /// serial mix phase: call [`render_block`](Self::render_block) next.
    pub fn run_block_parallel<F>(&self, jobs: Vec<F>)
    where
        F: FnOnce(usize, &EngineState) + Send,
    {
        let jobs: Vec<Mutex<Option<F>>> = jobs.into_iter().map(|j| Mutex::new(Some(j))).collect();
        let next = AtomicUsize::new(0);
        thread::scope(|scope| {
            for worker in 0..self.queues.thread_count() {
                let jobs = &jobs;
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(slot) = jobs.get(i) else {
                            break;
                        };
                        let job = slot.lock().take();
                        if let Some(job) = job {
                            job(worker, self);
                        }
                    }
                });
            }
        });
    }

    /// Finishes one block: drains the worker queues in play-list bus order
    /// (instrument-to-aux contributions, then instrument-to-out), performs
    /// the aux-to-aux summation, and interleaves the output buses into
    /// `frame` (layout `frame[i * chans + channel]`).
    ///
    /// Bus buffers come out zeroed for the next block.
    pub fn render_block(&self, frame: &mut [f32]) -> Result<(), EngineError> {
        let graph = self.lock_graph();
        let mut buffers = self.lock_buffers();

        let lists = graph.play_lists();
        self.queues
            .drain_in_bus_order(&mut buffers, &lists.to_aux, &lists.to_out)?;

        // Aux chains sum sources-first, so every feeder is complete before
        // the bus it feeds contributes onward.
        for &bus in &lists.aux_to_aux {
            for &parent in graph.parents(bus) {
                buffers.add_aux_to_aux(parent, bus)?;
            }
        }

        buffers.drain_out(&lists.to_out, frame, self.output_channels);
        drop(buffers);
        drop(graph);

        if self.options.check_peaks || self.options.report_clipping {
            self.scan_output(frame);
        }
        Ok(())
    }

    /// Peak tracking and clipping reports over an interleaved frame.
    fn scan_output(&self, frame: &[f32]) {
        let chans = self.output_channels.max(1);
        let mut peaks = self.peaks.lock();
        if peaks.len() < chans {
            peaks.resize(chans, 0.0);
        }
        let mut clipped = 0usize;
        for (i, &sample) in frame.iter().enumerate() {
            let level = sample.abs();
            if self.options.check_peaks {
                let chan = i % chans;
                if level > peaks[chan] {
                    peaks[chan] = level;
                }
            }
            if level > 1.0 {
                clipped += 1;
            }
        }
        if clipped > 0 && self.options.report_clipping {
            tracing::warn!(samples = clipped, "output clipped");
        }
    }

    /// Peak amplitude seen so far on each output channel.
    pub fn peaks(&self) -> Vec<f32> {
        self.peaks.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_graph(&self) -> parking_lot::MutexGuard<'_, BusGraph> {
        self.graph.lock()
    }

    fn lock_buffers(&self) -> parking_lot::MutexGuard<'_, BusBuffers> {
        self.buffers.lock()
    }

    /// Allocates buffers for every bus the graph currently references.
    fn allocate_configured_buffers(&self) {
        let graph = self.lock_graph();
        let mut buffers = self.lock_buffers();
        let frames = buffers.block_frames();
        for bus in graph.aux_buses_in_use() {
            buffers.allocate_aux_buffer(bus, frames);
        }
        for &bus in &graph.play_lists().to_out {
            buffers.allocate_out_buffer(bus);
        }
    }

    // -----------------------------------------------------------------------
    // Score-visible engine functions
    // -----------------------------------------------------------------------

    fn score_bus_config(&mut self, args: &[MincValue]) -> Result<MincValue, DispatchError> {
        if args.len() < 2 {
            return Err(failed("bus_config needs an instrument name and at least one bus"));
        }
        let instrument = string_arg(args, 0, "bus_config")?;
        let mut names = Vec::with_capacity(args.len() - 1);
        for i in 1..args.len() {
            names.push(string_arg(args, i, "bus_config")?);
        }
        self.lock_graph()
            .bus_config(instrument, &names)
            .map_err(|err| failed(err))?;
        self.allocate_configured_buffers();
        Ok(MincValue::Void)
    }

    fn score_tempo(&mut self, args: &[MincValue]) -> Result<MincValue, DispatchError> {
        if args.len() % 2 != 0 {
            return Err(failed("tempo takes time/tempo pairs"));
        }
        let mut points = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks(2) {
            let time = float_value(&pair[0], "tempo")?;
            let tempo = float_value(&pair[1], "tempo")?;
            points.push((time, tempo));
        }
        self.tempo.set_map(&points).map_err(|err| failed(err))?;
        Ok(MincValue::Void)
    }

    fn score_set_option(&mut self, args: &[MincValue]) -> Result<MincValue, DispatchError> {
        for i in 0..args.len() {
            let spec = string_arg(args, i, "set_option")?;
            self.options
                .set_option(spec, self.audio_configured)
                .map_err(|err| failed(err))?;
        }
        Ok(MincValue::Void)
    }

    fn score_rtsetparams(&mut self, args: &[MincValue]) -> Result<MincValue, DispatchError> {
        if args.len() < 2 {
            return Err(failed("rtsetparams needs a sample rate and channel count"));
        }
        let sample_rate = float_value(&args[0], "rtsetparams")?;
        let chans = float_value(&args[1], "rtsetparams")? as usize;
        if sample_rate <= 0.0 || chans == 0 {
            return Err(failed("rtsetparams: bad sample rate or channel count"));
        }
        self.sample_rate = sample_rate;
        self.output_channels = chans;
        self.input_channels = chans;
        if let Some(frames) = args.get(2) {
            self.options.buffer_frames = float_value(frames, "rtsetparams")? as usize;
        }
        self.lock_buffers().set_block_frames(self.options.buffer_frames);
        self.peaks.lock().resize(chans, 0.0);
        self.audio_configured = true;
        tracing::info!(sample_rate, chans, "audio parameters set");
        Ok(MincValue::Void)
    }
}

/// Shorthand for a failed host dispatch.
fn failed(message: impl ToString) -> DispatchError {
    DispatchError::Failed(message.to_string())
}

fn string_arg<'a>(
    args: &'a [MincValue],
    index: usize,
    func: &str,
) -> Result<&'a str, DispatchError> {
    match args.get(index) {
        Some(MincValue::String(s)) => Ok(s),
        other => Err(failed(format!(
            "{func}: argument {index} must be a string, got {}",
            other.map_or("nothing".to_string(), |v| v.minc_type().to_string())
        ))),
    }
}

fn float_value(value: &MincValue, func: &str) -> Result<f64, DispatchError> {
    match value {
        MincValue::Float(v) => Ok(*v),
        other => Err(failed(format!(
            "{func}: expected a number, got {}",
            other.minc_type()
        ))),
    }
}

impl ExternalDispatch for EngineState {
    fn call_function(
        &mut self,
        name: &str,
        args: &[MincValue],
    ) -> Result<MincValue, DispatchError> {
        match name {
            "bus_config" => self.score_bus_config(args),
            "tempo" => self.score_tempo(args),
            "tbase" => {
                let basis = float_value(
                    args.first().ok_or_else(|| failed("tbase takes a beat value"))?,
                    "tbase",
                )?;
                self.tempo.set_basis(basis).map_err(|err| failed(err))?;
                Ok(MincValue::Void)
            }
            "time_beat" => {
                let t = float_value(
                    args.first().ok_or_else(|| failed("time_beat takes seconds"))?,
                    "time_beat",
                )?;
                Ok(MincValue::Float(self.tempo.time_to_beat(t)))
            }
            "beat_time" => {
                let b = float_value(
                    args.first().ok_or_else(|| failed("beat_time takes beats"))?,
                    "beat_time",
                )?;
                Ok(MincValue::Float(self.tempo.beat_to_time(b)))
            }
            "set_option" => self.score_set_option(args),
            "rtsetparams" => self.score_rtsetparams(args),
            _ => Err(DispatchError::NotFound),
        }
    }
}

/// The engine: an interpreter plus the state its scores configure.
pub struct Engine {
    interp: Interpreter,
    state: EngineState,
}

impl Engine {
    /// Creates an engine with default options.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Creates an engine with explicit options.
    pub fn with_options(options: Options) -> Self {
        let mut interp = Interpreter::new();
        Self::sync_settings(&mut interp, &options);
        Self {
            interp,
            state: EngineState::new(options, DEFAULT_RT_THREADS),
        }
    }

    /// Creates an engine configured from `~/.tactusrc`.
    pub fn from_user_rc() -> Result<Self, EngineError> {
        Ok(Self::with_options(Options::from_user_rc()?))
    }

    fn sync_settings(interp: &mut Interpreter, options: &Options) {
        let settings = interp.settings_mut();
        settings.print_level = options.print;
        settings.print_list_limit = options.print_list_limit;
    }

    /// Evaluates one score tree. Engine functions (`bus_config`, `tempo`,
    /// `set_option`, ...) resolve against this engine's state; unknown
    /// names fail as undefined.
    pub fn eval(&mut self, root: &Node) -> Result<MincValue, EngineError> {
        // Options can change between passes (set_option); keep the
        // interpreter's print gates in step.
        Self::sync_settings(&mut self.interp, &self.state.options);
        let result = self.interp.run(root, &mut self.state)?;
        Self::sync_settings(&mut self.interp, &self.state.options);
        Ok(result)
    }

    /// The engine state: mixing surface, options, tempo map.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Mutable engine state, for hosts driving the mixer directly.
    pub fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    /// The interpreter, e.g. to redirect score print output.
    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
