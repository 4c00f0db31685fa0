//! The bus routing layer: numbered audio buses, per-instrument routing
//! slots, and the derived playback order.
//!
//! Buses come in three classes. Input and output buses touch the device;
//! aux buses are internal routing points that instruments read and write
//! and that feed each other. [`config::BusGraph`] owns the routing state
//! (flags, parent lists, play lists, per-instrument slot chains);
//! [`mix::BusBuffers`] owns the per-bus sample storage the mixer
//! accumulates into.

pub mod config;
pub mod mix;

use thiserror::Error;

/// Engine-wide default number of buses.
pub const DEFAULT_BUS_COUNT: usize = 64;

/// Errors from bus configuration and mixing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// Aux routing would read a bus the same configuration feeds.
    #[error("aux bus {0} would form a routing loop")]
    Loop(u16),

    /// A bus specification string did not parse.
    #[error("invalid bus specification '{0}'")]
    InvalidBus(String),

    /// A bus index fell outside the engine's bus range.
    #[error("bus channel {channel} out of range ({first}..{last})")]
    InvalidBusChannel {
        /// The rejected index.
        channel: usize,
        /// First legal index.
        first: usize,
        /// One past the last legal index.
        last: usize,
    },

    /// One configuration mixed incompatible input (or output) classes.
    #[error("cannot combine {a} and {b} buses in one configuration")]
    MixedBusClasses {
        /// First class seen.
        a: &'static str,
        /// The conflicting class.
        b: &'static str,
    },

    /// A mixing call referenced a bus with no allocated buffer.
    #[error("bus {0} has no buffer allocated")]
    Unallocated(u16),
}

/// The class a parsed bus name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusClass {
    /// Device input, `in<a>[-<b>]`.
    In,
    /// Device output, `out<a>[-<b>]`.
    Out,
    /// Aux bus read by the instrument, `aux<a>[-<b>]in`.
    AuxIn,
    /// Aux bus written by the instrument, `aux<a>[-<b>]out`.
    AuxOut,
    /// Instrument-chain input, `chain<a>[-<b>]in`. Counts toward channel
    /// validation but takes no part in routing.
    ChainIn,
    /// Instrument-chain output, `chain<a>[-<b>]out`.
    ChainOut,
}

impl BusClass {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            BusClass::In => "in",
            BusClass::Out => "out",
            BusClass::AuxIn => "auxin",
            BusClass::AuxOut => "auxout",
            BusClass::ChainIn => "chainin",
            BusClass::ChainOut => "chainout",
        }
    }

    /// True for the classes an instrument reads from.
    pub fn is_input(self) -> bool {
        matches!(self, BusClass::In | BusClass::AuxIn | BusClass::ChainIn)
    }
}

/// A parsed bus name: a class plus an inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRange {
    /// Bus class.
    pub class: BusClass,
    /// First bus index.
    pub first: u16,
    /// Last bus index (inclusive; equal to `first` for single buses).
    pub last: u16,
}

impl BusRange {
    /// Iterates the bus indices in the range.
    pub fn indices(self) -> impl Iterator<Item = u16> {
        self.first..=self.last
    }

    /// Number of buses in the range.
    pub fn len(self) -> usize {
        usize::from(self.last - self.first) + 1
    }

    /// Always false; ranges hold at least one bus.
    pub fn is_empty(self) -> bool {
        false
    }
}

/// Per-instrument routing record: the four bus-index arrays plus chain
/// counts. Slots chain per instrument name; only the head slot is current.
#[derive(Debug, Clone, Default)]
pub struct BusSlot {
    /// Device input buses read.
    pub input: Vec<u16>,
    /// Device output buses written.
    pub output: Vec<u16>,
    /// Aux buses read.
    pub aux_input: Vec<u16>,
    /// Aux buses written.
    pub aux_output: Vec<u16>,
    /// Chain inputs: validation-only channel count.
    pub chained_inputs: usize,
    /// Chain outputs: validation-only channel count.
    pub chained_outputs: usize,
}

impl BusSlot {
    /// Input channel count seen by instrument validation, chain channels
    /// included.
    pub fn input_count(&self) -> usize {
        self.input.len() + self.aux_input.len() + self.chained_inputs
    }

    /// Output channel count seen by instrument validation, chain channels
    /// included.
    pub fn output_count(&self) -> usize {
        self.output.len() + self.aux_output.len() + self.chained_outputs
    }
}
