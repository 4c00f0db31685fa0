//! Core engine for tactus: bus routing, mixing, and tempo mapping behind a
//! score-language front end.
//!
//! The three subsystems:
//!
//! - **Bus graph** ([`bus`]): numbered buses with per-instrument routing
//!   slots, a loop check on aux routing, and a derived playback order that
//!   fixes the per-block summation sequence
//! - **Mixer** ([`bus::mix`]): per-bus buffers, strided accumulation from
//!   interleaved instrument output, and per-worker mix queues for the
//!   threaded regime
//! - **Tempo map** ([`tempo`]): piecewise constant-acceleration mapping
//!   between score seconds and beats
//!
//! [`Engine`] ties them to a [`tactus_lang`] interpreter: score calls such
//! as `bus_config`, `tempo`, `time_beat`, and `set_option` resolve against
//! the engine state through the interpreter's external-dispatch seam, while
//! instrument schedulers and device I/O remain host-provided.
//!
//! # Example
//!
//! ```rust
//! use tactus_core::Engine;
//! use tactus_lang::Node;
//!
//! let mut engine = Engine::new();
//! engine
//!     .eval(&Node::call_named(
//!         "bus_config",
//!         vec![
//!             Node::string("SYNTH"),
//!             Node::string("in 0"),
//!             Node::string("aux 0 out"),
//!         ],
//!     ))
//!     .unwrap();
//! assert!(engine.state().with_graph(|g| g.aux_in_use(0)));
//! ```

pub mod bus;
pub mod engine;
pub mod tempo;

pub use bus::config::{BusGraph, PlayLists, parse_bus_name};
pub use bus::mix::{BusBuffers, BusType, MixData, MixQueues};
pub use bus::{BusClass, BusError, BusRange, BusSlot, DEFAULT_BUS_COUNT};
pub use engine::{DEFAULT_RT_THREADS, Engine, EngineError, EngineState};
pub use tempo::{DEFAULT_BASIS, TEMPO_POINTS_MAX, TempoError, TempoMap};
