//! Bus-name parsing, `bus_config` semantics, and playback-order derivation.
//!
//! [`BusGraph`] is the mutable routing state: per-bus flags, the per-bus
//! parent lists (`in_config[k]` names the aux buses feeding bus `k`), the
//! per-instrument slot chains, and the three play lists the mixer walks
//! each block. Reconfiguration is append-only: a new [`BusSlot`] becomes the
//! head of its instrument's chain and earlier slots stay behind it.
//!
//! The loop check runs before any mutation, so a rejected configuration
//! leaves the graph exactly as it was.

use std::collections::HashMap;

use super::{BusClass, BusError, BusRange, BusSlot};

/// Parses one bus name: `in<a>[-<b>]`, `out<a>[-<b>]`, `aux<a>[-<b>]in`,
/// `aux<a>[-<b>]out`, `chain<a>[-<b>]in`, `chain<a>[-<b>]out`.
///
/// Whitespace anywhere in the name is ignored, so `"aux 0 in"` and
/// `"aux0in"` are the same bus. Range endpoints must satisfy `b >= a` and
/// `b < bus_count`.
pub fn parse_bus_name(name: &str, bus_count: usize) -> Result<BusRange, BusError> {
    let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();

    let (prefix, needs_direction) = if compact.starts_with("aux") {
        ("aux", true)
    } else if compact.starts_with("chain") {
        ("chain", true)
    } else if compact.starts_with("in") {
        ("in", false)
    } else if compact.starts_with("out") {
        ("out", false)
    } else {
        return Err(BusError::InvalidBus(name.to_string()));
    };

    let mut rest = &compact[prefix.len()..];
    let direction_in = if needs_direction {
        if let Some(stripped) = rest.strip_suffix("in") {
            rest = stripped;
            true
        } else if let Some(stripped) = rest.strip_suffix("out") {
            rest = stripped;
            false
        } else {
            return Err(BusError::InvalidBus(name.to_string()));
        }
    } else {
        prefix == "in"
    };

    let (first, last) = match rest.split_once('-') {
        Some((a, b)) => {
            let a: usize = a.parse().map_err(|_| BusError::InvalidBus(name.to_string()))?;
            let b: usize = b.parse().map_err(|_| BusError::InvalidBus(name.to_string()))?;
            (a, b)
        }
        None => {
            let a: usize = rest
                .parse()
                .map_err(|_| BusError::InvalidBus(name.to_string()))?;
            (a, a)
        }
    };

    if last < first {
        return Err(BusError::InvalidBus(name.to_string()));
    }
    if last >= bus_count {
        return Err(BusError::InvalidBusChannel {
            channel: last,
            first: 0,
            last: bus_count,
        });
    }

    let class = match (prefix, direction_in) {
        ("in", _) => BusClass::In,
        ("out", _) => BusClass::Out,
        ("aux", true) => BusClass::AuxIn,
        ("aux", false) => BusClass::AuxOut,
        ("chain", true) => BusClass::ChainIn,
        (_, false) => BusClass::ChainOut,
        _ => unreachable!("prefix checked above"),
    };

    Ok(BusRange {
        class,
        first: first as u16,
        last: last as u16,
    })
}

/// Per-bus routing flags and parent lists.
#[derive(Debug, Clone)]
struct BusFlags {
    out_in_use: Vec<bool>,
    aux_in_use: Vec<bool>,
    aux_out_in_use: Vec<bool>,
    has_parent: Vec<bool>,
    has_child: Vec<bool>,
    /// `in_config[k]`: aux buses feeding bus `k`.
    in_config: Vec<Vec<u16>>,
}

impl BusFlags {
    fn new(bus_count: usize) -> Self {
        Self {
            out_in_use: vec![false; bus_count],
            aux_in_use: vec![false; bus_count],
            aux_out_in_use: vec![false; bus_count],
            has_parent: vec![false; bus_count],
            has_child: vec![false; bus_count],
            in_config: vec![Vec::new(); bus_count],
        }
    }
}

/// The three summation orders the mixer walks each block.
#[derive(Debug, Clone, Default)]
pub struct PlayLists {
    /// Aux buses in aux-to-aux summation order: every feeder appears
    /// before the bus it feeds.
    pub aux_to_aux: Vec<u16>,
    /// Aux buses receiving instrument output.
    pub to_aux: Vec<u16>,
    /// Output buses receiving instrument output, in drain order.
    pub to_out: Vec<u16>,
}

/// The bus routing graph.
#[derive(Debug)]
pub struct BusGraph {
    bus_count: usize,
    flags: BusFlags,
    play: PlayLists,
    /// Slot chains per instrument name; index 0 is the current head.
    bindings: HashMap<String, Vec<BusSlot>>,
}

impl BusGraph {
    /// Creates a graph with `bus_count` buses and no routing.
    pub fn new(bus_count: usize) -> Self {
        Self {
            bus_count,
            flags: BusFlags::new(bus_count),
            play: PlayLists::default(),
            bindings: HashMap::new(),
        }
    }

    /// Number of buses.
    pub fn bus_count(&self) -> usize {
        self.bus_count
    }

    /// Applies a `bus_config(inst, busname...)` call.
    ///
    /// Parses every name, rejects mixed input classes (`in` + `auxin`,
    /// `in` + `chainin`, `auxin` + `chainin`) and likewise for outputs,
    /// runs the loop check, and only then installs the slot at the head of
    /// the instrument's chain and recomputes the play lists.
    ///
    /// # Errors
    ///
    /// [`BusError::Loop`] when the slot would read a bus that its own
    /// output feeds; parse and class errors as described. The graph is
    /// unchanged on any error.
    pub fn bus_config(&mut self, instrument: &str, names: &[&str]) -> Result<(), BusError> {
        let mut ranges = Vec::with_capacity(names.len());
        for name in names {
            ranges.push(parse_bus_name(name, self.bus_count)?);
        }
        let slot = Self::build_slot(&ranges)?;
        self.check_slot(&slot)?;
        self.commit_slot(instrument, slot);
        Ok(())
    }

    /// Synthesizes the default binding for an instrument that never called
    /// `bus_config`: all device inputs in, all device outputs out. Returns
    /// `true` when a binding was created.
    pub fn ensure_default_config(
        &mut self,
        instrument: &str,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<bool, BusError> {
        if self.bindings.contains_key(instrument) {
            return Ok(false);
        }
        tracing::debug!(instrument, "synthesizing default bus configuration");
        let slot = BusSlot {
            input: (0..input_channels as u16).collect(),
            output: (0..output_channels as u16).collect(),
            ..BusSlot::default()
        };
        self.check_slot(&slot)?;
        self.commit_slot(instrument, slot);
        Ok(true)
    }

    /// The current (head) slot for an instrument.
    pub fn current_slot(&self, instrument: &str) -> Option<&BusSlot> {
        self.bindings.get(instrument).and_then(|chain| chain.first())
    }

    /// The play lists, recomputed on every successful configuration.
    pub fn play_lists(&self) -> &PlayLists {
        &self.play
    }

    /// Aux buses feeding bus `k`.
    pub fn parents(&self, bus: u16) -> &[u16] {
        &self.flags.in_config[usize::from(bus)]
    }

    /// True when bus `k` is in use as an aux bus.
    pub fn aux_in_use(&self, bus: u16) -> bool {
        self.flags.aux_in_use[usize::from(bus)]
    }

    /// True when output buffer `k` must exist.
    pub fn out_in_use(&self, bus: u16) -> bool {
        self.flags.out_in_use[usize::from(bus)]
    }

    /// Every aux bus currently in use; the engine allocates buffers for
    /// these after a configuration changes.
    pub fn aux_buses_in_use(&self) -> Vec<u16> {
        (0..self.bus_count as u16)
            .filter(|&k| self.flags.aux_in_use[usize::from(k)])
            .collect()
    }

    /// The transitive feeder set of a bus. Exposed for invariant checking:
    /// no bus may appear in its own set.
    pub fn transitive_parents(&self, bus: u16) -> Vec<u16> {
        let mut seen = vec![false; self.bus_count];
        let mut stack = self.flags.in_config[usize::from(bus)].clone();
        let mut out = Vec::new();
        while let Some(p) = stack.pop() {
            if seen[usize::from(p)] {
                continue;
            }
            seen[usize::from(p)] = true;
            out.push(p);
            stack.extend_from_slice(&self.flags.in_config[usize::from(p)]);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Expands parsed ranges into a slot, rejecting mixed classes.
    fn build_slot(ranges: &[BusRange]) -> Result<BusSlot, BusError> {
        let mut slot = BusSlot::default();
        let mut input_class: Option<BusClass> = None;
        let mut output_class: Option<BusClass> = None;

        for range in ranges {
            let seen = if range.class.is_input() {
                &mut input_class
            } else {
                &mut output_class
            };
            match *seen {
                Some(existing) if existing != range.class => {
                    return Err(BusError::MixedBusClasses {
                        a: existing.name(),
                        b: range.class.name(),
                    });
                }
                _ => *seen = Some(range.class),
            }

            match range.class {
                BusClass::In => slot.input.extend(range.indices()),
                BusClass::Out => slot.output.extend(range.indices()),
                BusClass::AuxIn => slot.aux_input.extend(range.indices()),
                BusClass::AuxOut => slot.aux_output.extend(range.indices()),
                BusClass::ChainIn => slot.chained_inputs += range.len(),
                BusClass::ChainOut => slot.chained_outputs += range.len(),
            }
        }
        Ok(slot)
    }

    /// The loop check: breadth-first sweep from the slot's auxin set along
    /// existing feed edges (seeded explicitly — no sentinel bus ids). A
    /// path landing on one of the slot's own auxouts means the instrument
    /// would read what it feeds, directly or around an existing chain.
    ///
    /// Runs against the unmodified graph, so rejection has nothing to roll
    /// back.
    fn check_slot(&self, slot: &BusSlot) -> Result<(), BusError> {
        let mut visited = vec![false; self.bus_count];
        let mut queue: Vec<u16> = slot.aux_input.clone();

        while let Some(j) = queue.pop() {
            if visited[usize::from(j)] {
                continue;
            }
            visited[usize::from(j)] = true;
            if slot.aux_output.contains(&j) {
                return Err(BusError::Loop(j));
            }
            // Buses that j feeds.
            for k in 0..self.bus_count as u16 {
                if self.flags.in_config[usize::from(k)].contains(&j)
                    && !visited[usize::from(k)]
                {
                    queue.push(k);
                }
            }
        }
        Ok(())
    }

    /// Installs a checked slot: flag updates, parent-list edges, head
    /// insertion, play-order recomputation.
    fn commit_slot(&mut self, instrument: &str, slot: BusSlot) {
        for &k in &slot.output {
            self.flags.out_in_use[usize::from(k)] = true;
        }
        for &k in &slot.aux_output {
            self.flags.aux_in_use[usize::from(k)] = true;
            self.flags.aux_out_in_use[usize::from(k)] = true;
            for &j in &slot.aux_input {
                self.flags.has_parent[usize::from(k)] = true;
                self.flags.has_child[usize::from(j)] = true;
                self.flags.aux_in_use[usize::from(j)] = true;
                let parents = &mut self.flags.in_config[usize::from(k)];
                if !parents.contains(&j) {
                    parents.push(j);
                }
            }
        }
        for &j in &slot.aux_input {
            self.flags.aux_in_use[usize::from(j)] = true;
        }

        self.bindings
            .entry(instrument.to_string())
            .or_default()
            .insert(0, slot);
        self.create_play_order();
    }

    /// Recomputes the three play lists.
    ///
    /// `aux_to_aux` seeds with root aux buses (in use, no feeders), then
    /// walks upstream from each leaf (in use, feeds nothing) in depth-first
    /// postorder, so every feeder lands before the bus it feeds.
    fn create_play_order(&mut self) {
        let n = self.bus_count;
        let mut order: Vec<u16> = Vec::new();
        let mut placed = vec![false; n];

        for k in 0..n {
            if self.flags.aux_in_use[k] && !self.flags.has_parent[k] {
                order.push(k as u16);
                placed[k] = true;
            }
        }

        for leaf in 0..n {
            if self.flags.aux_in_use[leaf] && !self.flags.has_child[leaf] && !placed[leaf] {
                self.ancestry_postorder(leaf as u16, &mut placed, &mut order);
            }
        }

        self.play.aux_to_aux = order;
        self.play.to_aux = (0..n as u16)
            .filter(|&k| self.flags.aux_out_in_use[usize::from(k)])
            .collect();
        self.play.to_out = (0..n as u16)
            .filter(|&k| self.flags.out_in_use[usize::from(k)])
            .collect();
    }

    /// Pushes `bus` after all of its unplaced feeders.
    fn ancestry_postorder(&self, bus: u16, placed: &mut [bool], order: &mut Vec<u16>) {
        if placed[usize::from(bus)] {
            return;
        }
        placed[usize::from(bus)] = true;
        for &p in &self.flags.in_config[usize::from(bus)] {
            self.ancestry_postorder(p, placed, order);
        }
        order.push(bus);
    }
}
