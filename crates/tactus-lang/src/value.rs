//! Tagged score-language values and the operator table.
//!
//! [`MincValue`] is the single value representation flowing through the
//! interpreter: floats, interned strings, opaque handles, shared lists and
//! maps, struct instances, and bound script functions. Lists, maps, and
//! structs are shared by reference (`Rc<RefCell<...>>`) — assignment aliases
//! them. Strings are immutable and cheap to copy.
//!
//! Operator application ([`apply_binary`], [`apply_unary`], [`compare`])
//! implements the recoverable-error contract: misuse logs a warning through
//! `tracing` and yields a safe value instead of aborting the score pass.
//! Handle operands are the exception — the interpreter routes those to the
//! host's handle-operator hook before reaching this module.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::ast::{BinaryOp, Node, ParamDecl, RelOp};

/// Type tag carried by every [`MincValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MincType {
    /// Double-precision number. The only numeric type.
    Float,
    /// Immutable text.
    String,
    /// Opaque reference to an externally owned signal object.
    Handle,
    /// Ordered, resizable sequence of values.
    List,
    /// Insertion-ordered value-to-value mapping.
    Map,
    /// Instance of a registered struct type.
    Struct,
    /// Bound script function.
    Function,
    /// Uninitialized / absent.
    Void,
}

impl MincType {
    /// The zero value of this type, used when a call site passes fewer
    /// arguments than the callee declares.
    pub fn zero_value(self) -> MincValue {
        match self {
            MincType::Float => MincValue::Float(0.0),
            MincType::String => MincValue::from(""),
            MincType::List => MincValue::new_list(Vec::new()),
            MincType::Map => MincValue::new_map(),
            // Handles, structs, and functions have no meaningful default.
            MincType::Handle | MincType::Struct | MincType::Function | MincType::Void => {
                MincValue::Void
            }
        }
    }
}

impl fmt::Display for MincType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MincType::Float => "float",
            MincType::String => "string",
            MincType::Handle => "handle",
            MincType::List => "list",
            MincType::Map => "map",
            MincType::Struct => "struct",
            MincType::Function => "function",
            MincType::Void => "void",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a host-owned signal object.
///
/// The score language only threads handles through; every operation on them
/// is delegated to the host. Two handles are equal when they name the same
/// host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MincHandle(pub u64);

impl fmt::Display for MincHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle({})", self.0)
    }
}

/// Insertion-ordered value-to-value mapping.
///
/// Keys are compared with the typed equality of [`MincValue::try_eq`];
/// a key of a different type never matches. Iteration order is insertion
/// order, which keeps printing and equality deterministic.
#[derive(Debug, Default, Clone)]
pub struct MincMap {
    entries: Vec<(MincValue, MincValue)>,
}

impl MincMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &MincValue) -> Option<&MincValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.try_eq(key) == Some(true))
            .map(|(_, v)| v)
    }

    /// Inserts or replaces the value under `key`.
    pub fn insert(&mut self, key: MincValue, value: MincValue) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.try_eq(&key) == Some(true))
        {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// True when `key` is present.
    pub fn contains_key(&self, key: &MincValue) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(MincValue, MincValue)> {
        self.entries.iter()
    }
}

/// One named, typed member of a struct instance.
#[derive(Debug, Clone)]
pub struct StructMember {
    /// Member name.
    pub name: Rc<str>,
    /// Declared member type.
    pub ty: MincType,
    /// Current value.
    pub value: MincValue,
}

/// A live struct instance: the type name plus its ordered member chain.
#[derive(Debug, Clone)]
pub struct StructInstance {
    /// Name of the registered struct type this instance was built from.
    pub type_name: Rc<str>,
    /// Members in declaration order.
    pub members: Vec<StructMember>,
}

impl StructInstance {
    /// Looks up a member by name.
    pub fn member(&self, name: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| &*m.name == name)
    }

    /// Looks up a member by name for writing.
    pub fn member_mut(&mut self, name: &str) -> Option<&mut StructMember> {
        self.members.iter_mut().find(|m| &*m.name == name)
    }
}

/// A bound script function: parameter declarations plus the body subtree.
///
/// Bound at `FuncDef` evaluation; shared so that the same definition can be
/// stored in a symbol and live in active call frames simultaneously.
#[derive(Debug)]
pub struct FunctionDef {
    /// Function name (mangled for methods).
    pub name: Rc<str>,
    /// Declared parameters, in order.
    pub params: Rc<[ParamDecl]>,
    /// Function body.
    pub body: Rc<Node>,
    /// True for methods declared on a struct type; the call protocol then
    /// binds `this` in the callee scope.
    pub is_method: bool,
}

/// A tagged score-language value.
#[derive(Debug, Clone)]
pub enum MincValue {
    /// Double-precision number.
    Float(f64),
    /// Immutable text.
    String(Rc<str>),
    /// Opaque host object reference.
    Handle(MincHandle),
    /// Shared list.
    List(Rc<RefCell<Vec<MincValue>>>),
    /// Shared map.
    Map(Rc<RefCell<MincMap>>),
    /// Shared struct instance.
    Struct(Rc<RefCell<StructInstance>>),
    /// Bound script function.
    Function(Rc<FunctionDef>),
    /// Uninitialized / absent.
    Void,
}

impl From<f64> for MincValue {
    fn from(v: f64) -> Self {
        MincValue::Float(v)
    }
}

impl From<&str> for MincValue {
    fn from(s: &str) -> Self {
        MincValue::String(Rc::from(s))
    }
}

impl MincValue {
    /// Wraps a vector of values as a shared list.
    pub fn new_list(items: Vec<MincValue>) -> Self {
        MincValue::List(Rc::new(RefCell::new(items)))
    }

    /// Creates an empty shared map.
    pub fn new_map() -> Self {
        MincValue::Map(Rc::new(RefCell::new(MincMap::new())))
    }

    /// The value's type tag.
    pub fn minc_type(&self) -> MincType {
        match self {
            MincValue::Float(_) => MincType::Float,
            MincValue::String(_) => MincType::String,
            MincValue::Handle(_) => MincType::Handle,
            MincValue::List(_) => MincType::List,
            MincValue::Map(_) => MincType::Map,
            MincValue::Struct(_) => MincType::Struct,
            MincValue::Function(_) => MincType::Function,
            MincValue::Void => MincType::Void,
        }
    }

    /// Truth value used by `if`, `while`, `&&`, `||`, and `!`.
    ///
    /// Floats are true when nonzero; strings, lists, and maps when nonempty;
    /// handles, structs, and functions are always true; void is false.
    pub fn is_true(&self) -> bool {
        match self {
            MincValue::Float(v) => *v != 0.0,
            MincValue::String(s) => !s.is_empty(),
            MincValue::List(items) => !items.borrow().is_empty(),
            MincValue::Map(map) => !map.borrow().is_empty(),
            MincValue::Handle(_) | MincValue::Struct(_) | MincValue::Function(_) => true,
            MincValue::Void => false,
        }
    }

    /// Typed equality: `None` when the tags differ, otherwise whether the
    /// contents match.
    ///
    /// Lists, maps, and structs compare by content (recursively, in order);
    /// handles by host object identity; functions by definition identity.
    pub fn try_eq(&self, other: &MincValue) -> Option<bool> {
        match (self, other) {
            (MincValue::Float(a), MincValue::Float(b)) => Some(a == b),
            (MincValue::String(a), MincValue::String(b)) => Some(a == b),
            (MincValue::Handle(a), MincValue::Handle(b)) => Some(a == b),
            (MincValue::List(a), MincValue::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Some(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                Some(
                    a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| x.try_eq(y) == Some(true)),
                )
            }
            (MincValue::Map(a), MincValue::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Some(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                Some(
                    a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                            ka.try_eq(kb) == Some(true) && va.try_eq(vb) == Some(true)
                        }),
                )
            }
            (MincValue::Struct(a), MincValue::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Some(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                Some(
                    a.type_name == b.type_name
                        && a.members.len() == b.members.len()
                        && a.members
                            .iter()
                            .zip(b.members.iter())
                            .all(|(x, y)| x.value.try_eq(&y.value) == Some(true)),
                )
            }
            (MincValue::Function(a), MincValue::Function(b)) => Some(Rc::ptr_eq(a, b)),
            (MincValue::Void, MincValue::Void) => Some(true),
            _ => None,
        }
    }

    /// Identity comparison used by `index()` and `contains()` for reference
    /// types: lists by allocation, handles by host object, everything else
    /// falls back to typed equality.
    pub fn identity_eq(&self, other: &MincValue) -> bool {
        match (self, other) {
            (MincValue::List(a), MincValue::List(b)) => Rc::ptr_eq(a, b),
            (MincValue::Handle(a), MincValue::Handle(b)) => a == b,
            _ => self.try_eq(other) == Some(true),
        }
    }
}

// ---------------------------------------------------------------------------
// Operator application
// ---------------------------------------------------------------------------

/// Float-float arithmetic. `%` is integer modulo on the truncated operands.
fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                tracing::warn!("division by zero");
                0.0
            } else {
                a / b
            }
        }
        BinaryOp::Mod => {
            if b.abs() < 1.0 {
                tracing::warn!(rhs = b, "illegal RHS for modulo");
                0.0
            } else {
                ((a.trunc() as i64) % (b.trunc() as i64)) as f64
            }
        }
    }
}

/// Applies a binary operator to two non-handle values.
///
/// Misuse (unsupported operand combination) warns and yields a safe value:
/// zero for arithmetic, the empty string for string misuse, the empty list
/// for list-list misuse.
pub fn apply_binary(op: BinaryOp, lhs: &MincValue, rhs: &MincValue) -> MincValue {
    match (lhs, rhs) {
        (MincValue::Float(a), MincValue::Float(b)) => MincValue::Float(float_op(op, *a, *b)),

        // Float/string concatenation formats the float like %g.
        (MincValue::String(a), MincValue::String(b)) => {
            if op == BinaryOp::Add {
                MincValue::String(Rc::from(format!("{a}{b}").as_str()))
            } else {
                tracing::warn!(op = op.symbol(), "unsupported string operation");
                MincValue::from("")
            }
        }
        (MincValue::String(a), MincValue::Float(b)) => {
            if op == BinaryOp::Add {
                MincValue::String(Rc::from(format!("{a}{}", format_float(*b)).as_str()))
            } else {
                tracing::warn!(op = op.symbol(), "unsupported string operation");
                MincValue::from("")
            }
        }
        (MincValue::Float(a), MincValue::String(b)) => {
            if op == BinaryOp::Add {
                MincValue::String(Rc::from(format!("{}{b}", format_float(*a)).as_str()))
            } else {
                tracing::warn!(op = op.symbol(), "unsupported string operation");
                MincValue::from("")
            }
        }

        // List-list: only concatenation is defined.
        (MincValue::List(a), MincValue::List(b)) => {
            if op == BinaryOp::Add {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                MincValue::new_list(items)
            } else {
                tracing::warn!(op = op.symbol(), "unsupported list operation");
                MincValue::new_list(Vec::new())
            }
        }

        // List-float is element-wise; non-float elements pass through.
        (MincValue::List(items), MincValue::Float(b)) => {
            let mapped = items
                .borrow()
                .iter()
                .map(|item| match item {
                    MincValue::Float(a) => MincValue::Float(float_op(op, *a, *b)),
                    other => other.clone(),
                })
                .collect();
            MincValue::new_list(mapped)
        }
        (MincValue::Float(a), MincValue::List(items)) => {
            let mapped = items
                .borrow()
                .iter()
                .map(|item| match item {
                    MincValue::Float(b) => MincValue::Float(float_op(op, *a, *b)),
                    other => other.clone(),
                })
                .collect();
            MincValue::new_list(mapped)
        }

        _ => {
            tracing::warn!(
                op = op.symbol(),
                lhs = %lhs.minc_type(),
                rhs = %rhs.minc_type(),
                "operator not defined for operand types"
            );
            MincValue::Float(0.0)
        }
    }
}

/// Unary negation: floats and lists (element-wise) only.
pub fn apply_unary_minus(operand: &MincValue) -> MincValue {
    match operand {
        MincValue::Float(v) => MincValue::Float(-v),
        MincValue::List(items) => {
            let mapped = items
                .borrow()
                .iter()
                .map(|item| match item {
                    MincValue::Float(v) => MincValue::Float(-v),
                    other => other.clone(),
                })
                .collect();
            MincValue::new_list(mapped)
        }
        other => {
            tracing::warn!(operand = %other.minc_type(), "cannot negate this type");
            MincValue::Float(0.0)
        }
    }
}

/// Relational comparison yielding 1.0 or 0.0.
///
/// Equality is defined for any two same-typed values. Ordering is defined
/// only for floats and strings; everything else warns and yields 0.0, as
/// does any type mismatch.
pub fn compare(op: RelOp, lhs: &MincValue, rhs: &MincValue) -> f64 {
    let result = match op {
        RelOp::Eq | RelOp::Ne => match lhs.try_eq(rhs) {
            Some(eq) => {
                if op == RelOp::Eq {
                    eq
                } else {
                    !eq
                }
            }
            None => {
                tracing::warn!(
                    lhs = %lhs.minc_type(),
                    rhs = %rhs.minc_type(),
                    "comparing values of different types"
                );
                false
            }
        },
        RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
            let ordering = match (lhs, rhs) {
                (MincValue::Float(a), MincValue::Float(b)) => a.partial_cmp(b),
                (MincValue::String(a), MincValue::String(b)) => Some(a.cmp(b)),
                _ => {
                    tracing::warn!(
                        lhs = %lhs.minc_type(),
                        rhs = %rhs.minc_type(),
                        "ordering is only defined for floats and strings"
                    );
                    None
                }
            };
            match ordering {
                Some(Ordering::Less) => matches!(op, RelOp::Lt | RelOp::Le),
                Some(Ordering::Equal) => matches!(op, RelOp::Le | RelOp::Ge),
                Some(Ordering::Greater) => matches!(op, RelOp::Gt | RelOp::Ge),
                None => false,
            }
        }
    };
    if result { 1.0 } else { 0.0 }
}

/// Linear interpolation over adjacent float elements at fractional index
/// `pos`. Falls back to the floor element when the neighbors are not both
/// floats; `None` when the floor element is not a float either.
pub(crate) fn lerp_adjacent(items: &[MincValue], pos: f64) -> Option<f64> {
    let lo = pos.floor() as usize;
    let frac = pos - pos.floor();
    let MincValue::Float(a) = items.get(lo)? else {
        return None;
    };
    if frac == 0.0 || lo + 1 >= items.len() {
        return Some(*a);
    }
    match items.get(lo + 1) {
        Some(MincValue::Float(b)) => Some(a + (b - a) * frac),
        _ => Some(*a),
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Formats a float the way C's `%g` does: up to six significant digits,
/// trailing zeros trimmed, scientific notation for extreme magnitudes.
pub fn format_float(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return format!("{v}");
    }
    let exp = v.abs().log10().floor() as i32;
    if (-4..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}"))
    } else {
        let formatted = format!("{v:.5e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{exponent}", trim_zeros(mantissa)),
            None => formatted,
        }
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

impl MincValue {
    /// Formats the value for `print`, `%z`, and `%l`.
    ///
    /// Strings are quoted; lists longer than `list_limit` elements are
    /// truncated with an ellipsis (`0` disables the limit).
    pub fn format(&self, list_limit: usize) -> String {
        match self {
            MincValue::Float(v) => format_float(*v),
            MincValue::String(s) => format!("\"{s}\""),
            MincValue::Handle(h) => h.to_string(),
            MincValue::List(items) => {
                let items = items.borrow();
                let shown = if list_limit > 0 && items.len() > list_limit {
                    list_limit
                } else {
                    items.len()
                };
                let mut parts: Vec<String> =
                    items[..shown].iter().map(|v| v.format(list_limit)).collect();
                if shown < items.len() {
                    parts.push("...".to_string());
                }
                format!("[{}]", parts.join(", "))
            }
            MincValue::Map(map) => {
                let map = map.borrow();
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.format(list_limit), v.format(list_limit)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            MincValue::Struct(instance) => {
                let instance = instance.borrow();
                let parts: Vec<String> = instance
                    .members
                    .iter()
                    .map(|m| format!("{}: {}", m.name, m.value.format(list_limit)))
                    .collect();
                format!("{} {{{}}}", instance.type_name, parts.join(", "))
            }
            MincValue::Function(def) => format!("function {}", def.name),
            MincValue::Void => "void".to_string(),
        }
    }
}
