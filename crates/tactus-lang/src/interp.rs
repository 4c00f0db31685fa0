//! The tree-walking interpreter.
//!
//! [`Interpreter`] owns the symbol table plus the evaluator's implicit
//! context stacks: the argument-list stack shared by list literals and calls
//! (capped at [`InterpSettings::max_stack`]), the `this` stack filled by
//! method lookups and consumed by the next call, and the called-function
//! name stack used for diagnostics. All of them are fields, not globals, so
//! several interpreters can coexist.
//!
//! `return` is a nonlocal transfer: evaluation threads a [`Flow`] through
//! every `eval` result, and `Call` is the only place that catches
//! `Flow::Return`. Fatal errors unwind the same channel, restoring the
//! caller's scope depth on the way out.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{BinaryOp, MemberDecl, Node, NodeKind};
use crate::builtins;
use crate::dispatch::{DispatchError, ExternalDispatch};
use crate::error::MincError;
use crate::symbol::{LookupMode, SymbolId, SymbolTable, mangled_method_name};
use crate::value::{
    self, FunctionDef, MincType, MincValue, StructInstance, lerp_adjacent,
};

/// Knobs consulted during evaluation. The embedding engine maps its option
/// store onto this.
#[derive(Debug, Clone)]
pub struct InterpSettings {
    /// Cap on nested list literals plus active calls.
    pub max_stack: usize,
    /// When a store would change a symbol's type: `true` warns and
    /// overwrites, `false` is fatal.
    pub allow_type_overwrite: bool,
    /// Warn when a call site passes fewer arguments than declared.
    pub warn_defaulted_args: bool,
    /// Embedded hosts tolerate function redeclaration (warn instead of die).
    pub embedded: bool,
    /// Print gate for the `print`/`printf` builtins; 0 silences them.
    pub print_level: u32,
    /// Lists longer than this print with an ellipsis; 0 disables.
    pub print_list_limit: usize,
}

impl Default for InterpSettings {
    fn default() -> Self {
        Self {
            max_stack: 64,
            allow_type_overwrite: true,
            warn_defaulted_args: true,
            embedded: false,
            print_level: 1,
            print_list_limit: 16,
        }
    }
}

/// Nonlocal control transfer threaded through every evaluation result.
pub(crate) enum Flow {
    /// A `return` unwinding to the nearest enclosing call.
    Return(MincValue),
    /// A fatal diagnostic aborting the score pass.
    Fatal(MincError),
}

impl From<MincError> for Flow {
    fn from(err: MincError) -> Self {
        Flow::Fatal(err)
    }
}

pub(crate) type Exec<T> = Result<T, Flow>;

/// The score-language evaluator.
pub struct Interpreter {
    pub(crate) symbols: SymbolTable,
    pub(crate) settings: InterpSettings,
    /// Stack of in-flight argument/element lists.
    list_stack: Vec<Vec<MincValue>>,
    /// Receivers deposited by method lookups, consumed by `Call`.
    this_stack: Vec<Rc<RefCell<StructInstance>>>,
    /// Names of active calls, innermost last.
    call_names: Vec<Rc<str>>,
    /// Current source position for diagnostics.
    line: u32,
    file: Option<Rc<str>>,
    /// Sink for `print`/`printf` output.
    pub(crate) output: Box<dyn Write>,
}

impl Interpreter {
    /// Creates an interpreter with default settings, printing to stdout.
    pub fn new() -> Self {
        Self::with_settings(InterpSettings::default())
    }

    /// Creates an interpreter with explicit settings.
    pub fn with_settings(settings: InterpSettings) -> Self {
        Self {
            symbols: SymbolTable::new(),
            settings,
            list_stack: Vec::new(),
            this_stack: Vec::new(),
            call_names: Vec::new(),
            line: 0,
            file: None,
            output: Box::new(io::stdout()),
        }
    }

    /// Redirects builtin print output (tests use this to capture it).
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Mutable access to the evaluation settings.
    pub fn settings_mut(&mut self) -> &mut InterpSettings {
        &mut self.settings
    }

    /// The current scope depth. Stable across completed calls.
    pub fn current_scope(&self) -> usize {
        self.symbols.current_scope()
    }

    /// Reads a global symbol's value, if declared. Intended for hosts and
    /// tests inspecting score state between evaluations.
    pub fn global(&self, name: &str) -> Option<MincValue> {
        self.symbols
            .lookup(name, LookupMode::GlobalLevel)
            .map(|id| self.symbols.symbol(id).value.clone())
    }

    /// Evaluates a root node. This is the core's single entry point: the
    /// parser builds the tree, the host supplies external dispatch.
    ///
    /// A stray top-level `return` finishes the pass with its value.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`MincError`] that aborted the pass. Transient
    /// evaluator state is cleared so the interpreter stays usable; global
    /// symbols keep whatever the pass stored before failing.
    pub fn run(
        &mut self,
        root: &Node,
        host: &mut dyn ExternalDispatch,
    ) -> Result<MincValue, MincError> {
        let result = match self.eval(root, host) {
            Ok(v) => Ok(v),
            Err(Flow::Return(v)) => Ok(v),
            Err(Flow::Fatal(err)) => Err(err),
        };
        if result.is_err() {
            self.symbols.restore_scope(0);
        }
        self.list_stack.clear();
        self.this_stack.clear();
        self.call_names.clear();
        result
    }

    /// Logs a fatal diagnostic at the current score position and produces
    /// the unwinding flow value.
    fn die(&self, err: MincError) -> Flow {
        match (&self.file, self.call_names.last()) {
            (Some(file), Some(call)) => {
                tracing::error!(file = %file, line = self.line, call = %call, "{err}");
            }
            (Some(file), None) => tracing::error!(file = %file, line = self.line, "{err}"),
            (None, Some(call)) => tracing::error!(line = self.line, call = %call, "{err}"),
            (None, None) => tracing::error!(line = self.line, "{err}"),
        }
        Flow::Fatal(err)
    }

    fn push_list_frame(&mut self) -> Exec<usize> {
        if self.list_stack.len() >= self.settings.max_stack {
            return Err(self.die(MincError::StackOverflow(self.settings.max_stack)));
        }
        self.list_stack.push(Vec::new());
        Ok(self.list_stack.len() - 1)
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    pub(crate) fn eval(&mut self, node: &Node, host: &mut dyn ExternalDispatch) -> Exec<MincValue> {
        if node.line != 0 {
            self.line = node.line;
        }
        if node.file.is_some() {
            self.file.clone_from(&node.file);
        }

        match &node.kind {
            NodeKind::ConstF(v) => Ok(MincValue::Float(*v)),
            NodeKind::Str(s) => Ok(MincValue::String(Rc::clone(s))),

            NodeKind::LoadSym(name) => match self.symbols.lookup(name, LookupMode::AnyLevel) {
                Some(id) => Ok(self.symbols.symbol(id).value.clone()),
                None => Err(self.die(MincError::UndefinedSymbol(name.clone()))),
            },

            NodeKind::AutoDeclLoadSym(name) => {
                let inside = self.symbols.inside_function();
                let id = self.symbols.lookup_or_autodeclare(name, inside);
                Ok(self.symbols.symbol(id).value.clone())
            }

            NodeKind::LoadFuncSym(name) => match self.symbols.lookup(name, LookupMode::AnyLevel) {
                Some(id) => Ok(self.symbols.symbol(id).value.clone()),
                // Unknown names stay callable: the bare name is kept so the
                // builtin and external tables can resolve it at call time.
                None => Ok(MincValue::from(name.as_str())),
            },

            NodeKind::ListLit(items) => {
                let frame = self.push_list_frame()?;
                for item in items {
                    let v = self.eval(item, host)?;
                    self.list_stack[frame].push(v);
                }
                let items = self.list_stack.pop().expect("frame pushed above");
                Ok(MincValue::new_list(items))
            }

            NodeKind::SubscriptRead { obj, index } => {
                let obj = self.eval(obj, host)?;
                let index = self.eval(index, host)?;
                self.subscript_read(&obj, &index)
            }

            NodeKind::SubscriptWrite { obj, index, value } => {
                let rhs = self.eval(value, host)?;
                let index = self.eval(index, host)?;
                let target = self.subscript_target(obj, host)?;
                self.subscript_write(&target, &index, rhs.clone())?;
                Ok(rhs)
            }

            NodeKind::Member { obj, name } => {
                let obj = self.eval(obj, host)?;
                self.member_read(&obj, name)
            }

            NodeKind::Store { lhs, rhs } => {
                let rhs = self.eval(rhs, host)?;
                self.store(lhs, rhs.clone(), host)?;
                Ok(rhs)
            }

            NodeKind::OpAssign { lhs, rhs, op } => {
                let rhs = self.eval(rhs, host)?;
                self.op_assign(lhs, *op, &rhs)
            }

            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, host)?;
                let rhs = self.eval(rhs, host)?;
                Ok(self.binary(*op, &lhs, &rhs, host))
            }

            NodeKind::UnaryMinus(operand) => {
                let operand = self.eval(operand, host)?;
                Ok(value::apply_unary_minus(&operand))
            }

            NodeKind::And(lhs, rhs) => {
                let lhs = self.eval(lhs, host)?;
                if !lhs.is_true() {
                    return Ok(MincValue::Float(0.0));
                }
                let rhs = self.eval(rhs, host)?;
                Ok(MincValue::Float(if rhs.is_true() { 1.0 } else { 0.0 }))
            }

            NodeKind::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, host)?;
                if lhs.is_true() {
                    return Ok(MincValue::Float(1.0));
                }
                let rhs = self.eval(rhs, host)?;
                Ok(MincValue::Float(if rhs.is_true() { 1.0 } else { 0.0 }))
            }

            NodeKind::Not(operand) => {
                let operand = self.eval(operand, host)?;
                Ok(MincValue::Float(if operand.is_true() { 0.0 } else { 1.0 }))
            }

            NodeKind::Relation { op, lhs, rhs } => {
                let lhs = self.eval(lhs, host)?;
                let rhs = self.eval(rhs, host)?;
                Ok(MincValue::Float(value::compare(*op, &lhs, &rhs)))
            }

            NodeKind::If { cond, then } => {
                if self.eval(cond, host)?.is_true() {
                    self.eval(then, host)?;
                }
                Ok(MincValue::Void)
            }

            NodeKind::IfElse { cond, then, other } => {
                if self.eval(cond, host)?.is_true() {
                    self.eval(then, host)?;
                } else {
                    self.eval(other, host)?;
                }
                Ok(MincValue::Void)
            }

            NodeKind::While { cond, body } => {
                while self.eval(cond, host)?.is_true() {
                    self.eval(body, host)?;
                }
                Ok(MincValue::Void)
            }

            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.eval(init, host)?;
                while self.eval(cond, host)?.is_true() {
                    self.eval(body, host)?;
                    self.eval(step, host)?;
                }
                Ok(MincValue::Void)
            }

            NodeKind::Block(body) => {
                self.symbols.push_scope();
                let result = self.eval(body, host);
                self.symbols.pop_scope();
                result
            }

            NodeKind::Seq(first, second) => {
                self.eval(first, host)?;
                self.eval(second, host)
            }

            NodeKind::FuncBodySeq { body, ret } => {
                self.eval(body, host)?;
                self.eval(ret, host)
            }

            NodeKind::Ret(expr) => {
                let v = self.eval(expr, host)?;
                Err(Flow::Return(v))
            }

            NodeKind::FuncDecl(name) => {
                self.declare_function(name)?;
                Ok(MincValue::Void)
            }

            NodeKind::MethodDecl { type_name, name } => {
                self.declare_function(&mangled_method_name(type_name, name))?;
                Ok(MincValue::Void)
            }

            NodeKind::FuncDef {
                decl,
                params,
                body,
                is_method,
            } => {
                let (symbol_name, display_name) = match &decl.kind {
                    NodeKind::FuncDecl(name) => (name.clone(), name.clone()),
                    NodeKind::MethodDecl { type_name, name } => (
                        mangled_method_name(type_name, name),
                        format!("{type_name}.{name}"),
                    ),
                    other => {
                        return Err(self.die(MincError::param(format!(
                            "malformed function definition: {other:?}"
                        ))));
                    }
                };
                let id = self.declare_function(&symbol_name)?;
                let def = FunctionDef {
                    name: Rc::from(display_name.as_str()),
                    params: Rc::clone(params),
                    body: Rc::clone(body),
                    is_method: *is_method,
                };
                self.symbols.symbol_mut(id).value = MincValue::Function(Rc::new(def));
                Ok(MincValue::Void)
            }

            NodeKind::Call { target, args } => {
                let target = self.eval(target, host)?;
                let frame = self.push_list_frame()?;
                for arg in args {
                    let v = self.eval(arg, host)?;
                    self.list_stack[frame].push(v);
                }
                let args = self.list_stack.pop().expect("frame pushed above");
                self.call(target, args, host)
            }

            NodeKind::StructDef { name, members } => {
                self.define_struct_type(name, members)?;
                Ok(MincValue::Void)
            }

            NodeKind::StructDecl {
                type_name,
                var_name,
                inits,
            } => {
                let inits = match inits {
                    Some(exprs) => {
                        let mut values = Vec::with_capacity(exprs.len());
                        for expr in exprs {
                            values.push(self.eval(expr, host)?);
                        }
                        Some(values)
                    }
                    None => None,
                };
                self.declare_struct(type_name, var_name, inits)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &MincValue,
        rhs: &MincValue,
        host: &mut dyn ExternalDispatch,
    ) -> MincValue {
        let delegated = matches!(
            (lhs, rhs),
            (MincValue::Handle(_), MincValue::Handle(_) | MincValue::Float(_))
                | (MincValue::Float(_), MincValue::Handle(_))
        );
        if delegated {
            return match host.handle_op(op, lhs, rhs) {
                Ok(v) => v,
                Err(DispatchError::NotFound) => {
                    tracing::warn!(op = op.symbol(), "host provides no handle operator");
                    MincValue::Void
                }
                Err(DispatchError::Failed(message)) => {
                    tracing::warn!(op = op.symbol(), %message, "handle operator failed");
                    MincValue::Void
                }
            };
        }
        value::apply_binary(op, lhs, rhs)
    }

    // -----------------------------------------------------------------------
    // Stores
    // -----------------------------------------------------------------------

    /// Writes `rhs` into the target named by `lhs` (symbol or struct
    /// member), applying the type-overwrite gate.
    fn store(&mut self, lhs: &Node, rhs: MincValue, host: &mut dyn ExternalDispatch) -> Exec<()> {
        match &lhs.kind {
            NodeKind::LoadSym(name) | NodeKind::AutoDeclLoadSym(name) => {
                let inside = self.symbols.inside_function();
                let id = self.symbols.lookup_or_autodeclare(name, inside);
                self.store_symbol(id, rhs)
            }
            NodeKind::Member { obj, name } => {
                let obj = self.eval(obj, host)?;
                let MincValue::Struct(instance) = &obj else {
                    return Err(self.die(MincError::NotAStruct(obj.minc_type())));
                };
                let mut borrowed = instance.borrow_mut();
                let type_name = Rc::clone(&borrowed.type_name);
                let Some(member) = borrowed.member_mut(name) else {
                    return Err(self.die(MincError::NoSuchMember {
                        type_name: type_name.to_string(),
                        member: name.clone(),
                    }));
                };
                let assigned = rhs.minc_type();
                if member.ty != MincType::Void && member.ty != assigned {
                    if self.settings.allow_type_overwrite {
                        tracing::warn!(
                            member = %member.name,
                            declared = %member.ty,
                            assigned = %assigned,
                            "overwriting struct member type"
                        );
                    } else {
                        let err = MincError::TypeClash {
                            name: member.name.to_string(),
                            declared: member.ty,
                            assigned,
                        };
                        drop(borrowed);
                        return Err(self.die(err));
                    }
                }
                member.ty = assigned;
                member.value = rhs;
                Ok(())
            }
            _ => Err(self.die(MincError::param("assignment target is not assignable"))),
        }
    }

    fn store_symbol(&mut self, id: SymbolId, rhs: MincValue) -> Exec<()> {
        let assigned = rhs.minc_type();
        let symbol = self.symbols.symbol(id);
        if symbol.ty != MincType::Void && symbol.ty != assigned {
            if self.settings.allow_type_overwrite {
                tracing::warn!(
                    symbol = %symbol.name,
                    declared = %symbol.ty,
                    assigned = %assigned,
                    "overwriting symbol type"
                );
            } else {
                let err = MincError::TypeClash {
                    name: symbol.name.to_string(),
                    declared: symbol.ty,
                    assigned,
                };
                return Err(self.die(err));
            }
        }
        let symbol = self.symbols.symbol_mut(id);
        symbol.ty = assigned;
        symbol.value = rhs;
        Ok(())
    }

    fn op_assign(&mut self, lhs: &Node, op: BinaryOp, rhs: &MincValue) -> Exec<MincValue> {
        let name = match &lhs.kind {
            NodeKind::LoadSym(name) | NodeKind::AutoDeclLoadSym(name) => name.clone(),
            _ => return Err(self.die(MincError::param("assignment target is not assignable"))),
        };
        let Some(id) = self.symbols.lookup(&name, LookupMode::AnyLevel) else {
            return Err(self.die(MincError::UndefinedSymbol(name)));
        };
        let current = self.symbols.symbol(id).value.clone();
        match (&current, rhs) {
            (MincValue::Float(_), MincValue::Float(_)) => {
                let updated = value::apply_binary(op, &current, rhs);
                self.symbols.symbol_mut(id).value = updated.clone();
                Ok(updated)
            }
            _ => {
                tracing::warn!(
                    symbol = %name,
                    op = op.symbol(),
                    "compound assignment requires floats; value unchanged"
                );
                Ok(current)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subscripts
    // -----------------------------------------------------------------------

    fn subscript_read(&mut self, obj: &MincValue, index: &MincValue) -> Exec<MincValue> {
        match obj {
            MincValue::List(items) => {
                let MincValue::Float(raw) = index else {
                    return Err(self.die(MincError::param("list index must be a number")));
                };
                let items = items.borrow();
                if items.is_empty() {
                    tracing::warn!("subscript read from empty list");
                    return Ok(MincValue::Void);
                }
                let pos = self.effective_index(*raw, items.len());
                if pos.fract() != 0.0
                    && let Some(v) = lerp_adjacent(&items, pos)
                {
                    return Ok(MincValue::Float(v));
                }
                Ok(items[pos.trunc() as usize].clone())
            }
            MincValue::Map(map) => match map.borrow().get(index) {
                Some(v) => Ok(v.clone()),
                None => Err(self.die(MincError::MapKeyMissing(
                    index.format(self.settings.print_list_limit),
                ))),
            },
            MincValue::String(s) => {
                let MincValue::Float(raw) = index else {
                    return Err(self.die(MincError::param("string index must be a number")));
                };
                let bytes = s.as_bytes();
                if bytes.is_empty() {
                    tracing::warn!("subscript read from empty string");
                    return Ok(MincValue::from(""));
                }
                let pos = self.effective_index(*raw, bytes.len()).trunc() as usize;
                let ch = String::from_utf8_lossy(&bytes[pos..=pos]).into_owned();
                Ok(MincValue::String(Rc::from(ch.as_str())))
            }
            other => Err(self.die(MincError::BadSubscript(other.minc_type()))),
        }
    }

    /// Maps a raw index into `0..len`, honoring `-1` as the last element
    /// and clamping out-of-range positions with a warning. Preserves the
    /// fraction for interpolated list reads.
    fn effective_index(&self, raw: f64, len: usize) -> f64 {
        let len = len as f64;
        let pos = if raw < 0.0 {
            if raw < -1.0 {
                tracing::warn!(index = raw, "negative index before list start");
            }
            len + raw
        } else {
            raw
        };
        if pos < 0.0 {
            0.0
        } else if pos > len - 1.0 {
            if raw >= 0.0 {
                tracing::warn!(index = raw, len, "index past end; clamping");
            }
            len - 1.0
        } else {
            pos
        }
    }

    /// Resolves the container a subscript write lands in. A void symbol is
    /// promoted to a fresh map, so `m["k"] = v` works on first touch.
    fn subscript_target(&mut self, obj: &Node, host: &mut dyn ExternalDispatch) -> Exec<MincValue> {
        if let NodeKind::LoadSym(name) | NodeKind::AutoDeclLoadSym(name) = &obj.kind {
            let inside = self.symbols.inside_function();
            let id = self.symbols.lookup_or_autodeclare(name, inside);
            if matches!(self.symbols.symbol(id).value, MincValue::Void) {
                let map = MincValue::new_map();
                let symbol = self.symbols.symbol_mut(id);
                symbol.ty = MincType::Map;
                symbol.value = map.clone();
                return Ok(map);
            }
            return Ok(self.symbols.symbol(id).value.clone());
        }
        self.eval(obj, host)
    }

    fn subscript_write(
        &mut self,
        target: &MincValue,
        index: &MincValue,
        rhs: MincValue,
    ) -> Exec<()> {
        match target {
            MincValue::List(items) => {
                let MincValue::Float(raw) = index else {
                    return Err(self.die(MincError::param("list index must be a number")));
                };
                let mut raw = *raw;
                if raw.fract() != 0.0 {
                    tracing::warn!(index = raw, "truncating fractional list index");
                    raw = raw.trunc();
                }
                let mut items = items.borrow_mut();
                let pos = if raw < 0.0 {
                    let mapped = items.len() as f64 + raw;
                    if mapped < 0.0 {
                        tracing::warn!(index = raw, "negative index before list start");
                        0
                    } else {
                        mapped as usize
                    }
                } else {
                    raw as usize
                };
                if pos >= items.len() {
                    // Writes beyond the end grow the list; new slots default
                    // to zero when a float is being stored, void otherwise.
                    let pad = if matches!(rhs, MincValue::Float(_)) {
                        MincValue::Float(0.0)
                    } else {
                        MincValue::Void
                    };
                    items.resize(pos + 1, pad);
                }
                items[pos] = rhs;
                Ok(())
            }
            MincValue::Map(map) => {
                map.borrow_mut().insert(index.clone(), rhs);
                Ok(())
            }
            other => Err(self.die(MincError::BadSubscript(other.minc_type()))),
        }
    }

    // -----------------------------------------------------------------------
    // Members and methods
    // -----------------------------------------------------------------------

    fn member_read(&mut self, obj: &MincValue, name: &str) -> Exec<MincValue> {
        let MincValue::Struct(instance) = obj else {
            return Err(self.die(MincError::NotAStruct(obj.minc_type())));
        };
        if let Some(member) = instance.borrow().member(name) {
            return Ok(member.value.clone());
        }
        // No data member: try a method declared on the type. On a hit the
        // receiver is deposited for the call that consumes this value.
        let type_name = Rc::clone(&instance.borrow().type_name);
        let mangled = mangled_method_name(&type_name, name);
        if let Some(id) = self.symbols.lookup(&mangled, LookupMode::GlobalLevel)
            && let MincValue::Function(def) = &self.symbols.symbol(id).value
        {
            let def = Rc::clone(def);
            self.this_stack.push(Rc::clone(instance));
            return Ok(MincValue::Function(def));
        }
        Err(self.die(MincError::NoSuchMember {
            type_name: type_name.to_string(),
            member: name.to_string(),
        }))
    }

    // -----------------------------------------------------------------------
    // Functions and calls
    // -----------------------------------------------------------------------

    /// Installs a global function symbol, or reuses it under embedded-mode
    /// redeclaration.
    fn declare_function(&mut self, name: &str) -> Exec<SymbolId> {
        if let Some(id) = self.symbols.lookup(name, LookupMode::GlobalLevel) {
            if self.symbols.symbol(id).ty == MincType::Function {
                if self.settings.embedded {
                    tracing::warn!(function = name, "function redeclared; replacing");
                    return Ok(id);
                }
                return Err(self.die(MincError::FunctionRedeclared(name.to_string())));
            }
        }
        Ok(self
            .symbols
            .install(name, MincType::Function, MincValue::Void, true))
    }

    fn call(
        &mut self,
        target: MincValue,
        args: Vec<MincValue>,
        host: &mut dyn ExternalDispatch,
    ) -> Exec<MincValue> {
        match target {
            MincValue::Function(def) => self.call_script_function(&def, args, host),
            MincValue::String(name) => {
                if let Some(result) = builtins::call_builtin_function(self, &name, &args) {
                    return result.map_err(|err| self.die(err));
                }
                match host.call_function(&name, &args) {
                    Ok(v) => Ok(v),
                    Err(DispatchError::NotFound) => {
                        Err(self.die(MincError::UndefinedFunction(name.to_string())))
                    }
                    Err(DispatchError::Failed(message)) => Err(self.die(MincError::External {
                        name: name.to_string(),
                        message,
                    })),
                }
            }
            other => Err(self.die(MincError::param(format!(
                "call target is {}, not a function",
                other.minc_type()
            )))),
        }
    }

    /// The call protocol: function-stack bracket, fresh scope, `this`
    /// binding for methods, argument materialization, body execution with
    /// `Return` caught here, scope restoration on every exit path.
    fn call_script_function(
        &mut self,
        def: &FunctionDef,
        args: Vec<MincValue>,
        host: &mut dyn ExternalDispatch,
    ) -> Exec<MincValue> {
        if args.len() > def.params.len() {
            return Err(self.die(MincError::TooManyArgs {
                func: def.name.to_string(),
                declared: def.params.len(),
                passed: args.len(),
            }));
        }
        if self.call_names.len() >= self.settings.max_stack {
            return Err(self.die(MincError::StackOverflow(self.settings.max_stack)));
        }

        let saved_scope = self.symbols.current_scope();
        let saved_line = self.line;
        let saved_file = self.file.clone();
        self.symbols.push_function_stack();
        self.symbols.push_scope();
        self.call_names.push(Rc::clone(&def.name));

        if def.is_method {
            match self.this_stack.pop() {
                Some(receiver) => {
                    self.symbols.install(
                        "this",
                        MincType::Struct,
                        MincValue::Struct(receiver),
                        false,
                    );
                }
                None => {
                    let err = MincError::param(format!(
                        "method '{}' called without a receiver",
                        def.name
                    ));
                    self.unwind_call(saved_scope);
                    return Err(self.die(err));
                }
            }
        }

        let mut args = args.into_iter();
        for param in def.params.iter() {
            let value = match args.next() {
                Some(v) => v,
                None => {
                    if self.settings.warn_defaulted_args {
                        tracing::warn!(
                            function = %def.name,
                            param = %param.name,
                            "argument defaulted to zero"
                        );
                    }
                    param.ty.zero_value()
                }
            };
            let ty = if matches!(value, MincValue::Void) {
                param.ty
            } else {
                value.minc_type()
            };
            self.symbols.install(&param.name, ty, value, false);
        }

        let result = match self.eval(&def.body, host) {
            Ok(_) => Ok(MincValue::Void),
            Err(Flow::Return(v)) => Ok(v),
            Err(fatal) => Err(fatal),
        };

        self.unwind_call(saved_scope);
        self.line = saved_line;
        self.file = saved_file;
        result
    }

    fn unwind_call(&mut self, saved_scope: usize) {
        self.symbols.restore_scope(saved_scope);
        self.symbols.pop_function_stack();
        self.call_names.pop();
    }

    // -----------------------------------------------------------------------
    // Structs
    // -----------------------------------------------------------------------

    fn define_struct_type(&mut self, name: &str, members: &[MemberDecl]) -> Exec<()> {
        if self.symbols.current_scope() != 0 {
            return Err(self.die(MincError::StructTypeNotGlobal(name.to_string())));
        }
        self.symbols
            .install_struct_type(name, members.to_vec())
            .map_err(|err| self.die(err))?;
        Ok(())
    }

    fn declare_struct(
        &mut self,
        type_name: &str,
        var_name: &str,
        inits: Option<Vec<MincValue>>,
    ) -> Exec<MincValue> {
        let Some(ty) = self.symbols.lookup_struct_type(type_name) else {
            return Err(self.die(MincError::UnknownStructType(type_name.to_string())));
        };
        let mut instance = ty.instantiate();

        if let Some(inits) = inits {
            if inits.len() > instance.members.len() {
                return Err(self.die(MincError::TooManyInitializers {
                    type_name: type_name.to_string(),
                    members: instance.members.len(),
                    given: inits.len(),
                }));
            }
            for (index, init) in inits.into_iter().enumerate() {
                let member = &mut instance.members[index];
                if member.ty != MincType::Void && member.ty != init.minc_type() {
                    let err = MincError::InitializerType {
                        type_name: type_name.to_string(),
                        index,
                        expected: member.ty,
                        found: init.minc_type(),
                    };
                    return Err(self.die(err));
                }
                member.value = init;
            }
        }

        let value = MincValue::Struct(Rc::new(RefCell::new(instance)));
        self.symbols
            .install(var_name, MincType::Struct, value.clone(), false);
        Ok(value)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
