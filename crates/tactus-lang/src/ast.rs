//! Typed AST consumed by the interpreter.
//!
//! The parser is an external collaborator: it produces [`Node`] trees through
//! the constructors here and hands the root to
//! [`Interpreter::run`](crate::Interpreter::run). Each node carries its source
//! line and include-file name so diagnostics can point at score positions.
//!
//! Two flattenings relative to the classic node set: list elements and
//! argument declarations are plain vectors ([`Node`]s and [`ParamDecl`]s)
//! rather than wrapper nodes, since the wrappers carry no behavior of their
//! own.

use std::rc::Rc;

use crate::value::MincType;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` — also string and list concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%` — integer modulo on truncated operands.
    Mod,
}

impl BinaryOp {
    /// Operator spelling, for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// Relational operators. Results are float 1.0 / 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// One declared parameter of a script function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name, declared in the callee scope.
    pub name: String,
    /// Declared type; also the type of the zero default when the caller
    /// passes fewer arguments.
    pub ty: MincType,
}

impl ParamDecl {
    /// Declares a parameter.
    pub fn new(name: impl Into<String>, ty: MincType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One declared member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecl {
    /// Member name.
    pub name: String,
    /// Declared type.
    pub ty: MincType,
    /// For members of struct type, the struct type's name.
    pub subtype: Option<String>,
}

impl MemberDecl {
    /// Declares a member.
    pub fn new(name: impl Into<String>, ty: MincType) -> Self {
        Self {
            name: name.into(),
            ty,
            subtype: None,
        }
    }
}

/// The node kinds the interpreter executes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Float literal.
    ConstF(f64),
    /// String literal.
    Str(Rc<str>),
    /// Loads (copies) a symbol's value; undefined symbols are fatal.
    LoadSym(String),
    /// Loads a symbol, declaring it in the current scope if absent.
    AutoDeclLoadSym(String),
    /// Resolves a function symbol; if absent, yields the bare name as a
    /// string so builtins and externals can still be dispatched at call time.
    LoadFuncSym(String),
    /// List literal.
    ListLit(Vec<Node>),
    /// `obj[index]`.
    SubscriptRead {
        /// Subscripted value.
        obj: Box<Node>,
        /// Index expression.
        index: Box<Node>,
    },
    /// `obj[index] = value`.
    SubscriptWrite {
        /// Subscripted value.
        obj: Box<Node>,
        /// Index expression.
        index: Box<Node>,
        /// Value to store.
        value: Box<Node>,
    },
    /// `obj.name` — member read, falling back to method lookup.
    Member {
        /// The struct expression.
        obj: Box<Node>,
        /// Member or method name.
        name: String,
    },
    /// `lhs = rhs`. The rhs is evaluated first.
    Store {
        /// Assignment target (symbol or member access).
        lhs: Box<Node>,
        /// Value expression.
        rhs: Box<Node>,
    },
    /// `lhs op= rhs` (also `++`/`--`, built as `+= 1` / `-= 1`).
    /// Defined only between two floats.
    OpAssign {
        /// Assignment target.
        lhs: Box<Node>,
        /// Operand expression.
        rhs: Box<Node>,
        /// The compound operator.
        op: BinaryOp,
    },
    /// Binary arithmetic.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Node>,
        /// Right operand.
        rhs: Box<Node>,
    },
    /// Unary negation.
    UnaryMinus(Box<Node>),
    /// Short-circuit `&&`, yielding 1.0 / 0.0.
    And(Box<Node>, Box<Node>),
    /// Short-circuit `||`, yielding 1.0 / 0.0.
    Or(Box<Node>, Box<Node>),
    /// `!`, yielding 1.0 / 0.0.
    Not(Box<Node>),
    /// Relational comparison.
    Relation {
        /// Operator.
        op: RelOp,
        /// Left operand.
        lhs: Box<Node>,
        /// Right operand.
        rhs: Box<Node>,
    },
    /// `if (cond) body`.
    If {
        /// Condition.
        cond: Box<Node>,
        /// Taken when the condition is true.
        then: Box<Node>,
    },
    /// `if (cond) body else other`.
    IfElse {
        /// Condition.
        cond: Box<Node>,
        /// Taken when the condition is true.
        then: Box<Node>,
        /// Taken when the condition is false.
        other: Box<Node>,
    },
    /// `while (cond) body`.
    While {
        /// Condition, re-evaluated each iteration.
        cond: Box<Node>,
        /// Loop body.
        body: Box<Node>,
    },
    /// `for (init; cond; step) body`.
    For {
        /// Initialization, run once.
        init: Box<Node>,
        /// Condition, re-evaluated each iteration.
        cond: Box<Node>,
        /// Step, run after each iteration.
        step: Box<Node>,
        /// Loop body.
        body: Box<Node>,
    },
    /// `{ ... }` — runs its child in a fresh scope.
    Block(Box<Node>),
    /// Two children evaluated in order; the second's value wins.
    Seq(Box<Node>, Box<Node>),
    /// Function body followed by its return statement.
    FuncBodySeq {
        /// Body statements.
        body: Box<Node>,
        /// Trailing return.
        ret: Box<Node>,
    },
    /// Declares a global function symbol. Redeclaration is fatal
    /// (a warning in embedded mode).
    FuncDecl(String),
    /// Declares a method symbol under the type's mangled name.
    MethodDecl {
        /// Struct type the method belongs to.
        type_name: String,
        /// Method name.
        name: String,
    },
    /// Binds a function value (parameters + body) onto its declared symbol.
    FuncDef {
        /// The `FuncDecl` / `MethodDecl` child.
        decl: Box<Node>,
        /// Declared parameters; executed as the callee prologue.
        params: Rc<[ParamDecl]>,
        /// Function body (shared with the bound function value).
        body: Rc<Node>,
        /// True for methods; the call protocol then binds `this`.
        is_method: bool,
    },
    /// `return expr` — transfers control out of the current call.
    Ret(Box<Node>),
    /// Call: script function, builtin, or host external.
    Call {
        /// Call target (usually `LoadFuncSym`).
        target: Box<Node>,
        /// Argument expressions.
        args: Vec<Node>,
    },
    /// Registers a struct type (global scope only).
    StructDef {
        /// Type name.
        name: String,
        /// Ordered member declarations.
        members: Vec<MemberDecl>,
    },
    /// Instantiates a struct type into a variable, with optional
    /// element-wise initializers.
    StructDecl {
        /// The struct type to instantiate.
        type_name: String,
        /// Variable to declare.
        var_name: String,
        /// Initializer expressions, one per leading member.
        inits: Option<Vec<Node>>,
    },
}

/// An AST node: a kind plus its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// What to execute.
    pub kind: NodeKind,
    /// Source line, for diagnostics.
    pub line: u32,
    /// Include-file name, when the node came from an included score.
    pub file: Option<Rc<str>>,
}

impl Node {
    /// Wraps a kind with no source position.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            line: 0,
            file: None,
        }
    }

    /// Sets the source line.
    pub fn at(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Sets the include-file name.
    pub fn in_file(mut self, file: impl Into<Rc<str>>) -> Self {
        self.file = Some(file.into());
        self
    }

    // --- Convenience constructors (the builder surface) ---

    /// Float literal.
    pub fn float(v: f64) -> Self {
        Self::new(NodeKind::ConstF(v))
    }

    /// String literal.
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::new(NodeKind::Str(s.into()))
    }

    /// Symbol load.
    pub fn load(name: impl Into<String>) -> Self {
        Self::new(NodeKind::LoadSym(name.into()))
    }

    /// Autodeclaring symbol load.
    pub fn load_auto(name: impl Into<String>) -> Self {
        Self::new(NodeKind::AutoDeclLoadSym(name.into()))
    }

    /// Function-symbol load.
    pub fn load_func(name: impl Into<String>) -> Self {
        Self::new(NodeKind::LoadFuncSym(name.into()))
    }

    /// List literal.
    pub fn list(items: Vec<Node>) -> Self {
        Self::new(NodeKind::ListLit(items))
    }

    /// Assignment.
    pub fn store(lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::Store {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Binary arithmetic.
    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Relational comparison.
    pub fn relation(op: RelOp, lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::Relation {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Subscript read.
    pub fn subscript(obj: Node, index: Node) -> Self {
        Self::new(NodeKind::SubscriptRead {
            obj: Box::new(obj),
            index: Box::new(index),
        })
    }

    /// Subscript write.
    pub fn subscript_write(obj: Node, index: Node, value: Node) -> Self {
        Self::new(NodeKind::SubscriptWrite {
            obj: Box::new(obj),
            index: Box::new(index),
            value: Box::new(value),
        })
    }

    /// Member access.
    pub fn member(obj: Node, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Member {
            obj: Box::new(obj),
            name: name.into(),
        })
    }

    /// Call through an arbitrary target expression.
    pub fn call(target: Node, args: Vec<Node>) -> Self {
        Self::new(NodeKind::Call {
            target: Box::new(target),
            args,
        })
    }

    /// Call by name — the common case.
    pub fn call_named(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self::call(Self::load_func(name), args)
    }

    /// Return statement.
    pub fn ret(expr: Node) -> Self {
        Self::new(NodeKind::Ret(Box::new(expr)))
    }

    /// Block with its own scope.
    pub fn block(body: Node) -> Self {
        Self::new(NodeKind::Block(Box::new(body)))
    }

    /// Folds statements into a `Seq` chain. Empty input yields a no-op
    /// (void literal); a single statement is returned unchanged.
    pub fn stmts(mut items: Vec<Node>) -> Self {
        match items.len() {
            0 => Self::float(0.0),
            1 => items.remove(0),
            _ => {
                let mut iter = items.into_iter();
                let first = iter.next().expect("len checked above");
                iter.fold(first, |acc, next| {
                    Self::new(NodeKind::Seq(Box::new(acc), Box::new(next)))
                })
            }
        }
    }

    /// Function definition: declaration + parameters + body.
    pub fn func_def(name: impl Into<String>, params: Vec<ParamDecl>, body: Node) -> Self {
        Self::new(NodeKind::FuncDef {
            decl: Box::new(Self::new(NodeKind::FuncDecl(name.into()))),
            params: params.into(),
            body: Rc::new(body),
            is_method: false,
        })
    }

    /// Method definition on a struct type.
    pub fn method_def(
        type_name: impl Into<String>,
        name: impl Into<String>,
        params: Vec<ParamDecl>,
        body: Node,
    ) -> Self {
        Self::new(NodeKind::FuncDef {
            decl: Box::new(Self::new(NodeKind::MethodDecl {
                type_name: type_name.into(),
                name: name.into(),
            })),
            params: params.into(),
            body: Rc::new(body),
            is_method: true,
        })
    }
}
