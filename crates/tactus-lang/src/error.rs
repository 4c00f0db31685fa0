//! Error types for score-language evaluation.
//!
//! Three severities exist at runtime. Fatal errors abort the current score
//! pass and surface as [`MincError`] from [`Interpreter::run`](crate::Interpreter::run).
//! Recoverable errors are logged through `tracing::warn!` and evaluation
//! continues with a safe value (zero, empty string, empty list, false
//! comparison). Advisories are logged at debug level and never change results.

use crate::value::MincType;
use thiserror::Error;

/// Fatal score-language errors.
///
/// Any of these aborts the current score pass. The interpreter logs the
/// source position (line and include file) alongside the error before
/// unwinding.
#[derive(Debug, Error)]
pub enum MincError {
    /// Use of an identifier that was never declared.
    #[error("symbol '{0}' is not declared")]
    UndefinedSymbol(String),

    /// Call target resolves to neither a script function, a builtin, nor a
    /// host-provided external.
    #[error("function '{0}' is not defined")]
    UndefinedFunction(String),

    /// A function symbol was declared twice at global scope.
    #[error("function '{0}' is already declared")]
    FunctionRedeclared(String),

    /// A struct type was registered twice under the same name.
    #[error("struct type '{0}' is already defined")]
    StructTypeRedefined(String),

    /// Struct types may only be defined at global scope.
    #[error("struct type '{0}' defined outside global scope")]
    StructTypeNotGlobal(String),

    /// Instantiation referenced a struct type that was never defined.
    #[error("unknown struct type '{0}'")]
    UnknownStructType(String),

    /// Member access on a value that is not a struct.
    #[error("member access on {0}, which is not a struct")]
    NotAStruct(MincType),

    /// Member name not present on the struct, and no method of that name
    /// is declared for its type.
    #[error("struct '{type_name}' has no member or method '{member}'")]
    NoSuchMember {
        /// The struct type searched.
        type_name: String,
        /// The requested member name.
        member: String,
    },

    /// Assignment would change a symbol's type while type overwrites are
    /// disabled.
    #[error("cannot store {assigned} into '{name}', which is declared {declared}")]
    TypeClash {
        /// Symbol being written.
        name: String,
        /// The symbol's declared type.
        declared: MincType,
        /// The type of the value being stored.
        assigned: MincType,
    },

    /// A struct initializer element did not match the member's declared type.
    #[error("initializer {index} for struct '{type_name}' is {found}, expected {expected}")]
    InitializerType {
        /// The struct type being instantiated.
        type_name: String,
        /// Zero-based initializer position.
        index: usize,
        /// Declared member type.
        expected: MincType,
        /// Initializer value type.
        found: MincType,
    },

    /// More initializers than the struct has members.
    #[error("struct '{type_name}' has {members} members but {given} initializers were given")]
    TooManyInitializers {
        /// The struct type being instantiated.
        type_name: String,
        /// Number of declared members.
        members: usize,
        /// Number of initializers supplied.
        given: usize,
    },

    /// More arguments passed than the callee declares.
    #[error("function '{func}' takes {declared} arguments but {passed} were passed")]
    TooManyArgs {
        /// Callee name.
        func: String,
        /// Declared parameter count.
        declared: usize,
        /// Caller-supplied argument count.
        passed: usize,
    },

    /// Nested calls and list literals exceeded the evaluator stack cap.
    #[error("expression nesting exceeds the maximum depth of {0}")]
    StackOverflow(usize),

    /// Map subscript read with a key that is not present.
    #[error("map has no key {0}")]
    MapKeyMissing(String),

    /// Subscript applied to a value that supports no indexing.
    #[error("{0} cannot be subscripted")]
    BadSubscript(MincType),

    /// Malformed `printf` call: bad format value, unknown specifier, or too
    /// few arguments.
    #[error("printf: {0}")]
    Printf(String),

    /// A builtin was invoked with the wrong number or type of arguments.
    #[error("{0}")]
    ParamError(String),

    /// Raised by the score's own `error()` builtin.
    #[error("score error: {0}")]
    ScoreError(String),

    /// A host external function failed.
    #[error("external function '{name}' failed: {message}")]
    External {
        /// The external function name.
        name: String,
        /// Host-reported failure description.
        message: String,
    },
}

impl MincError {
    /// Convenience constructor for builtin argument errors.
    pub fn param(message: impl Into<String>) -> Self {
        MincError::ParamError(message.into())
    }
}
