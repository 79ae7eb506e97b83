use thiserror::Error;

use crate::ir::{Expr, ShapeExpr, Type};

use super::{FrameId, frames::FrameKind};

/// The sequence of builder calls describes an invalid program.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("function {name:?} must have a return value, use `return` to set one")]
    MissingReturnValue { name: Option<String> },
    #[error("a binding block should have at least one binding")]
    EmptyBlock { is_dataflow: bool },
    #[error("duplicate then branch declaration, previous one is {previous}")]
    DuplicateThen { previous: Box<Expr> },
    #[error("duplicate else branch declaration, previous one is {previous}")]
    DuplicateElse { previous: Box<Expr> },
    #[error("the else branch should follow the then branch")]
    ElseBeforeThen,
    #[error("the body of the {branch} part is expected to be defined before exiting the if")]
    MissingBranch { branch: FrameKind },
    #[error(
        "the last binding of both branches must have the same variable, found {then_name:?} and {else_name:?}"
    )]
    BranchNameMismatch {
        then_name: String,
        else_name: String,
    },
    #[error("cannot create an if frame inside a dataflow block")]
    IfInsideDataflow,
    #[error("cannot find a function frame when creating a binding block")]
    BlockOutsideFunction,
    #[error("a binding block can't be opened directly inside a {enclosing} frame")]
    BlockOutsideSequence { enclosing: FrameKind },
    #[error("a binding block can't be opened after the {enclosing} frame returned")]
    BlockAfterReturn { enclosing: FrameKind },
    #[error("cannot find where to insert function {name:?}")]
    NoDestination { name: Option<String> },
    #[error("the builder result has already been set")]
    DuplicateResult,
    #[error("the function name must be defined before exiting the function scope inside a module")]
    UnnamedModuleFunction,
    #[error("function {name:?} is already defined")]
    Redefinition { name: String },
    #[error("function {name:?} is declared but never defined")]
    UndefinedGlobal { name: String },
    #[error("global {name:?} is not declared")]
    UndeclaredGlobal { name: String },
    #[error("duplicate parameter {name:?}")]
    DuplicateParam { name: String },
    #[error("multiple return values, the return must appear at the end of the {enclosing} scope")]
    MultipleReturn { enclosing: FrameKind },
    #[error("`return` needs a function, then or else frame on top of the stack, the last frame is {enclosing:?}")]
    ReturnOutsideSequence { enclosing: Option<FrameKind> },
    #[error("`{operation}` needs an enclosing {expected} frame")]
    FrameNotFound {
        operation: &'static str,
        expected: FrameKind,
    },
    #[error("no binding block is open to emit into")]
    NoActiveBlock,
    #[error("dataflow var {name:?} can only be emitted inside a dataflow block")]
    DataflowVarOutsideDataflow { name: String },
    #[error("{name:?} is not a dataflow var of the current dataflow block")]
    UnknownDataflowOutput { name: String },
    #[error("the body of the {branch} branch is empty")]
    EmptyBranch { branch: FrameKind },
    #[error("the last binding of the {branch} branch must bind a non-dataflow var")]
    DataflowBranchResult { branch: FrameKind },
    #[error("the last binding of the {branch} branch must bind a var to a value, found a shape match")]
    MatchShapeBranchResult { branch: FrameKind },
    #[error("the {branch} branch must end in a variable")]
    BranchTailNotVar { branch: FrameKind },
    #[error("packed call to {func:?} needs type args")]
    CallPackedWithoutTypeArgs { func: String },
    #[error("var {name:?} is not bound in any open frame")]
    UnknownVar { name: String },
    #[error("cannot annotate var {name:?} of type {existing} with the unrelated type {annotated}")]
    AnnotationMismatch {
        name: String,
        existing: Type,
        annotated: Type,
    },
    #[error("cannot annotate var {name:?} of shape {existing} with the shape {annotated}")]
    ShapeMismatch {
        name: String,
        existing: ShapeExpr,
        annotated: ShapeExpr,
    },
    #[error("var {name:?} has {ndim} dimensions but its shape is {shape}")]
    ShapeRankMismatch {
        name: String,
        ndim: usize,
        shape: ShapeExpr,
    },
    #[error("modules can only be built at the top level")]
    NestedModule,
    #[error("{count} frames are still open")]
    UnclosedFrames { count: usize },
    #[error("the build session produced no result")]
    NoResult,
}

/// The builder broke one of its own invariants, this is a bug in the builder
/// rather than in the program being built.
#[derive(Debug, Error, Clone)]
pub enum IntegrityError {
    #[error("frame {expected} is not the last frame, the last frame is {found:?}")]
    PopMismatch {
        expected: FrameId,
        found: Option<FrameId>,
    },
    #[error("frame {id} is a {found} frame, expected a {expected} frame")]
    KindMismatch {
        id: FrameId,
        expected: FrameKind,
        found: FrameKind,
    },
    #[error("unsupported enclosing frame {enclosing:?} for a finished block")]
    UnsupportedEnclosingFrame { enclosing: Option<FrameKind> },
    #[error("there is a block frame that was not properly popped out above the {owner} frame")]
    UnclosedBlockFrame { owner: FrameKind },
    #[error("block frames cannot appear consecutively")]
    ConsecutiveBlockFrames,
    #[error("the function frame owning the open block is gone")]
    MissingBlockOwner,
    #[error("function was entered under a module frame that no longer encloses it")]
    DestinationChanged,
}

#[derive(Debug, Error, Clone)]
pub enum BuilderError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("internal builder error: {0}")]
    Integrity(#[from] IntegrityError),
}

impl BuilderError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
