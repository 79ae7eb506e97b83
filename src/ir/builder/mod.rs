//! The frame based IR builder.
//!
//! A build session is an [`IRBuilder`]. Callers open frames (module,
//! function, block, if, then, else), emit bindings into them and close them
//! in LIFO order; closing a frame folds what it built into its parent.
//!
//! Two closes happen without the caller asking for them:
//! - opening a block while a block is the last frame closes that block first,
//! - closing a function, then or else frame closes the block left open on top of it.

use tracing::{debug, instrument};

use crate::{
    driver::config::BuilderConfig,
    ir::{BuildOutput, Expr, ShapeExpr, Var},
};

use self::{
    block_builder::BlockBuilder,
    frames::{BlockFrame, Frame, FunctionFrame},
    names::NameTable,
    stack::FrameStack,
};

mod block_builder;
mod blocks;
mod branch;
mod branches;
mod common;
mod errors;
mod frames;
mod functions;
mod modules;
mod names;
mod stack;
mod types;

pub use block_builder::normalize;
pub use common::FrameId;
pub use errors::{BuildError, BuilderError, IntegrityError};
pub use frames::{Destination, FrameKind};

/// A build session.
///
/// Owns the frame stack, the session result and the names bound so far.
/// Sessions share nothing, so independent sessions can run on different threads.
#[derive(Debug)]
pub struct IRBuilder {
    stack: FrameStack,
    names: NameTable,
    config: BuilderConfig,
}

impl Default for IRBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IRBuilder {
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            stack: FrameStack::new(),
            names: NameTable::default(),
            config,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// The kinds of the open frames, outermost first.
    pub fn frame_kinds(&self) -> Vec<FrameKind> {
        self.stack.kinds()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The var bound to `name`, the most recent binding wins.
    pub fn lookup(&self, name: &str) -> Option<&Var> {
        self.names.lookup(name)
    }

    pub fn result(&self) -> Option<&BuildOutput> {
        self.stack.result()
    }

    /// Whether the frame `id` is still on the stack.
    pub fn is_open(&self, id: FrameId) -> bool {
        self.stack.kind_of(id).is_some()
    }

    /// Closes the frame `id`, running the exit logic of its kind.
    ///
    /// The frame must be the last one. Function, then and else frames may
    /// also have a block left open on top of them, it is closed first.
    #[instrument(level = "debug", skip(self), fields(kind))]
    pub fn close(&mut self, id: FrameId) -> Result<(), BuilderError> {
        let found = self.stack.top_id();
        let kind = self
            .stack
            .kind_of(id)
            .ok_or(IntegrityError::PopMismatch { expected: id, found })?;
        tracing::Span::current().record("kind", tracing::field::display(kind));

        let is_seq = matches!(kind, FrameKind::Function | FrameKind::Then | FrameKind::Else);
        let under_dangling_block = is_seq
            && self.top_block_id().is_some()
            && self.stack.id_below_top() == Some(id);
        if found != Some(id) && !under_dangling_block {
            return Err(IntegrityError::PopMismatch { expected: id, found }.into());
        }

        match kind {
            FrameKind::Module => self.exit_module(id),
            FrameKind::Function => self.exit_function(id),
            FrameKind::Block => self.exit_block(id),
            FrameKind::If => self.exit_if(id),
            FrameKind::Then => self.exit_then(id),
            FrameKind::Else => self.exit_else(id),
        }
    }

    /// Ends the session, returning what it built.
    pub fn finish(mut self) -> Result<BuildOutput, BuilderError> {
        if !self.stack.is_empty() {
            return Err(BuildError::UnclosedFrames {
                count: self.stack.len(),
            }
            .into());
        }
        Ok(self.stack.take_result().ok_or(BuildError::NoResult)?)
    }

    /// Binds `value` to a fresh var in the open block.
    pub fn emit(&mut self, value: Expr, is_dataflow: bool) -> Result<Var, BuilderError> {
        if self.stack.top::<BlockFrame>().is_none() {
            return Err(BuildError::NoActiveBlock.into());
        }
        Ok(self.block_builder_mut("emit")?.emit(value, is_dataflow)?)
    }

    /// Matches the shape of `value` against `pattern` in the open block,
    /// optionally binding a fresh var with the matched shape.
    ///
    /// `is_dataflow` only matters with `emit_var`.
    pub fn emit_match_shape(
        &mut self,
        value: Expr,
        pattern: ShapeExpr,
        emit_var: bool,
        is_dataflow: bool,
    ) -> Result<Option<Var>, BuilderError> {
        if self.stack.top::<BlockFrame>().is_none() {
            return Err(BuildError::NoActiveBlock.into());
        }
        Ok(self
            .block_builder_mut("match_shape")?
            .emit_match_shape(value, pattern, emit_var, is_dataflow)?)
    }

    /// Names `var`: renames its binding and makes `name` resolve to it.
    pub fn name_var(&mut self, name: &str, var: &Var) -> Result<Var, BuilderError> {
        let renamed = match self.block_builder_mut("name")?.rename(var.id, name) {
            Some(renamed) => renamed,
            None => Var {
                name: name.to_string(),
                ..var.clone()
            },
        };
        self.names.bind(name, renamed.clone());
        Ok(renamed)
    }

    /// The block builder of the closest function frame.
    fn block_builder_mut(&mut self, operation: &'static str) -> Result<&mut BlockBuilder, BuildError> {
        self.stack
            .nearest_mut::<FunctionFrame>()
            .map(|frame| &mut frame.block_builder)
            .ok_or(BuildError::FrameNotFound {
                operation,
                expected: FrameKind::Function,
            })
    }

    /// The id of the last frame, if it's a block frame.
    fn top_block_id(&self) -> Option<FrameId> {
        self.stack
            .last()
            .filter(|frame| matches!(frame, Frame::Block(_)))
            .and_then(|_| self.stack.top_id())
    }

    /// Closes the block left open on top of the stack, if any.
    ///
    /// At most one block can be left open, a second one right below it is an
    /// integrity error.
    fn close_dangling_block(&mut self) -> Result<(), BuilderError> {
        if let Some(block_id) = self.top_block_id() {
            debug!(%block_id, "implicitly closing block frame");
            self.exit_block(block_id)?;
            if self.stack.top::<BlockFrame>().is_some() {
                return Err(IntegrityError::ConsecutiveBlockFrames.into());
            }
        }
        Ok(())
    }

    /// Exit logic shared by function, then and else frames, run before the
    /// frame `id` is popped.
    fn exit_seq_expr(&mut self, id: FrameId, owner: FrameKind) -> Result<(), BuilderError> {
        self.close_dangling_block()?;
        if self.stack.any_above::<BlockFrame>(id) {
            return Err(IntegrityError::UnclosedBlockFrame { owner }.into());
        }
        Ok(())
    }
}
