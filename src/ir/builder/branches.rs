use tracing::{debug, instrument};

use crate::ir::Expr;

use super::{
    BuildError, BuilderError, FrameId, IRBuilder,
    branch::collapse,
    frames::{BlockFrame, ElseFrame, Frame, FrameKind, IfFrame, ThenFrame},
    names::ScopeKind,
};

impl IRBuilder {
    /// Opens an if frame. Its then and else frames follow, in that order.
    ///
    /// Fails if a dataflow block is open anywhere on the stack.
    #[instrument(level = "debug", skip_all)]
    pub fn open_if(&mut self, condition: Expr) -> Result<FrameId, BuilderError> {
        if self.stack.in_dataflow_block() {
            return Err(BuildError::IfInsideDataflow.into());
        }

        Ok(self.stack.push(Frame::If(IfFrame {
            condition,
            then_expr: None,
            else_expr: None,
            var_name: None,
        })))
    }

    pub fn open_then(&mut self) -> Result<FrameId, BuilderError> {
        let frame = self.if_frame_mut("then")?;
        if let Some(previous) = &frame.then_expr {
            return Err(BuildError::DuplicateThen {
                previous: Box::new(previous.clone()),
            }
            .into());
        }
        self.names.push_scope(ScopeKind::Branch);
        Ok(self.stack.push(Frame::Then(ThenFrame::default())))
    }

    pub fn open_else(&mut self) -> Result<FrameId, BuilderError> {
        let frame = self.if_frame_mut("else")?;
        if frame.then_expr.is_none() {
            return Err(BuildError::ElseBeforeThen.into());
        }
        if let Some(previous) = &frame.else_expr {
            return Err(BuildError::DuplicateElse {
                previous: Box::new(previous.clone()),
            }
            .into());
        }
        self.names.push_scope(ScopeKind::Branch);
        Ok(self.stack.push(Frame::Else(ElseFrame::default())))
    }

    fn if_frame_mut(&mut self, operation: &'static str) -> Result<&mut IfFrame, BuildError> {
        self.stack
            .nearest_mut::<IfFrame>()
            .ok_or(BuildError::FrameNotFound {
                operation,
                expected: FrameKind::If,
            })
    }

    /// Binds the if expression to a fresh var in the enclosing block, named
    /// after the result of the branches. The name lands in the scope enclosing
    /// the if, the names bound inside the branches are already gone.
    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_if(&mut self, id: FrameId) -> Result<(), BuilderError> {
        let IfFrame {
            condition,
            then_expr,
            else_expr,
            var_name,
        } = self.stack.pop_as(id)?;

        let then_expr = then_expr.ok_or(BuildError::MissingBranch {
            branch: FrameKind::Then,
        })?;
        let else_expr = else_expr.ok_or(BuildError::MissingBranch {
            branch: FrameKind::Else,
        })?;
        let var_name = var_name.ok_or(BuildError::MissingBranch {
            branch: FrameKind::Then,
        })?;

        if self.stack.top::<BlockFrame>().is_none() {
            return Err(BuildError::NoActiveBlock.into());
        }

        let value = Expr::if_(condition, then_expr, else_expr);
        let var = self.block_builder_mut("if")?.emit(value, false)?;
        let var = self.name_var(&var_name, &var)?;
        debug!(%var, "bound if result");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_then(&mut self, id: FrameId) -> Result<(), BuilderError> {
        self.exit_seq_expr(id, FrameKind::Then)?;
        let ThenFrame { seq } = self.stack.pop_as(id)?;
        self.names.pop_scope();
        let (expr, var_name) = collapse(FrameKind::Then, seq.blocks, seq.output)?;

        let frame = self.if_frame_mut("then")?;
        if let Some(previous) = &frame.then_expr {
            return Err(BuildError::DuplicateThen {
                previous: Box::new(previous.clone()),
            }
            .into());
        }
        debug!(%var_name, "then branch finished");
        frame.then_expr = Some(expr);
        frame.var_name = Some(var_name);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_else(&mut self, id: FrameId) -> Result<(), BuilderError> {
        self.exit_seq_expr(id, FrameKind::Else)?;
        let ElseFrame { seq } = self.stack.pop_as(id)?;
        self.names.pop_scope();
        let (expr, var_name) = collapse(FrameKind::Else, seq.blocks, seq.output)?;

        let frame = self.if_frame_mut("else")?;
        if let Some(previous) = &frame.else_expr {
            return Err(BuildError::DuplicateElse {
                previous: Box::new(previous.clone()),
            }
            .into());
        }
        frame.else_expr = Some(expr);

        match &frame.var_name {
            Some(then_name) if *then_name == var_name => {
                debug!(%var_name, "else branch finished");
                Ok(())
            }
            then_name => Err(BuildError::BranchNameMismatch {
                then_name: then_name.clone().unwrap_or_default(),
                else_name: var_name,
            }
            .into()),
        }
    }
}
