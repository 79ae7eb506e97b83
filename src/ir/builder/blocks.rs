use tracing::{debug, instrument};

use crate::ir::Var;

use super::{
    BuildError, BuilderError, FrameId, IRBuilder, IntegrityError,
    frames::{BlockFrame, Frame, FrameKind, FunctionFrame},
};

impl IRBuilder {
    /// Opens an ordinary binding block.
    pub fn open_block(&mut self) -> Result<FrameId, BuilderError> {
        self.enter_block(false)
    }

    /// Opens a dataflow block, which only holds side effect free bindings
    /// and can't contain branches.
    pub fn open_dataflow(&mut self) -> Result<FrameId, BuilderError> {
        self.enter_block(true)
    }

    /// Exposes dataflow vars of the open dataflow block to the code after it.
    ///
    /// Returns the exposed vars, which are no longer dataflow vars.
    pub fn dataflow_output(&mut self, vars: &[Var]) -> Result<Vec<Var>, BuilderError> {
        match self.stack.top::<BlockFrame>() {
            Some(block) if block.is_dataflow => {}
            _ => {
                return Err(BuildError::FrameNotFound {
                    operation: "output",
                    expected: FrameKind::Block,
                }
                .into());
            }
        }

        let exposed = self.block_builder_mut("output")?.expose(vars)?;
        for var in &exposed {
            self.names.bind(var.name.clone(), var.clone());
        }
        Ok(exposed)
    }

    #[instrument(level = "debug", skip(self))]
    fn enter_block(&mut self, is_dataflow: bool) -> Result<FrameId, BuilderError> {
        // A new block ends the block before it, blocks never nest directly.
        self.close_dangling_block()?;

        if self.stack.nearest::<FunctionFrame>().is_none() {
            return Err(BuildError::BlockOutsideFunction.into());
        }

        // The finished block goes to the enclosing sequence, so there has to be one still
        // accepting blocks.
        if let Some(frame) = self.stack.last() {
            let enclosing = frame.kind();
            match frame.as_seq() {
                Some(seq) if seq.output.is_some() => {
                    return Err(BuildError::BlockAfterReturn { enclosing }.into());
                }
                Some(_) => {}
                None => return Err(BuildError::BlockOutsideSequence { enclosing }.into()),
            }
        }

        let id = self.stack.push(Frame::Block(BlockFrame { is_dataflow }));
        self.block_builder_mut("block")?.begin_block(is_dataflow);
        debug!(%id, "opened block frame");
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_block(&mut self, id: FrameId) -> Result<(), BuilderError> {
        let frame: BlockFrame = self.stack.pop_as(id)?;

        let block = self
            .stack
            .nearest_mut::<FunctionFrame>()
            .ok_or(IntegrityError::MissingBlockOwner)?
            .block_builder
            .end_block()?;
        debug_assert_eq!(block.is_dataflow, frame.is_dataflow);

        match self.stack.last_mut() {
            // Entering a block closes the one before it.
            Some(Frame::Block(_)) => Err(IntegrityError::ConsecutiveBlockFrames.into()),
            Some(last) => {
                let enclosing = last.kind();
                match last.as_seq_mut() {
                    Some(seq) if seq.output.is_none() => {
                        debug!(%enclosing, bindings = block.bindings.len(), "block finished");
                        seq.blocks.push(block);
                        Ok(())
                    }
                    _ => Err(IntegrityError::UnsupportedEnclosingFrame {
                        enclosing: Some(enclosing),
                    }
                    .into()),
                }
            }
            None => Err(IntegrityError::UnsupportedEnclosingFrame { enclosing: None }.into()),
        }
    }
}
