use crate::ir::{Binding, BindingBlock, Expr, VarBinding};

use super::{errors::BuildError, frames::FrameKind};

/// Collapses the blocks of a `then`/`else` branch and its tail into a single
/// expression, returning it with the name of the branch result.
///
/// With an explicit tail the tail must be a var, and its name is the result
/// name. Without one, the last binding of the branch is the result: it is
/// removed from its block and its value becomes the body of the branch.
pub fn collapse(
    branch: FrameKind,
    mut blocks: Vec<BindingBlock>,
    tail: Option<Expr>,
) -> Result<(Expr, String), BuildError> {
    if let Some(tail) = tail {
        let name = tail
            .as_var()
            .map(|var| var.name.clone())
            .ok_or(BuildError::BranchTailNotVar { branch })?;
        return Ok((Expr::seq(blocks, tail), name));
    }

    let mut last_block = blocks.pop().ok_or(BuildError::EmptyBranch { branch })?;
    let VarBinding { var, value } = match last_block.bindings.pop() {
        Some(Binding::Var(binding)) => binding,
        Some(Binding::MatchShape(_)) => return Err(BuildError::MatchShapeBranchResult { branch }),
        None => return Err(BuildError::EmptyBranch { branch }),
    };

    if var.is_dataflow {
        return Err(BuildError::DataflowBranchResult { branch });
    }

    if !last_block.bindings.is_empty() {
        blocks.push(last_block);
    }

    Ok((Expr::seq(blocks, value), var.name))
}
