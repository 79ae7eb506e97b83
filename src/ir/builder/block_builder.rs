use tracing::{debug, trace};

use crate::ir::{Binding, BindingBlock, Expr, MatchShape, SeqExpr, ShapeExpr, Type, Var, VarId};

use super::{common::IdGenerator, errors::BuildError};

#[derive(Debug)]
struct PendingBlock {
    is_dataflow: bool,
    bindings: Vec<Binding>,
}

/// Accumulates bindings into blocks for one function.
///
/// Blocks nest: an `if` inside a block opens blocks for its branches while
/// the outer block stays pending, and the merge binding of the `if` lands in
/// the outer block once the branch blocks are finished.
#[derive(Debug)]
pub struct BlockBuilder {
    block_stack: Vec<PendingBlock>,
    ids: IdGenerator,
    var_prefix: String,
    dataflow_var_prefix: String,
}

impl BlockBuilder {
    pub fn new(var_prefix: impl Into<String>, dataflow_var_prefix: impl Into<String>) -> Self {
        Self {
            block_stack: Vec::new(),
            ids: IdGenerator::new(),
            var_prefix: var_prefix.into(),
            dataflow_var_prefix: dataflow_var_prefix.into(),
        }
    }

    pub fn begin_block(&mut self, is_dataflow: bool) {
        trace!(is_dataflow, depth = self.block_stack.len(), "begin block");
        self.block_stack.push(PendingBlock {
            is_dataflow,
            bindings: Vec::new(),
        });
    }

    /// Finishes the innermost block, which must have at least one binding.
    pub fn end_block(&mut self) -> Result<BindingBlock, BuildError> {
        let block = self.block_stack.pop().ok_or(BuildError::NoActiveBlock)?;
        if block.bindings.is_empty() {
            return Err(BuildError::EmptyBlock {
                is_dataflow: block.is_dataflow,
            });
        }
        debug!(
            bindings = block.bindings.len(),
            is_dataflow = block.is_dataflow,
            "end block"
        );
        Ok(BindingBlock {
            bindings: block.bindings,
            is_dataflow: block.is_dataflow,
        })
    }

    /// A fresh var not bound by any binding, used for function parameters.
    pub fn fresh_var(&mut self, name: impl Into<String>) -> Var {
        Var::new(self.ids.next_id(), name, false)
    }

    fn next_var(&mut self, is_dataflow: bool) -> Var {
        let id = self.ids.next_id();
        let prefix = if is_dataflow {
            &self.dataflow_var_prefix
        } else {
            &self.var_prefix
        };
        Var::new(id, format!("{prefix}{id}"), is_dataflow)
    }

    /// The innermost block, if it can hold a binding of `var`.
    fn block_for(&mut self, var: Option<&Var>) -> Result<&mut PendingBlock, BuildError> {
        let block = self.block_stack.last_mut().ok_or(BuildError::NoActiveBlock)?;
        match var {
            Some(var) if var.is_dataflow && !block.is_dataflow => {
                Err(BuildError::DataflowVarOutsideDataflow {
                    name: var.name.clone(),
                })
            }
            _ => Ok(block),
        }
    }

    /// Binds `value` to a fresh var in the innermost block.
    pub fn emit(&mut self, value: Expr, is_dataflow: bool) -> Result<Var, BuildError> {
        let var = self.next_var(is_dataflow);
        let block = self.block_for(Some(&var))?;

        let value = normalize(value);
        trace!(var = %var, value = %value, "emit");
        block.bindings.push(Binding::new(var.clone(), value));
        Ok(var)
    }

    /// Matches the shape of `value` against `pattern` in the innermost block.
    ///
    /// With `emit_var` the match also binds a fresh var holding `value` with
    /// the matched shape; `is_dataflow` is ignored otherwise.
    pub fn emit_match_shape(
        &mut self,
        value: Expr,
        pattern: ShapeExpr,
        emit_var: bool,
        is_dataflow: bool,
    ) -> Result<Option<Var>, BuildError> {
        let var = emit_var.then(|| {
            let ty = matched_type(&value, &pattern);
            self.next_var(is_dataflow)
                .with_type(ty)
                .with_shape(pattern.clone())
        });
        let block = self.block_for(var.as_ref())?;

        let value = normalize(value);
        trace!(value = %value, pattern = %pattern, ?var, "emit match_shape");
        block.bindings.push(Binding::MatchShape(MatchShape {
            value,
            pattern,
            var: var.clone(),
        }));
        Ok(var)
    }

    /// Renames a var bound in one of the pending blocks, returning the renamed var.
    pub fn rename(&mut self, id: VarId, name: &str) -> Option<Var> {
        let var = self.var_mut(id)?;
        var.name = name.to_string();
        Some(var.clone())
    }

    /// Turns dataflow vars of the innermost dataflow block into vars visible
    /// after the block.
    pub fn expose(&mut self, vars: &[Var]) -> Result<Vec<Var>, BuildError> {
        let block = match self.block_stack.last_mut() {
            Some(block) if block.is_dataflow => block,
            _ => return Err(BuildError::NoActiveBlock),
        };

        let mut exposed = Vec::with_capacity(vars.len());
        for var in vars {
            let bound = block
                .bindings
                .iter_mut()
                .filter_map(Binding::var_mut)
                .find(|bound| **bound == *var && bound.is_dataflow)
                .ok_or_else(|| BuildError::UnknownDataflowOutput {
                    name: var.name.clone(),
                })?;
            bound.is_dataflow = false;
            exposed.push(bound.clone());
        }
        Ok(exposed)
    }

    pub fn normalize(&self, expr: Expr) -> Expr {
        normalize(expr)
    }

    /// The var `id` as bound in one of the pending blocks.
    pub fn var_mut(&mut self, id: VarId) -> Option<&mut Var> {
        self.block_stack
            .iter_mut()
            .rev()
            .flat_map(|block| block.bindings.iter_mut().rev())
            .filter_map(Binding::var_mut)
            .find(|var| var.id == id)
    }
}

/// The type of the var bound by a shape match: a tensor keeps its dtype, a
/// shape stays a shape.
fn matched_type(value: &Expr, pattern: &ShapeExpr) -> Type {
    match value.as_var().and_then(|var| var.ty.as_ref()) {
        Some(Type::Shape) => Type::Shape,
        Some(Type::Tensor { dtype, .. }) => Type::Tensor {
            dtype: dtype.clone(),
            ndim: Some(pattern.ndim()),
        },
        _ => Type::Tensor {
            dtype: None,
            ndim: Some(pattern.ndim()),
        },
    }
}

/// Puts an expression in canonical form:
/// - nested sequences in the body of a sequence are flattened into it,
/// - empty blocks are dropped,
/// - the branches of an `if` are always sequences.
pub fn normalize(expr: Expr) -> Expr {
    match expr {
        Expr::Seq(seq) => Expr::Seq(normalize_seq(seq)),
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => Expr::If {
            cond: Box::new(normalize(*cond)),
            then_branch: Box::new(as_seq(normalize(*then_branch))),
            else_branch: Box::new(as_seq(normalize(*else_branch))),
        },
        Expr::Call {
            op,
            args,
            type_args,
        } => Expr::Call {
            op: Box::new(normalize(*op)),
            args: args.into_iter().map(normalize).collect(),
            type_args,
        },
        Expr::Tuple(fields) => Expr::Tuple(fields.into_iter().map(normalize).collect()),
        leaf => leaf,
    }
}

fn normalize_seq(seq: SeqExpr) -> SeqExpr {
    let mut blocks: Vec<BindingBlock> = seq
        .blocks
        .into_iter()
        .filter(|block| !block.bindings.is_empty())
        .map(|block| BindingBlock {
            bindings: block
                .bindings
                .into_iter()
                .map(|binding| binding.map_value(normalize))
                .collect(),
            is_dataflow: block.is_dataflow,
        })
        .collect();

    match normalize(*seq.body) {
        Expr::Seq(inner) => {
            blocks.extend(inner.blocks);
            SeqExpr {
                blocks,
                body: inner.body,
            }
        }
        body => SeqExpr {
            blocks,
            body: Box::new(body),
        },
    }
}

fn as_seq(expr: Expr) -> Expr {
    match expr {
        Expr::Seq(_) => expr,
        other => Expr::seq(Vec::new(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, Dim};

    fn builder() -> BlockBuilder {
        BlockBuilder::new("lv", "dv")
    }

    #[test]
    fn emit_and_end_block() {
        let mut bb = builder();
        bb.begin_block(false);
        let var = bb.emit(Expr::Constant(ConstValue::Int(1)), false).unwrap();
        assert_eq!(var.name, "lv0");

        let block = bb.end_block().unwrap();
        assert_eq!(block.bindings.len(), 1);
        assert_eq!(block.bindings[0].var(), Some(&var));
        assert!(!block.is_dataflow);
        assert!(bb.block_stack.is_empty());
    }

    #[test]
    fn empty_block_fails() {
        let mut bb = builder();
        bb.begin_block(true);
        let error = bb.end_block().unwrap_err();
        assert!(matches!(error, BuildError::EmptyBlock { is_dataflow: true }));
    }

    #[test]
    fn emit_without_block_fails() {
        let mut bb = builder();
        let error = bb.emit(Expr::Constant(ConstValue::Int(1)), false).unwrap_err();
        assert!(matches!(error, BuildError::NoActiveBlock));
    }

    #[test]
    fn dataflow_var_needs_dataflow_block() {
        let mut bb = builder();
        bb.begin_block(false);
        let error = bb.emit(Expr::Constant(ConstValue::Int(1)), true).unwrap_err();
        assert!(matches!(error, BuildError::DataflowVarOutsideDataflow { .. }));
    }

    #[test]
    fn nested_blocks_end_innermost_first() {
        let mut bb = builder();
        bb.begin_block(false);
        let outer = bb.emit(Expr::Constant(ConstValue::Int(1)), false).unwrap();
        bb.begin_block(false);
        let inner = bb.emit(Expr::Constant(ConstValue::Int(2)), false).unwrap();

        assert_eq!(bb.end_block().unwrap().bindings[0].var(), Some(&inner));
        assert_eq!(bb.end_block().unwrap().bindings[0].var(), Some(&outer));
    }

    #[test]
    fn rename_and_expose() {
        let mut bb = builder();
        bb.begin_block(true);
        let dv = bb.emit(Expr::Constant(ConstValue::Int(1)), true).unwrap();
        let renamed = bb.rename(dv.id, "gv").unwrap();
        assert_eq!(renamed.name, "gv");

        let exposed = bb.expose(&[renamed]).unwrap();
        assert!(!exposed[0].is_dataflow);

        let block = bb.end_block().unwrap();
        let bound = block.bindings[0].var().unwrap();
        assert_eq!(bound.name, "gv");
        assert!(!bound.is_dataflow);
    }

    #[test]
    fn match_shape_binds_an_optional_var() {
        let mut bb = builder();
        bb.begin_block(false);
        let x = bb
            .fresh_var("x")
            .with_type(Type::Tensor {
                dtype: Some("f32".to_string()),
                ndim: None,
            });
        let pattern = ShapeExpr(vec![Dim::Sym("n".to_string()), Dim::Int(4)]);

        let none = bb
            .emit_match_shape(x.clone().into(), pattern.clone(), false, true)
            .unwrap();
        assert!(none.is_none());

        let var = bb
            .emit_match_shape(x.clone().into(), pattern.clone(), true, false)
            .unwrap()
            .unwrap();
        assert_eq!(var.shape.as_ref(), Some(&pattern));
        assert_eq!(
            var.ty,
            Some(Type::Tensor {
                dtype: Some("f32".to_string()),
                ndim: Some(2),
            })
        );

        let block = bb.end_block().unwrap();
        assert_eq!(block.bindings.len(), 2);
        assert_eq!(block.bindings[0].var(), None);
        assert_eq!(block.bindings[1].var(), Some(&var));
        assert_eq!(*block.bindings[1].value(), Expr::Var(x));
    }

    #[test]
    fn match_shape_dataflow_var_needs_dataflow_block() {
        let mut bb = builder();
        bb.begin_block(false);
        let error = bb
            .emit_match_shape(Expr::Tuple(Vec::new()), ShapeExpr::default(), true, true)
            .unwrap_err();
        assert!(matches!(error, BuildError::DataflowVarOutsideDataflow { .. }));
    }

    #[test]
    fn normalize_flattens_nested_sequences() {
        let a = Var::new(0, "a", false);
        let block = BindingBlock {
            bindings: vec![Binding::new(a.clone(), Expr::Constant(ConstValue::Int(1)))],
            is_dataflow: false,
        };
        let empty = BindingBlock {
            bindings: Vec::new(),
            is_dataflow: false,
        };
        let expr = Expr::seq(vec![empty], Expr::seq(vec![block.clone()], Expr::Var(a.clone())));

        assert_eq!(normalize(expr), Expr::seq(vec![block], Expr::Var(a)));
    }

    #[test]
    fn normalize_wraps_if_branches() {
        let c = Var::new(0, "c", false);
        let expr = Expr::if_(
            Expr::Var(c.clone()),
            Expr::Constant(ConstValue::Int(1)),
            Expr::Constant(ConstValue::Int(2)),
        );
        let expected = Expr::if_(
            Expr::Var(c),
            Expr::seq(Vec::new(), Expr::Constant(ConstValue::Int(1))),
            Expr::seq(Vec::new(), Expr::Constant(ConstValue::Int(2))),
        );
        assert_eq!(normalize(expr), expected);
    }
}
