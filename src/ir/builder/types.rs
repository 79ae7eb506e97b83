use tracing::{debug, instrument};

use crate::ir::{BindingBlock, ShapeExpr, Type, Var, VarId};

use super::{
    BuildError, BuilderError, IRBuilder,
    frames::{ElseFrame, Frame, FunctionFrame, ThenFrame},
};

/// Whether every value of type `derived` is also a value of type `base`.
pub fn is_base_of(base: &Type, derived: &Type) -> bool {
    match (base, derived) {
        (Type::Object, _) => true,
        (
            Type::Tensor {
                dtype: base_dtype,
                ndim: base_ndim,
            },
            Type::Tensor { dtype, ndim },
        ) => {
            (base_dtype.is_none() || base_dtype == dtype)
                && (base_ndim.is_none() || base_ndim == ndim)
        }
        (Type::Tuple(base), Type::Tuple(derived)) => {
            base.len() == derived.len()
                && base
                    .iter()
                    .zip(derived)
                    .all(|(base, derived)| is_base_of(base, derived))
        }
        (base, derived) => base == derived,
    }
}

/// Fails if `shape` doesn't have as many dims as the tensor type of `var`.
pub fn check_rank(var: &Var, shape: &ShapeExpr) -> Result<(), BuildError> {
    match &var.ty {
        Some(Type::Tensor {
            ndim: Some(ndim), ..
        }) if *ndim != shape.ndim() => Err(BuildError::ShapeRankMismatch {
            name: var.name.clone(),
            ndim: *ndim,
            shape: shape.clone(),
        }),
        _ => Ok(()),
    }
}

fn var_in_blocks(blocks: &mut [BindingBlock], id: VarId) -> Option<&mut Var> {
    blocks.iter_mut().find_map(|block| block.var_mut(id))
}

impl IRBuilder {
    /// Annotates a var bound in one of the open frames with a type and,
    /// optionally, a shape.
    ///
    /// The annotated type must be a base or a refinement of the type the var
    /// already has, and a known shape can't change. Exprs built before keep
    /// referring to the var by id, only its binding and the names are updated.
    #[instrument(level = "debug", skip(self, var), fields(name = %var.name))]
    pub fn annotate_type_shape(
        &mut self,
        var: &Var,
        ty: Type,
        shape: Option<ShapeExpr>,
    ) -> Result<Var, BuilderError> {
        let bound = self
            .bound_var_mut(var.id)
            .ok_or_else(|| BuildError::UnknownVar {
                name: var.name.clone(),
            })?;

        if let Some(existing) = &bound.ty {
            if !is_base_of(&ty, existing) && !is_base_of(existing, &ty) {
                return Err(BuildError::AnnotationMismatch {
                    name: bound.name.clone(),
                    existing: existing.clone(),
                    annotated: ty,
                }
                .into());
            }
        }
        if let (Some(existing), Some(annotated)) = (&bound.shape, &shape) {
            if existing != annotated {
                return Err(BuildError::ShapeMismatch {
                    name: bound.name.clone(),
                    existing: existing.clone(),
                    annotated: annotated.clone(),
                }
                .into());
            }
        }

        let mut annotated = bound.clone().with_type(ty);
        if let Some(shape) = shape {
            check_rank(&annotated, &shape)?;
            annotated = annotated.with_shape(shape);
        }
        *bound = annotated.clone();

        self.names.refresh(&annotated);
        debug!(ty = ?annotated.ty, shape = ?annotated.shape, "annotated var");
        Ok(annotated)
    }

    /// The var `id` where it is bound: a parameter, a pending binding or a
    /// binding of a finished block of an open frame.
    fn bound_var_mut(&mut self, id: VarId) -> Option<&mut Var> {
        self.stack.frames_mut().rev().find_map(|frame| match frame {
            Frame::Function(FunctionFrame {
                block_builder,
                seq,
                params,
                ..
            }) => block_builder
                .var_mut(id)
                .or_else(move || var_in_blocks(&mut seq.blocks, id))
                .or_else(move || params.iter_mut().find(|param| param.id == id)),
            Frame::Then(ThenFrame { seq }) | Frame::Else(ElseFrame { seq }) => {
                var_in_blocks(&mut seq.blocks, id)
            }
            _ => None,
        })
    }
}
