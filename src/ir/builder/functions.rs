use tracing::{debug, instrument};

use crate::ir::{AttrValue, Attrs, BuildOutput, Expr, Function, RetShape, ShapeExpr, Type, Var};

use super::{
    BuildError, BuilderError, FrameId, IRBuilder, IntegrityError,
    block_builder::BlockBuilder,
    frames::{Destination, Frame, FrameKind, FunctionFrame, ModuleFrame, SeqExprFrame},
    names::ScopeKind,
    types::check_rank,
};

impl IRBuilder {
    /// Opens a function frame.
    ///
    /// Where the finished function goes is decided here: an outermost function
    /// is the session result, a function inside a module becomes a global of it.
    #[instrument(level = "debug", skip_all)]
    pub fn open_function(&mut self) -> Result<FrameId, BuilderError> {
        let destination = if self.stack.is_empty() {
            Destination::TopLevel
        } else if self.stack.nearest::<ModuleFrame>().is_some() {
            Destination::Module
        } else {
            Destination::Unplaceable
        };
        debug!(?destination, "opening function frame");

        // Names don't cross function boundaries.
        self.names.push_scope(ScopeKind::Function);

        let frame = FunctionFrame {
            seq: SeqExprFrame::default(),
            name: None,
            params: Vec::new(),
            ret_type: None,
            attrs: Attrs::new(),
            block_builder: BlockBuilder::new(
                self.config.var_prefix.as_str(),
                self.config.dataflow_var_prefix.as_str(),
            ),
            destination,
        };
        Ok(self.stack.push(Frame::Function(frame)))
    }

    /// Adds a parameter to the last function frame.
    pub fn arg(&mut self, name: &str, ty: Type) -> Result<Var, BuilderError> {
        self.arg_with_shape(name, ty, None)
    }

    /// Adds a parameter with a known shape. The shape must agree with the
    /// number of dimensions of a tensor type.
    pub fn arg_with_shape(
        &mut self,
        name: &str,
        ty: Type,
        shape: Option<ShapeExpr>,
    ) -> Result<Var, BuilderError> {
        let frame = self.function_frame_mut("arg")?;
        if frame.params.iter().any(|param| param.name == name) {
            return Err(BuildError::DuplicateParam {
                name: name.to_string(),
            }
            .into());
        }

        let mut var = frame.block_builder.fresh_var(name).with_type(ty);
        if let Some(shape) = shape {
            check_rank(&var, &shape)?;
            var = var.with_shape(shape);
        }
        frame.params.push(var.clone());
        self.names.bind(name, var.clone());
        Ok(var)
    }

    pub fn func_name(&mut self, name: &str) -> Result<(), BuilderError> {
        self.function_frame_mut("func_name")?.name = Some(name.to_string());
        Ok(())
    }

    pub fn func_attr(&mut self, key: &str, value: AttrValue) -> Result<(), BuilderError> {
        self.function_frame_mut("func_attr")?
            .attrs
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn func_ret_type(&mut self, ty: Type) -> Result<(), BuilderError> {
        self.function_frame_mut("func_ret_type")?.ret_type = Some(ty);
        Ok(())
    }

    /// Sets the value of the function, then or else frame on top of the stack.
    ///
    /// A return ends the scope, so a block left open is closed first. Any
    /// other frame left on top, e.g an unfinished `if`, makes the return fail.
    #[instrument(level = "debug", skip_all)]
    pub fn func_ret_value(&mut self, value: Expr) -> Result<(), BuilderError> {
        self.close_dangling_block()?;

        let value = self.block_builder_mut("return")?.normalize(value);
        let last = self.stack.last().map(Frame::kind);
        let (enclosing, seq) = self
            .stack
            .top_seq_mut()
            .ok_or(BuildError::ReturnOutsideSequence { enclosing: last })?;
        if seq.output.is_some() {
            return Err(BuildError::MultipleReturn { enclosing }.into());
        }
        debug!(%enclosing, %value, "set return value");
        seq.output = Some(value);
        Ok(())
    }

    fn function_frame_mut(&mut self, operation: &'static str) -> Result<&mut FunctionFrame, BuildError> {
        self.stack
            .nearest_mut::<FunctionFrame>()
            .ok_or(BuildError::FrameNotFound {
                operation,
                expected: FrameKind::Function,
            })
    }

    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_function(&mut self, id: FrameId) -> Result<(), BuilderError> {
        self.exit_seq_expr(id, FrameKind::Function)?;

        let FunctionFrame {
            seq,
            name,
            params,
            ret_type,
            mut attrs,
            block_builder,
            destination,
        } = self.stack.pop_as(id)?;
        self.names.pop_scope();

        // Step 1. Create the function.
        let output = seq
            .output
            .ok_or_else(|| BuildError::MissingReturnValue { name: name.clone() })?;
        let output = block_builder.normalize(output);
        let body = block_builder.normalize(Expr::seq(seq.blocks, output));

        // Unnamed functions get no `global_symbol`.
        if self.config.attach_global_symbol {
            if let Some(name) = &name {
                attrs.insert(
                    self.config.global_symbol_attr.clone(),
                    AttrValue::Str(name.clone()),
                );
            }
        }
        let func = Function::new(params, body, ret_type, RetShape::RuntimeDep, attrs);

        // Step 2. Hand the function over.
        match destination {
            Destination::TopLevel => {
                debug!("function is the session result");
                self.stack.set_result(BuildOutput::Function(func))?;
            }
            Destination::Module => {
                let name = name.ok_or(BuildError::UnnamedModuleFunction)?;
                let module = self
                    .stack
                    .nearest_mut::<ModuleFrame>()
                    .ok_or(IntegrityError::DestinationChanged)?;
                module.declare(&name);
                module.define(&name, func)?;
                debug!(%name, "defined module function");
            }
            Destination::Unplaceable => {
                return Err(BuildError::NoDestination { name }.into());
            }
        }

        Ok(())
    }
}
