use std::collections::hash_map::Entry;

use tracing::{debug, instrument};

use crate::ir::{BuildOutput, Function, GlobalVar, IrModule};

use super::{
    BuildError, BuilderError, FrameId, IRBuilder,
    frames::{Frame, FrameKind, ModuleFrame},
};

impl ModuleFrame {
    /// Declares a global function, returning the existing global if it's already declared.
    pub fn declare(&mut self, name: &str) -> GlobalVar {
        match self.global_var_map.entry(name.to_string()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.functions.insert(None);
                debug!(name, "declared global function");
                *entry.insert(GlobalVar { index })
            }
        }
    }

    /// Defines a declared global function. Redefinitions are rejected.
    pub fn define(&mut self, name: &str, func: Function) -> Result<(), BuildError> {
        let gv = self
            .global_var_map
            .get(name)
            .ok_or_else(|| BuildError::UndeclaredGlobal {
                name: name.to_string(),
            })?;
        match self.functions.get_mut(gv.index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(func);
                Ok(())
            }
            Some(_) => Err(BuildError::Redefinition {
                name: name.to_string(),
            }),
            None => Err(BuildError::UndeclaredGlobal {
                name: name.to_string(),
            }),
        }
    }

    fn into_module(self) -> Result<IrModule, BuildError> {
        let mut undefined: Vec<&String> = self
            .global_var_map
            .iter()
            .filter(|(_, gv)| !matches!(self.functions.get(gv.index), Some(Some(_))))
            .map(|(name, _)| name)
            .collect();
        undefined.sort();
        if let Some(name) = undefined.first() {
            return Err(BuildError::UndefinedGlobal {
                name: (*name).clone(),
            });
        }

        Ok(IrModule {
            functions: self.functions,
            global_var_map: self.global_var_map,
        })
    }
}

impl IRBuilder {
    /// Opens a module frame. Modules only exist at the top level.
    pub fn open_module(&mut self) -> Result<FrameId, BuilderError> {
        if !self.stack.is_empty() {
            return Err(BuildError::NestedModule.into());
        }
        Ok(self.stack.push(Frame::Module(ModuleFrame::default())))
    }

    /// Declares a function of the enclosing module without defining it, so
    /// other functions can refer to it before its definition.
    pub fn decl_function(&mut self, name: &str) -> Result<GlobalVar, BuilderError> {
        Ok(self.module_frame_mut("decl_function")?.declare(name))
    }

    /// Defines a function of the enclosing module, declaring it if needed.
    pub fn def_function(&mut self, name: &str, func: Function) -> Result<(), BuilderError> {
        let module = self.module_frame_mut("def_function")?;
        module.declare(name);
        Ok(module.define(name, func)?)
    }

    fn module_frame_mut(&mut self, operation: &'static str) -> Result<&mut ModuleFrame, BuildError> {
        self.stack
            .nearest_mut::<ModuleFrame>()
            .ok_or(BuildError::FrameNotFound {
                operation,
                expected: FrameKind::Module,
            })
    }

    #[instrument(level = "debug", skip(self))]
    pub(super) fn exit_module(&mut self, id: FrameId) -> Result<(), BuilderError> {
        let frame: ModuleFrame = self.stack.pop_as(id)?;
        let module = frame.into_module()?;
        debug!(functions = module.global_var_map.len(), "module finished");
        self.stack.set_result(BuildOutput::Module(module))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, RetShape, Var};

    fn func(value: &str) -> Function {
        let x = Var::new(0, value, false);
        Function::new(
            vec![x.clone()],
            Expr::seq(Vec::new(), Expr::Var(x)),
            None,
            RetShape::RuntimeDep,
            Default::default(),
        )
    }

    #[test]
    fn declare_is_idempotent() {
        let mut module = ModuleFrame::default();
        let first = module.declare("main");
        let second = module.declare("main");
        assert_eq!(first, second);
        assert_eq!(module.global_var_map.len(), 1);
    }

    #[test]
    fn redefinition_keeps_first_definition() {
        let mut module = ModuleFrame::default();
        module.declare("main");
        module.define("main", func("x")).unwrap();

        let error = module.define("main", func("y")).unwrap_err();
        assert!(matches!(error, BuildError::Redefinition { name } if name == "main"));

        let module = module.into_module().unwrap();
        assert_eq!(module.get("main"), Some(&func("x")));
    }

    #[test]
    fn define_needs_declaration() {
        let mut module = ModuleFrame::default();
        let error = module.define("main", func("x")).unwrap_err();
        assert!(matches!(error, BuildError::UndeclaredGlobal { .. }));
    }

    #[test]
    fn undefined_globals_fail() {
        let mut module = ModuleFrame::default();
        module.declare("helper");
        let error = module.into_module().unwrap_err();
        assert!(matches!(error, BuildError::UndefinedGlobal { name } if name == "helper"));
    }
}
