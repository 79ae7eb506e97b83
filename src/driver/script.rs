//! Scripts describing a build session as a list of builder calls.
//!
//! ```toml
//! [[step]]
//! open = "function"
//!
//! [[step]]
//! arg = { name = "x", type = "object" }
//!
//! [[step]]
//! open = "block"
//!
//! [[step]]
//! emit = { name = "y", value = { call = { op = "add", args = [{ var = "x" }, { var = "x" }] } } }
//!
//! [[step]]
//! ret = { var = "y" }
//!
//! [[step]]
//! close = "function"
//! ```
//!
//! Blocks don't need an explicit `close`, the builder closes them when the
//! next block opens or the enclosing scope ends.

use std::{fmt, ops::Range, path::Path};

use serde::Deserialize;
use thiserror::Error;
use toml::Spanned;
use tracing::{debug, instrument};

use crate::ir::{
    AttrValue, BuildOutput, ConstValue, Expr, ShapeExpr, Type,
    builder::{BuilderError, FrameId, IRBuilder},
};

use super::config::{BuilderConfig, ConfigError};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default, rename = "step")]
    pub steps: Vec<Spanned<Step>>,
}

/// One builder call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Open(OpenFrame),
    Close(FrameName),
    FuncName(String),
    Arg {
        name: String,
        #[serde(rename = "type", default = "object_type")]
        ty: Type,
        #[serde(default)]
        shape: Option<ShapeExpr>,
    },
    Attr {
        key: String,
        value: AttrValue,
    },
    RetType(Type),
    Emit {
        #[serde(default)]
        name: Option<String>,
        value: ScriptExpr,
        #[serde(default)]
        dataflow: bool,
    },
    /// Matches the shape of `value`, e.g `pattern = ["n", 4]`. With `emit_var`
    /// the matched value is bound to a var, named `name` if given.
    MatchShape {
        #[serde(default)]
        name: Option<String>,
        value: ScriptExpr,
        pattern: ShapeExpr,
        #[serde(default)]
        emit_var: bool,
        #[serde(default)]
        dataflow: bool,
    },
    Annotate {
        var: String,
        #[serde(rename = "type")]
        ty: Type,
        #[serde(default)]
        shape: Option<ShapeExpr>,
    },
    Ret(ScriptExpr),
    /// Exposes dataflow vars, by name, past the dataflow block.
    Output(Vec<String>),
    /// Declares a global function of the module.
    Decl(String),
}

fn object_type() -> Type {
    Type::Object
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenFrame {
    Module,
    Function,
    Block,
    Dataflow,
    If { cond: ScriptExpr },
    Then,
    Else,
}

impl OpenFrame {
    fn name(&self) -> FrameName {
        match self {
            OpenFrame::Module => FrameName::Module,
            OpenFrame::Function => FrameName::Function,
            OpenFrame::Block => FrameName::Block,
            OpenFrame::Dataflow => FrameName::Dataflow,
            OpenFrame::If { .. } => FrameName::If,
            OpenFrame::Then => FrameName::Then,
            OpenFrame::Else => FrameName::Else,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameName {
    Module,
    Function,
    Block,
    Dataflow,
    If,
    Then,
    Else,
}

impl FrameName {
    fn is_sequence(self) -> bool {
        matches!(self, FrameName::Function | FrameName::Then | FrameName::Else)
    }
}

impl fmt::Display for FrameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameName::Module => "module",
            FrameName::Function => "function",
            FrameName::Block => "block",
            FrameName::Dataflow => "dataflow",
            FrameName::If => "if",
            FrameName::Then => "then",
            FrameName::Else => "else",
        };
        f.write_str(name)
    }
}

/// An expression, vars are referenced by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptExpr {
    Var(String),
    Global(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Tuple(Vec<ScriptExpr>),
    /// A call to an operator, or to a global function if `op` starts with `@`.
    Call {
        op: String,
        #[serde(default)]
        args: Vec<ScriptExpr>,
    },
    /// A call to an extern function, `type_args` are required.
    CallPacked {
        func: String,
        #[serde(default)]
        args: Vec<ScriptExpr>,
        #[serde(default)]
        type_args: Option<Vec<Type>>,
    },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid script: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("step {index}: {kind}")]
    Step {
        index: usize,
        span: Range<usize>,
        kind: StepErrorKind,
    },
    #[error("failed to finish the build: {0}")]
    Finish(#[source] BuilderError),
}

#[derive(Debug, Error)]
pub enum StepErrorKind {
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error("use of undeclared variable {0:?}")]
    UnknownVar(String),
    #[error("cannot close {expected}, the last open frame is {found:?}")]
    CloseMismatch {
        expected: FrameName,
        found: Option<FrameName>,
    },
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Runs the steps in a fresh build session.
    pub fn replay(&self) -> Result<BuildOutput, ScriptError> {
        self.replay_with(self.builder.clone())
    }

    #[instrument(level = "debug", skip_all, fields(steps = self.steps.len()))]
    pub fn replay_with(&self, config: BuilderConfig) -> Result<BuildOutput, ScriptError> {
        let mut replayer = Replayer {
            builder: IRBuilder::with_config(config),
            open: Vec::new(),
        };

        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, step = ?step.get_ref(), "replaying step");
            replayer
                .step(step.get_ref())
                .map_err(|kind| ScriptError::Step {
                    index,
                    span: step.span(),
                    kind,
                })?;
        }

        replayer.builder.finish().map_err(ScriptError::Finish)
    }
}

struct Replayer {
    builder: IRBuilder,
    /// The frames opened by the script, the builder may have closed some blocks since.
    open: Vec<(FrameName, FrameId)>,
}

impl Replayer {
    fn step(&mut self, step: &Step) -> Result<(), StepErrorKind> {
        let builder = &self.builder;
        self.open.retain(|(_, id)| builder.is_open(*id));

        match step {
            Step::Open(frame) => {
                let id = match frame {
                    OpenFrame::Module => self.builder.open_module()?,
                    OpenFrame::Function => self.builder.open_function()?,
                    OpenFrame::Block => self.builder.open_block()?,
                    OpenFrame::Dataflow => self.builder.open_dataflow()?,
                    OpenFrame::If { cond } => {
                        let cond = self.resolve(cond)?;
                        self.builder.open_if(cond)?
                    }
                    OpenFrame::Then => self.builder.open_then()?,
                    OpenFrame::Else => self.builder.open_else()?,
                };
                self.open.push((frame.name(), id));
            }
            Step::Close(name) => {
                // Closing a sequence closes the block left open on top of it.
                if name.is_sequence()
                    && matches!(
                        self.open.last(),
                        Some((FrameName::Block | FrameName::Dataflow, _))
                    )
                {
                    self.open.pop();
                }

                let found = self.open.last().map(|(found, _)| *found);
                match self.open.pop() {
                    Some((found, id)) if found == *name => self.builder.close(id)?,
                    _ => {
                        return Err(StepErrorKind::CloseMismatch {
                            expected: *name,
                            found,
                        });
                    }
                }
            }
            Step::FuncName(name) => self.builder.func_name(name)?,
            Step::Arg { name, ty, shape } => {
                self.builder.arg_with_shape(name, ty.clone(), shape.clone())?;
            }
            Step::Attr { key, value } => self.builder.func_attr(key, value.clone())?,
            Step::RetType(ty) => self.builder.func_ret_type(ty.clone())?,
            Step::Emit {
                name,
                value,
                dataflow,
            } => {
                let value = self.resolve(value)?;
                let var = self.builder.emit(value, *dataflow)?;
                let name = name.clone().unwrap_or_else(|| var.name.clone());
                self.builder.name_var(&name, &var)?;
            }
            Step::MatchShape {
                name,
                value,
                pattern,
                emit_var,
                dataflow,
            } => {
                let value = self.resolve(value)?;
                let var = self
                    .builder
                    .emit_match_shape(value, pattern.clone(), *emit_var, *dataflow)?;
                if let Some(var) = var {
                    let name = name.clone().unwrap_or_else(|| var.name.clone());
                    self.builder.name_var(&name, &var)?;
                }
            }
            Step::Annotate { var, ty, shape } => {
                let var = self.lookup(var)?.clone();
                self.builder
                    .annotate_type_shape(&var, ty.clone(), shape.clone())?;
            }
            Step::Ret(value) => {
                let value = self.resolve(value)?;
                self.builder.func_ret_value(value)?;
            }
            Step::Output(names) => {
                let vars = names
                    .iter()
                    .map(|name| self.lookup(name).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                self.builder.dataflow_output(&vars)?;
            }
            Step::Decl(name) => {
                self.builder.decl_function(name)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&crate::ir::Var, StepErrorKind> {
        self.builder
            .lookup(name)
            .ok_or_else(|| StepErrorKind::UnknownVar(name.to_string()))
    }

    fn resolve(&self, expr: &ScriptExpr) -> Result<Expr, StepErrorKind> {
        Ok(match expr {
            ScriptExpr::Var(name) => Expr::Var(self.lookup(name)?.clone()),
            ScriptExpr::Global(name) => Expr::GlobalVar(name.clone()),
            ScriptExpr::Int(value) => Expr::Constant(ConstValue::Int(*value)),
            ScriptExpr::Float(value) => Expr::Constant(ConstValue::Float(*value)),
            ScriptExpr::Bool(value) => Expr::Constant(ConstValue::Bool(*value)),
            ScriptExpr::Str(value) => Expr::Constant(ConstValue::Str(value.clone())),
            ScriptExpr::Tuple(fields) => Expr::Tuple(
                fields
                    .iter()
                    .map(|field| self.resolve(field))
                    .collect::<Result<_, _>>()?,
            ),
            ScriptExpr::Call { op, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.resolve(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match op.strip_prefix('@') {
                    Some(global) => Expr::call_global(global, args),
                    None => Expr::call(op.as_str(), args),
                }
            }
            ScriptExpr::CallPacked {
                func,
                args,
                type_args,
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.resolve(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::call_packed(func.as_str(), args, type_args.clone())
                    .map_err(BuilderError::from)?
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps() {
        let script = Script::parse(
            r#"
[builder]
var_prefix = "v"

[[step]]
open = "function"

[[step]]
arg = { name = "x" }

[[step]]
open = { if = { cond = { var = "x" } } }

[[step]]
close = "if"
"#,
        )
        .unwrap();

        assert_eq!(script.builder.var_prefix, "v");
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(script.steps[0].get_ref(), Step::Open(OpenFrame::Function)));
        assert!(matches!(
            script.steps[1].get_ref(),
            Step::Arg { name, ty: Type::Object, shape: None } if name == "x"
        ));
        assert!(matches!(script.steps[2].get_ref(), Step::Open(OpenFrame::If { .. })));
        assert!(matches!(script.steps[3].get_ref(), Step::Close(FrameName::If)));
    }

    #[test]
    fn unknown_var_points_at_the_step() {
        let source = "[[step]]\nopen = \"function\"\n\n[[step]]\nret = { var = \"nope\" }\n";
        let error = Script::parse(source).unwrap().replay().unwrap_err();

        match error {
            ScriptError::Step { index, span, kind } => {
                assert_eq!(index, 1);
                assert!(span.end <= source.len());
                assert!(matches!(kind, StepErrorKind::UnknownVar(name) if name == "nope"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
