use std::collections::{BTreeMap, HashMap};

use educe::Educe;
use serde::{Deserialize, Serialize};
use typed_generational_arena::{SmallSlab, SmallSlabIndex};

use self::builder::BuildError;

pub mod builder;
mod display;

pub type VarId = usize;

pub type FnIndex = SmallSlabIndex<Option<Function>>;
pub type Functions = SmallSlab<Option<Function>>;

/// Function attributes, ordered so printing is deterministic.
pub type Attrs = BTreeMap<String, AttrValue>;

/// A variable bound by a binding or a function parameter.
///
/// Two vars are the same var if they share the id, the name is only a hint
/// and can be changed after the var is emitted.
#[derive(Debug, Clone, Educe)]
#[educe(PartialEq, Eq, Hash)]
pub struct Var {
    pub id: VarId,
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub name: String,
    /// Dataflow vars are only visible inside the dataflow block that binds them.
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub is_dataflow: bool,
    /// The type annotation, if any.
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub ty: Option<Type>,
    /// The shape annotation, only meaningful for tensors.
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub shape: Option<ShapeExpr>,
}

impl Var {
    pub fn new(id: VarId, name: impl Into<String>, is_dataflow: bool) -> Self {
        Self {
            id,
            name: name.into(),
            is_dataflow,
            ty: None,
            shape: None,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_shape(mut self, shape: ShapeExpr) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// One dimension of a shape, either known or a symbol bound by a shape match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Int(i64),
    Sym(String),
}

/// The dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeExpr(pub Vec<Dim>);

impl ShapeExpr {
    pub fn ndim(&self) -> usize {
        self.0.len()
    }
}

/// A reference to a function of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalVar {
    pub index: FnIndex,
}

/// An expression of the tensor IR.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    /// A function of the module, referenced by name.
    GlobalVar(String),
    /// A primitive operator, e.g `add`.
    Op(String),
    Constant(ConstValue),
    Tuple(Vec<Expr>),
    /// A function outside the module, called through the packed calling convention.
    ExternFunc(String),
    Call {
        op: Box<Expr>,
        args: Vec<Expr>,
        /// The types of the results, only set for packed calls.
        type_args: Vec<Type>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Seq(SeqExpr),
}

impl Expr {
    /// A call to the primitive operator `op`.
    pub fn call(op: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            op: Box::new(Self::Op(op.into())),
            args,
            type_args: Vec::new(),
        }
    }

    /// A call to the global function `name` of the module.
    pub fn call_global(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            op: Box::new(Self::GlobalVar(name.into())),
            args,
            type_args: Vec::new(),
        }
    }

    /// A call to the extern function `func`. The result types can't be
    /// inferred from an extern function, so they must be given.
    pub fn call_packed(
        func: impl Into<String>,
        args: Vec<Expr>,
        type_args: Option<Vec<Type>>,
    ) -> Result<Self, BuildError> {
        let func = func.into();
        let type_args = type_args.ok_or_else(|| BuildError::CallPackedWithoutTypeArgs {
            func: func.clone(),
        })?;
        Ok(Self::Call {
            op: Box::new(Self::ExternFunc(func)),
            args,
            type_args,
        })
    }

    pub fn seq(blocks: Vec<BindingBlock>, body: Expr) -> Self {
        Self::Seq(SeqExpr {
            blocks,
            body: Box::new(body),
        })
    }

    pub fn if_(cond: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }
}

impl From<Var> for Expr {
    fn from(var: Var) -> Self {
        Self::Var(var)
    }
}

/// A sequence of binding blocks followed by the value of the whole sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqExpr {
    pub blocks: Vec<BindingBlock>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Var(VarBinding),
    MatchShape(MatchShape),
}

/// `var = value`
#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub var: Var,
    pub value: Expr,
}

/// Matches the shape of `value` against `pattern`, binding the symbolic
/// dims of the pattern. `var`, if any, is `value` with the matched shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchShape {
    pub value: Expr,
    pub pattern: ShapeExpr,
    pub var: Option<Var>,
}

impl Binding {
    pub fn new(var: Var, value: Expr) -> Self {
        Self::Var(VarBinding { var, value })
    }

    /// The var bound, a shape match may bind none.
    pub fn var(&self) -> Option<&Var> {
        match self {
            Self::Var(binding) => Some(&binding.var),
            Self::MatchShape(binding) => binding.var.as_ref(),
        }
    }

    pub fn var_mut(&mut self) -> Option<&mut Var> {
        match self {
            Self::Var(binding) => Some(&mut binding.var),
            Self::MatchShape(binding) => binding.var.as_mut(),
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Self::Var(binding) => &binding.value,
            Self::MatchShape(binding) => &binding.value,
        }
    }

    pub fn map_value(self, f: impl FnOnce(Expr) -> Expr) -> Self {
        match self {
            Self::Var(VarBinding { var, value }) => Self::Var(VarBinding {
                var,
                value: f(value),
            }),
            Self::MatchShape(MatchShape {
                value,
                pattern,
                var,
            }) => Self::MatchShape(MatchShape {
                value: f(value),
                pattern,
                var,
            }),
        }
    }
}

/// A finished block of bindings, never empty once it leaves the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingBlock {
    pub bindings: Vec<Binding>,
    /// Dataflow blocks only hold side effect free bindings, in any order.
    pub is_dataflow: bool,
}

impl BindingBlock {
    pub fn var_mut(&mut self, id: VarId) -> Option<&mut Var> {
        self.bindings
            .iter_mut()
            .filter_map(Binding::var_mut)
            .find(|var| var.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A type annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Object,
    Shape,
    Tensor {
        #[serde(default)]
        dtype: Option<String>,
        #[serde(default)]
        ndim: Option<usize>,
    },
    Tuple(Vec<Type>),
}

/// The return shape of a function. Shapes are only known at runtime for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetShape {
    #[default]
    RuntimeDep,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<Var>,
    /// Always a [`Expr::Seq`] once built.
    pub body: Expr,
    pub ret_type: Option<Type>,
    pub ret_shape: RetShape,
    pub attrs: Attrs,
}

impl Function {
    pub fn new(
        params: Vec<Var>,
        body: Expr,
        ret_type: Option<Type>,
        ret_shape: RetShape,
        attrs: Attrs,
    ) -> Self {
        Self {
            params,
            body,
            ret_type,
            ret_shape,
            attrs,
        }
    }

    /// The `global_symbol` attribute, if the function has one.
    pub fn global_symbol(&self, attr: &str) -> Option<&str> {
        match self.attrs.get(attr) {
            Some(AttrValue::Str(name)) => Some(name),
            _ => None,
        }
    }

    /// Gets the body as a sequence.
    pub fn seq_body(&self) -> Option<&SeqExpr> {
        match &self.body {
            Expr::Seq(seq) => Some(seq),
            _ => None,
        }
    }
}

/// A module of global functions.
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub functions: Functions,
    pub global_var_map: HashMap<String, GlobalVar>,
}

impl IrModule {
    /// Gets the function bound to the given global name.
    pub fn get(&self, name: &str) -> Option<&Function> {
        let gv = self.global_var_map.get(name)?;
        self.functions.get(gv.index)?.as_ref()
    }

    /// The global names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.global_var_map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// What a build session produces.
#[derive(Debug, Clone)]
pub enum BuildOutput {
    Function(Function),
    Module(IrModule),
}

impl BuildOutput {
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(func) => Some(func),
            Self::Module(_) => None,
        }
    }

    pub fn as_module(&self) -> Option<&IrModule> {
        match self {
            Self::Module(module) => Some(module),
            Self::Function(_) => None,
        }
    }
}
