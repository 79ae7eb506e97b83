use std::fmt::{self, Write};

use itertools::Itertools;

use super::{
    AttrValue, Binding, BindingBlock, BuildOutput, ConstValue, Dim, Expr, Function, IrModule,
    MatchShape, SeqExpr, ShapeExpr, Type, Var, VarBinding,
};

const INDENT: &str = "    ";

fn pad(f: &mut impl Write, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        f.write_str(INDENT)?;
    }
    Ok(())
}

/// Writes an expression, nested sequences and ifs span multiple lines and
/// close at the given indentation.
fn write_expr(f: &mut impl Write, expr: &Expr, indent: usize) -> fmt::Result {
    match expr {
        Expr::Var(var) => write!(f, "{var}"),
        Expr::GlobalVar(name) => write!(f, "@{name}"),
        Expr::Op(name) => f.write_str(name),
        Expr::Constant(value) => write!(f, "{value}"),
        Expr::Tuple(fields) => {
            f.write_char('(')?;
            write_list(f, fields, indent)?;
            if fields.len() == 1 {
                f.write_char(',')?;
            }
            f.write_char(')')
        }
        Expr::ExternFunc(name) => write!(f, "extern({name:?})"),
        Expr::Call {
            op,
            args,
            type_args,
        } => {
            write_expr(f, op, indent)?;
            f.write_char('(')?;
            write_list(f, args, indent)?;
            f.write_char(')')?;
            if !type_args.is_empty() {
                write!(f, " -> [{}]", type_args.iter().join(", "))?;
            }
            Ok(())
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            f.write_str("if ")?;
            write_expr(f, cond, indent)?;
            f.write_str(" {\n")?;
            write_branch(f, then_branch, indent + 1)?;
            pad(f, indent)?;
            f.write_str("} else {\n")?;
            write_branch(f, else_branch, indent + 1)?;
            pad(f, indent)?;
            f.write_char('}')
        }
        Expr::Seq(seq) => {
            f.write_str("{\n")?;
            write_seq(f, seq, indent + 1, false)?;
            pad(f, indent)?;
            f.write_char('}')
        }
    }
}

fn write_list(f: &mut impl Write, exprs: &[Expr], indent: usize) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_expr(f, expr, indent)?;
    }
    Ok(())
}

fn write_branch(f: &mut impl Write, branch: &Expr, indent: usize) -> fmt::Result {
    match branch {
        Expr::Seq(seq) => write_seq(f, seq, indent, false),
        other => {
            pad(f, indent)?;
            write_expr(f, other, indent)?;
            f.write_char('\n')
        }
    }
}

fn write_block(f: &mut impl Write, block: &BindingBlock, indent: usize) -> fmt::Result {
    let inner = if block.is_dataflow {
        pad(f, indent)?;
        f.write_str("dataflow {\n")?;
        indent + 1
    } else {
        indent
    };

    for binding in &block.bindings {
        pad(f, inner)?;
        match binding {
            Binding::Var(VarBinding { var, value }) => {
                write!(f, "{var} = ")?;
                write_expr(f, value, inner)?;
            }
            Binding::MatchShape(MatchShape {
                value,
                pattern,
                var,
            }) => {
                if let Some(var) = var {
                    write!(f, "{var} = ")?;
                }
                f.write_str("match_shape(")?;
                write_expr(f, value, inner)?;
                write!(f, ", {pattern})")?;
            }
        }
        f.write_char('\n')?;
    }

    if block.is_dataflow {
        pad(f, indent)?;
        f.write_str("}\n")?;
    }
    Ok(())
}

fn write_seq(f: &mut impl Write, seq: &SeqExpr, indent: usize, is_return: bool) -> fmt::Result {
    for block in &seq.blocks {
        write_block(f, block, indent)?;
    }
    pad(f, indent)?;
    if is_return {
        f.write_str("return ")?;
    }
    write_expr(f, &seq.body, indent)?;
    f.write_char('\n')
}

fn write_function(f: &mut impl Write, name: Option<&str>, func: &Function) -> fmt::Result {
    f.write_str("fn")?;
    if let Some(name) = name {
        write!(f, " @{name}")?;
    }
    let params = func
        .params
        .iter()
        .map(|param| {
            let mut out = param.to_string();
            if let Some(ty) = &param.ty {
                out.push_str(&format!(": {ty}"));
            }
            if let Some(shape) = &param.shape {
                out.push_str(&format!(" {shape}"));
            }
            out
        })
        .join(", ");
    write!(f, "({params})")?;
    if let Some(ret_type) = &func.ret_type {
        write!(f, " -> {ret_type}")?;
    }
    if !func.attrs.is_empty() {
        let attrs = func
            .attrs
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .join(", ");
        write!(f, " #[{attrs}]")?;
    }
    f.write_str(" {\n")?;
    match &func.body {
        Expr::Seq(seq) => write_seq(f, seq, 1, true)?,
        other => {
            pad(f, 1)?;
            f.write_str("return ")?;
            write_expr(f, other, 1)?;
            f.write_char('\n')?;
        }
    }
    f.write_char('}')
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Int(value) => write!(f, "{value}"),
            Dim::Sym(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for ShapeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(value) => write!(f, "{value}"),
            ConstValue::Int(value) => write!(f, "{value}"),
            ConstValue::Float(value) => write!(f, "{value:?}"),
            ConstValue::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => f.write_str("Object"),
            Type::Shape => f.write_str("Shape"),
            Type::Tensor { dtype, ndim } => {
                let dtype = dtype.as_deref().unwrap_or("_");
                match ndim {
                    Some(ndim) => write!(f, "Tensor[{dtype}, ndim={ndim}]"),
                    None => write!(f, "Tensor[{dtype}]"),
                }
            }
            Type::Tuple(fields) => write!(f, "({})", fields.iter().join(", ")),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, None, self)
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names().into_iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            match self.get(name) {
                Some(func) => write_function(f, Some(name), func)?,
                None => write!(f, "fn @{name} <undefined>")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for BuildOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutput::Function(func) => write!(f, "{func}"),
            BuildOutput::Module(module) => write!(f, "{module}"),
        }
    }
}
