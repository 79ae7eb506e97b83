use ir_scope_builder::ir::{
    BuildOutput, Expr, Function, Type, Var,
    builder::{BuilderError, IRBuilder},
};

/// `fn(x) { y = add(x, x); return y }`
#[allow(unused)]
pub fn build_add_function() -> Result<BuildOutput, BuilderError> {
    let mut builder = IRBuilder::new();
    let f = builder.open_function()?;
    let x = builder.arg("x", Type::Object)?;
    builder.open_block()?;
    let y = builder.emit(Expr::call("add", vec![x.clone().into(), x.into()]), false)?;
    let y = builder.name_var("y", &y)?;
    builder.func_ret_value(y.into())?;
    builder.close(f)?;
    builder.finish()
}

/// Adds a branch to an open `if` frame, binding `value` to `name` and returning it.
#[allow(unused)]
pub fn branch(
    builder: &mut IRBuilder,
    is_then: bool,
    name: &str,
    value: Expr,
) -> Result<Var, BuilderError> {
    let id = if is_then {
        builder.open_then()?
    } else {
        builder.open_else()?
    };
    builder.open_block()?;
    let var = builder.emit(value, false)?;
    let var = builder.name_var(name, &var)?;
    builder.func_ret_value(var.clone().into())?;
    builder.close(id)?;
    Ok(var)
}

/// A named function returning `value`, closed inside whatever frame is open.
#[allow(unused)]
pub fn define_function(builder: &mut IRBuilder, name: &str, value: Expr) -> Result<(), BuilderError> {
    let f = builder.open_function()?;
    builder.func_name(name)?;
    builder.open_block()?;
    let var = builder.emit(value, false)?;
    builder.func_ret_value(var.into())?;
    builder.close(f)
}

#[allow(unused)]
pub fn unwrap_function(output: &BuildOutput) -> &Function {
    output
        .as_function()
        .unwrap_or_else(|| panic!("expected a function, got {output:#?}"))
}
