//! the subset of Terraform's built-in functions available during static evaluation
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// A context with all supported functions declared
pub(crate) fn context() -> Context<'static> {
    let mut context = Context::new();

    context.declare_func(
        "merge",
        FuncDef::builder()
            .variadic_param(ParamType::Nullable(Box::new(ParamType::Object(Box::new(
                ParamType::Any,
            )))))
            .build(merge),
    );
    context.declare_func(
        "concat",
        FuncDef::builder()
            .variadic_param(ParamType::Array(Box::new(ParamType::Any)))
            .build(concat),
    );
    context.declare_func(
        "lookup",
        FuncDef::builder()
            .param(ParamType::Object(Box::new(ParamType::Any)))
            .param(ParamType::String)
            .variadic_param(ParamType::Any)
            .build(lookup),
    );
    context.declare_func(
        "coalesce",
        FuncDef::builder().variadic_param(ParamType::Any).build(coalesce),
    );
    context.declare_func(
        "length",
        FuncDef::builder().param(ParamType::Any).build(length),
    );
    context.declare_func(
        "lower",
        FuncDef::builder().param(ParamType::String).build(lower),
    );
    context.declare_func(
        "upper",
        FuncDef::builder().param(ParamType::String).build(upper),
    );
    context.declare_func(
        "tostring",
        FuncDef::builder().param(ParamType::Any).build(tostring),
    );

    context
}

fn merge(args: FuncArgs) -> Result<Value, String> {
    let mut merged = hcl::Map::new();
    for arg in args.iter() {
        if let Value::Object(object) = arg {
            merged.extend(object.clone());
        }
    }
    Ok(Value::Object(merged))
}

fn concat(args: FuncArgs) -> Result<Value, String> {
    let mut joined = vec![];
    for arg in args.iter() {
        if let Value::Array(items) = arg {
            joined.extend(items.iter().cloned());
        }
    }
    Ok(Value::Array(joined))
}

fn lookup(args: FuncArgs) -> Result<Value, String> {
    let (Some(Value::Object(map)), Some(Value::String(key))) = (args.first(), args.get(1)) else {
        return Err("lookup expects a map and a key".to_string());
    };

    match (map.get(key), args.get(2)) {
        (Some(value), _) => Ok(value.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(format!("lookup failed to find key {key:?}")),
    }
}

fn coalesce(args: FuncArgs) -> Result<Value, String> {
    args.iter()
        .find(|arg| !matches!(arg, Value::Null) && arg.as_str() != Some(""))
        .cloned()
        .ok_or_else(|| "no non-null, non-empty-string arguments".to_string())
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let len = match args.first() {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(object)) => object.len(),
        Some(Value::String(s)) => s.chars().count(),
        _ => return Err("length expects a collection or string".to_string()),
    };
    Ok(Value::from(len as u64))
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        _ => Err("lower expects a string".to_string()),
    }
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        _ => Err("upper expects a string".to_string()),
    }
}

fn tostring(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::String(s.clone())),
        Some(Value::Number(n)) => Ok(Value::String(n.to_string())),
        Some(Value::Bool(b)) => Ok(Value::String(b.to_string())),
        Some(Value::Null) => Ok(Value::Null),
        _ => Err("tostring expects a primitive value".to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hcl::eval::Evaluate;
    use pretty_assertions::assert_eq;

    fn eval(expr: &str) -> Value {
        let expr: hcl::Expression = hcl_edit::parser::parse_expr(expr).unwrap().into();
        expr.evaluate(&context()).unwrap()
    }

    #[test]
    fn functions() {
        assert_eq!(
            eval(r#"merge({a = 1, b = 2}, {b = 3})"#),
            hcl::value!({ a = 1, b = 3 })
        );
        assert_eq!(eval(r#"concat(["a"], ["b", "c"])"#), hcl::value!(["a", "b", "c"]));
        assert_eq!(eval(r#"lookup({a = "x"}, "b", "fallback")"#), Value::from("fallback"));
        assert_eq!(eval(r#"coalesce("", "second")"#), Value::from("second"));
        assert_eq!(eval(r#"length(["a", "b"])"#), Value::from(2u64));
        assert_eq!(eval(r#"upper("westeurope")"#), Value::from("WESTEUROPE"));
        assert_eq!(eval(r#"tostring(3)"#), Value::from("3"));
    }
}
