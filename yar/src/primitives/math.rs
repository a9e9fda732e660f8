use crate::{NativeContext, Result, Value, VmError};

fn operands(ctx: &mut NativeContext<'_>) -> Result<(i64, i64)> {
    let x = ctx.next_integer()?;
    let y = ctx.next_integer()?;
    Ok((x, y))
}

pub fn add(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let (x, y) = operands(ctx)?;
    Value::integer(x.checked_add(y).ok_or(VmError::IntegerOverflow)?)
}

pub fn sub(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let (x, y) = operands(ctx)?;
    Value::integer(x.checked_sub(y).ok_or(VmError::IntegerOverflow)?)
}

pub fn mul(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let (x, y) = operands(ctx)?;
    Value::integer(x.checked_mul(y).ok_or(VmError::IntegerOverflow)?)
}

pub fn gt(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let (x, y) = operands(ctx)?;
    Ok(Value::Boolean(x > y))
}

pub fn lt(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let (x, y) = operands(ctx)?;
    Ok(Value::Boolean(x < y))
}

/// Strings compare by content, everything else by value or identity
pub fn eq(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let x = ctx.next()?;
    let y = ctx.next()?;
    let equal = match (x, y) {
        (Value::String(a), Value::String(b)) => {
            let heap = ctx.vm.heap();
            heap.read_string(a)? == heap.read_string(b)?
        }
        (a, b) => a == b,
    };
    Ok(Value::Boolean(equal))
}

#[cfg(test)]
mod tests {
    use crate::{MAX_INTEGER, Value, Vm, VmCreateInfo, VmError};

    fn eval(source: &str) -> Result<Value, VmError> {
        Vm::new(&VmCreateInfo::default())?.execute(source)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("add 1 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("sub 1 2").unwrap(), Value::Integer(-1));
        assert_eq!(eval("mul 6 7").unwrap(), Value::Integer(42));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("gt 2 1").unwrap(), Value::Boolean(true));
        assert_eq!(eval("gt 1 1").unwrap(), Value::Boolean(false));
        assert_eq!(eval("lt 1 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("eq 3 add 1 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("eq \"ab\" \"ab\"").unwrap(), Value::Boolean(true));
        assert_eq!(eval("eq true 1").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn results_stay_in_56_bits() {
        let source = format!("add {MAX_INTEGER} 1");
        assert_eq!(eval(&source), Err(VmError::IntegerOverflow));
        let source = format!("mul {MAX_INTEGER} {MAX_INTEGER}");
        assert_eq!(eval(&source), Err(VmError::IntegerOverflow));
    }
}
