use crate::{NativeContext, Result, Value};

/// `print value` writes the form of the value to stdout and returns it
pub fn print(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let value = ctx.next()?;
    println!("{}", ctx.vm.form(value)?);
    Ok(value)
}
