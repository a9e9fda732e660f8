use crate::{NativeContext, Result, Value};

/// `append series value` appends in place and returns the series
pub fn append(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let series = ctx.next_block()?;
    let value = ctx.next()?;
    ctx.vm.heap_mut()?.block_append(series, value)?;
    Ok(Value::Block(series))
}

pub fn length(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let series = ctx.next_block()?;
    let len = ctx.vm.heap().block_len(series)?;
    Value::integer(i64::try_from(len).unwrap_or(i64::MAX))
}
