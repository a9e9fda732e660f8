use crate::{FrameScope, NativeContext, Proc, Result, Value, VmError};

/// `either cond [then] [else]`, only the chosen branch runs
pub fn either(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let cond = ctx.next_boolean()?;
    let then = ctx.next_block()?;
    let otherwise = ctx.next_block()?;
    ctx.vm.run_block(if cond { then } else { otherwise })
}

/// `fn [params] [body]` rebinds the body so each parameter resolves to
/// its slot in the frame the call will push.
pub fn function(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let params = ctx.next_block()?;
    let body = ctx.next_block()?;

    let symbols = ctx
        .vm
        .heap()
        .block_values(params)?
        .into_iter()
        .map(|param| param.as_word().map(|word| word.symbol))
        .collect::<Result<Vec<_>>>()?;
    let stack_size =
        u32::try_from(symbols.len()).map_err(|_| VmError::StackOverflow)?;

    ctx.vm.bind_with(body, &mut FrameScope::new(symbols))?;
    let first = ctx.vm.heap().block_first(body)?;
    Ok(Value::Proc(Proc { stack_size, first }))
}

/// `do [block]`
pub fn run(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let block = ctx.next_block()?;
    ctx.vm.run_block(block)
}

/// `foreach word series [body]`, iterates over the series as it was when
/// the loop started
pub fn foreach(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let word = ctx.next_raw()?.as_word()?;
    let series = ctx.next_block()?;
    let body = ctx.next_block()?;
    let items = ctx.vm.heap().block_values(series)?;

    ctx.vm.with_loop_slot(word.symbol, body, |vm, slot| {
        let mut result = Value::None;
        for item in items {
            vm.set_stack_slot(slot, item)?;
            result = vm.run_block(body)?;
        }
        Ok(result)
    })
}

/// `repeat word count [body]`, the word counts from 1
pub fn repeat(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let word = ctx.next_raw()?.as_word()?;
    let count = ctx.next_integer()?;
    let body = ctx.next_block()?;

    ctx.vm.with_loop_slot(word.symbol, body, |vm, slot| {
        let mut result = Value::None;
        for i in 1..=count {
            vm.set_stack_slot(slot, Value::Integer(i))?;
            result = vm.run_block(body)?;
        }
        Ok(result)
    })
}
