use crate::{Binding, DictScope, NativeContext, Result, Value, WordRef};

/// `make-object [body]`: every top level set-word of the body becomes a
/// field, the body is bound against the new dictionary and run once.
pub fn make_object(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let body = ctx.next_block()?;
    let dict = ctx.vm.heap_mut()?.alloc_dictionary()?;

    for value in ctx.vm.heap().block_values(body)? {
        if let Value::SetWord(word) = value {
            ctx.vm.heap_mut()?.dict_put(dict, word.symbol, Value::None)?;
        }
    }
    ctx.vm.bind_with(body, &mut DictScope::object(dict))?;
    ctx.vm.run_block(body)?;
    Ok(Value::Dictionary(dict))
}

/// `in object 'word` gives a word bound to the object's field, or `none`
/// when the object has no such field
pub fn in_object(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let dict = ctx.next_dictionary()?;
    let word = ctx.next()?.as_word()?;
    let Some(slot) = ctx.vm.heap().dict_find(dict, word.symbol)? else {
        return Ok(Value::None);
    };
    let binding = ctx.vm.heap_mut()?.alloc_binding(Some(Binding::Map(slot)))?;
    Ok(Value::Word(WordRef {
        symbol: word.symbol,
        binding,
    }))
}

/// `get 'word` reads a word without invoking it, unbound words give `none`
pub fn get(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let word = ctx.next()?.as_word()?;
    match ctx.vm.binding_of(word.binding)? {
        Some(binding) => ctx.vm.load_binding(binding),
        None => Ok(Value::None),
    }
}

pub fn none(_ctx: &mut NativeContext<'_>) -> Result<Value> {
    Ok(Value::None)
}
