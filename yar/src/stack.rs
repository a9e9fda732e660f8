use crate::{Result, Value, VmError};

/// Bounded value stack. Stack bindings address it relative to a frame
/// pointer kept by the interpreter.
#[derive(Debug, Clone)]
pub struct Stack {
    values: Vec<Value>,
    capacity: usize,
}

impl Stack {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a stack preloaded with `values`, used by forks
    pub fn with_values(capacity: usize, values: &[Value]) -> Result<Self> {
        if values.len() > capacity {
            return Err(VmError::StackOverflow);
        }
        let mut stack = Self::new(capacity);
        stack.values.extend_from_slice(values);
        Ok(stack)
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the active portion of the stack
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Pushes a value onto the stack
    pub fn push(&mut self, value: Value) -> Result<()> {
        if self.values.len() >= self.capacity {
            return Err(VmError::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops a value from the stack
    pub fn pop(&mut self) -> Result<Value> {
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(VmError::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// Drops everything above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.values.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop() {
        let mut stack = Stack::new(2);
        stack.push(Value::Integer(1)).unwrap();
        stack.push(Value::Integer(2)).unwrap();
        assert_eq!(stack.push(Value::None), Err(VmError::StackOverflow));
        assert_eq!(stack.pop().unwrap(), Value::Integer(2));
        assert_eq!(stack.pop().unwrap(), Value::Integer(1));
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn preloaded_stack() {
        let values = [Value::Integer(42), Value::Integer(41)];
        let stack = Stack::with_values(4, &values).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.get(0), Some(Value::Integer(42)));
        assert!(Stack::with_values(1, &values).is_err());
    }

    #[test]
    fn set_outside_active_portion_fails() {
        let mut stack = Stack::new(4);
        stack.push(Value::None).unwrap();
        stack.set(0, Value::Integer(3)).unwrap();
        assert_eq!(stack.set(1, Value::None), Err(VmError::StackUnderflow));
        stack.truncate(0);
        assert_eq!(stack.depth(), 0);
    }
}
