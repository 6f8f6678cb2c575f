use super::{Argument, LambdaForm};
use mh_core::{internal, Result, Value};

impl LambdaForm {
    /// Evaluates the names in order. Each argument is either an earlier
    /// name's value or a constant; the result name's value is returned, or
    /// `Void` for forms without one.
    pub fn interpret(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.arity {
            internal!(
                "{} takes {} arguments, got {}",
                self.debug_name(),
                self.arity,
                args.len()
            );
        }
        let mut values = Vec::with_capacity(self.names.len());
        values.extend_from_slice(args);
        for name in &self.names[self.arity..] {
            let actuals = name
                .arguments
                .iter()
                .map(|arg| match arg {
                    Argument::Name(index) => values[*index].clone(),
                    Argument::Const(value) => value.clone(),
                })
                .collect::<Vec<_>>();
            let Some(function) = &name.function else {
                internal!("name {} of {} has no function", name.index, self.debug_name());
            };
            values.push(function.invoke(&actuals)?);
        }
        Ok(match self.result {
            Some(index) => values[index].clone(),
            None => Value::Void,
        })
    }
}
