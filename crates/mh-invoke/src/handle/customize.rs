use super::{CallHandle, HandleKind};
use crate::form::{Argument, FormBuilder, FormKind, FormRef, Intrinsic, LambdaForm, Name, NamedFunction};
use mh_core::Result;
use std::collections::HashMap;

/// A form specialized to one handle: captured values become constants and
/// invocations of constant handles call them directly.
pub(super) fn customized_form(handle: &CallHandle) -> Result<FormRef> {
    match handle.kind() {
        HandleKind::Direct(call) => {
            let ty = handle.ty();
            let mut b = FormBuilder::for_handle_type(ty);
            let result = b.add(NamedFunction::Member(call.clone()), b.params(1..b.arity()));
            b.build(
                (!ty.return_type().is_void()).then_some(result),
                FormKind::Customized,
            )
        }
        HandleKind::Bound(captured) => {
            let form = handle.base_form();
            let mut constants: HashMap<usize, Argument> = HashMap::new();
            let mut names = Vec::with_capacity(form.names().len());
            for name in form.names() {
                if name.is_param() {
                    names.push(name.clone());
                    continue;
                }
                let name = name.clone().map_arguments(|arg| match arg {
                    Argument::Name(index) => constants.get(index).cloned().unwrap_or_else(|| arg.clone()),
                    constant => constant.clone(),
                });
                let index = name.index();
                match name.function() {
                    Some(NamedFunction::Getter { slot, .. })
                        if name.arguments() == [Argument::Name(0)] =>
                    {
                        let value = captured.get(*slot)?;
                        if form.result() == Some(index) {
                            names.push(Name::new(
                                index,
                                Intrinsic::Identity(name.ty()).into(),
                                vec![Argument::Const(value)],
                            ));
                        } else {
                            constants.insert(index, Argument::Const(value));
                        }
                    }
                    Some(NamedFunction::InvokeBasic(ty)) => {
                        let callee = match name.arguments().first() {
                            Some(Argument::Const(value)) => CallHandle::from_value(value).ok(),
                            _ => None,
                        };
                        match callee {
                            Some(callee) if callee.ty().basic_type() == *ty => {
                                let args = name.arguments()[1..].to_vec();
                                names.push(Name::new(index, NamedFunction::Handle(callee), args));
                            }
                            _ => names.push(name),
                        }
                    }
                    _ => names.push(name),
                }
            }
            LambdaForm::new(form.arity(), names, form.result(), FormKind::Customized)
        }
        _ => Ok(handle.base_form().clone()),
    }
}
