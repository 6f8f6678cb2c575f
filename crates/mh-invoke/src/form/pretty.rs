use super::{Argument, Intrinsic, LambdaForm, Name, NamedFunction};
use itertools::Itertools;
use std::fmt::{Debug, Display, Formatter};

fn reference(arity: usize, index: usize) -> String {
    if index < arity {
        format!("a{}", index)
    } else {
        format!("t{}", index)
    }
}

fn format_argument(arity: usize, arg: &Argument) -> String {
    match arg {
        Argument::Name(index) => reference(arity, *index),
        Argument::Const(value) => format!("{:?}", value),
    }
}

fn format_name(arity: usize, name: &Name) -> String {
    let head = format!("{}:{}", reference(arity, name.index), name.ty);
    match &name.function {
        None => head,
        Some(function) => format!(
            "{}={}({})",
            head,
            function,
            name.arguments
                .iter()
                .map(|arg| format_argument(arity, arg))
                .join(",")
        ),
    }
}

impl Display for LambdaForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let params = self.names[..self.arity]
            .iter()
            .map(|name| format_name(self.arity, name))
            .join(",");
        writeln!(f, "{}=Lambda({})=>{{", self.debug_name(), params)?;
        for name in &self.names[self.arity..] {
            writeln!(f, "    {};", format_name(self.arity, name))?;
        }
        match self.result {
            Some(index) => write!(f, "    {}}}", reference(self.arity, index)),
            None => write!(f, "    void}}"),
        }
    }
}

impl Debug for LambdaForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LambdaForm({})", self.debug_name())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_name(0, self))
    }
}

impl Display for Intrinsic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Intrinsic::LinkToMember { ref_kind, .. } => write!(f, "linkTo.{}", ref_kind),
            Intrinsic::DelegateTarget => write!(f, "delegateTarget"),
            Intrinsic::CountDown => write!(f, "countDown"),
            Intrinsic::SelectAlternative => write!(f, "selectAlternative"),
            Intrinsic::GuardWithCatch(_) => write!(f, "guardWithCatch"),
            Intrinsic::Convert(conversion) => write!(f, "{}", conversion),
            Intrinsic::NewArray { array, count } => {
                write!(f, "newArray.{}[{}]", array.simple_name(), count)
            }
            Intrinsic::AllocArray { array } => write!(f, "allocArray.{}", array.simple_name()),
            Intrinsic::ArrayLoad { array } => write!(f, "aload.{}", array.simple_name()),
            Intrinsic::ArrayStore { array } => write!(f, "astore.{}", array.simple_name()),
            Intrinsic::ArrayLength => write!(f, "alength"),
            Intrinsic::CheckSpreadLength { len } => write!(f, "checkSpreadLength.{}", len),
            Intrinsic::Identity(ty) => write!(f, "identity_{}", ty),
            Intrinsic::Zero(ty) => write!(f, "zero_{}", ty),
            Intrinsic::Throw(_) => write!(f, "throw"),
            Intrinsic::CheckExactType(ty) => write!(f, "checkExactType{}", ty),
            Intrinsic::AsType(ty) => write!(f, "asType{}", ty),
        }
    }
}

impl Display for NamedFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedFunction::Member(call) => write!(f, "{}", call),
            NamedFunction::Handle(handle) => write!(f, "MH{}", handle.ty()),
            NamedFunction::InvokeBasic(ty) => write!(f, "invokeBasic{}", ty),
            NamedFunction::Getter { species, slot } => {
                let ty = species
                    .slot_type(*slot)
                    .map(|ty| ty.to_string())
                    .unwrap_or_default();
                write!(f, "arg{}{}", ty, slot)
            }
            NamedFunction::Intrinsic(intrinsic) => write!(f, "{}", intrinsic),
        }
    }
}

impl Debug for NamedFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::form::{FormBuilder, FormKind, Intrinsic};
    use mh_core::BasicType;

    #[test]
    fn forms_print_params_temporaries_and_result() {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::I]);
        let t = b.add(Intrinsic::Identity(BasicType::I), vec![b.param(1)]);
        let form = b.build(Some(t), FormKind::Identity).unwrap();
        assert_eq!(
            form.to_string(),
            "identity_LI_I=Lambda(a0:L,a1:I)=>{\n    t2:I=identity_I(a1);\n    t2}"
        );
    }
}
