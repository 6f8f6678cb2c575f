//! Lambda forms: the straight-line programs behind every handle.
//!
//! A form is a list of [`Name`]s. The first `arity` names are parameters,
//! parameter 0 always being the handle being invoked. Every later name
//! applies a [`NamedFunction`] to earlier names or constants. Forms are
//! immutable once built apart from their invocation counter, the compiled
//! entry point published at most once, and the cache of edited forms.

mod editor;
mod function;
mod interpret;
mod pretty;

pub use editor::TransformKey;
pub(crate) use editor::*;
pub(crate) use function::check_spread_length;
pub use function::{Intrinsic, NamedFunction};

use crate::codegen;
use crate::linker::{ExecutableLinker, ExecutableRef};
use crate::runtime;
use derive_more::From;
use mh_core::collections::ConcurrentMap;
use mh_core::config;
use mh_core::{debug, internal, warn, BasicType, Error, RefKind, Result, TypeDescriptor, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

pub type FormRef = Arc<LambdaForm>;

/// Edited forms remembered per source form.
const TRANSFORM_CACHE_LIMIT: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, From)]
pub enum Argument {
    Name(usize),
    Const(Value),
}

impl Argument {
    pub fn name_index(&self) -> Option<usize> {
        match self {
            Argument::Name(index) => Some(*index),
            Argument::Const(_) => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name {
    index: usize,
    ty: BasicType,
    function: Option<NamedFunction>,
    arguments: Vec<Argument>,
}

impl Name {
    pub fn param(index: usize, ty: BasicType) -> Name {
        Name {
            index,
            ty,
            function: None,
            arguments: Vec::new(),
        }
    }

    pub fn new(index: usize, function: NamedFunction, arguments: Vec<Argument>) -> Name {
        Name {
            index,
            ty: function.return_type(),
            function: Some(function),
            arguments,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ty(&self) -> BasicType {
        self.ty
    }

    pub fn function(&self) -> Option<&NamedFunction> {
        self.function.as_ref()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn is_param(&self) -> bool {
        self.function.is_none()
    }

    pub(crate) fn with_function(mut self, function: NamedFunction) -> Name {
        self.ty = function.return_type();
        self.function = Some(function);
        self
    }

    pub(crate) fn map_arguments(mut self, mut f: impl FnMut(&Argument) -> Argument) -> Name {
        self.arguments = self.arguments.iter().map(&mut f).collect();
        self
    }

    fn refers_to(&self, index: usize) -> bool {
        self.arguments
            .iter()
            .any(|arg| arg.name_index() == Some(index))
    }
}

/// What a form was built for; only used for naming and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    DirectInvoke(RefKind),
    Reinvoker,
    Delegate,
    Counting,
    Convert,
    Identity,
    Constant,
    Zero,
    Throw,
    GuardWithTest,
    GuardWithCatch,
    ArrayOp,
    Collector,
    Invoker,
    ExactInvoker,
    Edited,
    Customized,
    Interpreted,
}

impl FormKind {
    pub fn name(self) -> &'static str {
        match self {
            FormKind::DirectInvoke(_) => "DMH",
            FormKind::Reinvoker => "BMH.reinvoke",
            FormKind::Delegate => "DelegatingMH",
            FormKind::Counting => "CountingWrapper",
            FormKind::Convert => "convert",
            FormKind::Identity => "identity",
            FormKind::Constant => "constant",
            FormKind::Zero => "zero",
            FormKind::Throw => "throw",
            FormKind::GuardWithTest => "guard",
            FormKind::GuardWithCatch => "guardWithCatch",
            FormKind::ArrayOp => "array",
            FormKind::Collector => "collector",
            FormKind::Invoker => "invoker",
            FormKind::ExactInvoker => "exactInvoker",
            FormKind::Edited => "BMH",
            FormKind::Customized => "customized",
            FormKind::Interpreted => "interpreted",
        }
    }
}

pub(crate) enum CompiledEntry {
    Linked(ExecutableRef),
    Rejected(Error),
}

pub struct LambdaForm {
    arity: usize,
    names: Box<[Name]>,
    result: Option<usize>,
    kind: FormKind,
    interpret_only: bool,
    invocation_count: AtomicI32,
    entry: OnceLock<CompiledEntry>,
    transforms: Mutex<Vec<(TransformKey, FormRef)>>,
}

impl LambdaForm {
    /// Builds a form from names that may carry ids from another numbering.
    /// Ids are rewritten to positions; every argument must refer to an
    /// earlier name.
    pub fn new(
        arity: usize,
        names: Vec<Name>,
        result: Option<usize>,
        kind: FormKind,
    ) -> Result<FormRef> {
        let (names, result) = normalize(arity, names, result)?;
        Ok(Arc::new(LambdaForm {
            arity,
            names: names.into_boxed_slice(),
            result,
            kind,
            interpret_only: false,
            invocation_count: AtomicI32::new(0),
            entry: OnceLock::new(),
            transforms: Mutex::new(Vec::new()),
        }))
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn names(&self) -> &[Name] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&Name> {
        self.names.get(index)
    }

    pub fn result(&self) -> Option<usize> {
        self.result
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn parameter_types(&self) -> Vec<BasicType> {
        self.names[..self.arity].iter().map(Name::ty).collect()
    }

    pub fn return_type(&self) -> BasicType {
        match self.result {
            Some(index) => self.names[index].ty,
            None => BasicType::V,
        }
    }

    /// `LII_I`-style signature over all parameters, the handle included.
    pub fn basic_signature(&self) -> String {
        format!(
            "{}_{}",
            BasicType::signature(&self.parameter_types()),
            self.return_type()
        )
    }

    pub fn method_type(&self) -> Result<TypeDescriptor> {
        TypeDescriptor::of_basic(self.return_type(), &self.parameter_types())
    }

    pub fn debug_name(&self) -> String {
        format!("{}_{}", self.kind.name(), self.basic_signature())
    }

    pub fn expression_count(&self) -> usize {
        self.names.len() - self.arity
    }

    /// Whether any name or the result refers to name `index`.
    pub fn is_used(&self, index: usize) -> bool {
        self.result == Some(index) || self.names.iter().any(|name| name.refers_to(index))
    }

    /// How often each name is referenced, the result counting once.
    pub fn use_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.names.len()];
        for name in self.names.iter() {
            for arg in &name.arguments {
                if let Some(index) = arg.name_index() {
                    counts[index] += 1;
                }
            }
        }
        if let Some(result) = self.result {
            counts[result] += 1;
        }
        counts
    }

    pub fn invocation_count(&self) -> i32 {
        self.invocation_count.load(Ordering::Relaxed)
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.entry.get(), Some(CompiledEntry::Linked(_)))
    }

    pub fn compiled(&self) -> Option<ExecutableRef> {
        match self.entry.get() {
            Some(CompiledEntry::Linked(executable)) => Some(executable.clone()),
            _ => None,
        }
    }

    /// Runs the form. Interprets until the compile threshold is reached,
    /// then uses the compiled entry point; a failed compilation leaves the
    /// form interpreted for good.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match self.entry.get() {
            Some(CompiledEntry::Linked(executable)) => {
                return runtime::services().linker.invoke_native(executable, args)
            }
            Some(CompiledEntry::Rejected(_)) => return self.interpret(args),
            None => {}
        }
        if !self.interpret_only {
            let threshold = config::global().compile_threshold;
            if threshold >= 0 {
                let count = self.invocation_count.fetch_add(1, Ordering::Relaxed);
                if count >= threshold {
                    if let CompiledEntry::Linked(executable) = self.publish_compiled() {
                        return runtime::services().linker.invoke_native(executable, args);
                    }
                }
            }
        }
        self.interpret(args)
    }

    fn publish_compiled(&self) -> &CompiledEntry {
        self.entry.get_or_init(|| match codegen::compile(self) {
            Ok(executable) => {
                debug!(
                    "compiled {} after {} invocations",
                    self.debug_name(),
                    self.invocation_count()
                );
                CompiledEntry::Linked(executable)
            }
            Err(err) => {
                warn!("{} stays interpreted: {}", self.debug_name(), err);
                CompiledEntry::Rejected(err)
            }
        })
    }

    /// Compiles now with the installed linker, failing with the linker's
    /// error instead of falling back.
    pub fn compile(&self) -> Result<ExecutableRef> {
        self.compile_with(runtime::services().linker.as_ref())
    }

    pub fn compile_with(&self, linker: &dyn ExecutableLinker) -> Result<ExecutableRef> {
        match self.entry.get() {
            Some(CompiledEntry::Linked(executable)) => return Ok(executable.clone()),
            Some(CompiledEntry::Rejected(err)) => return Err(err.clone()),
            None => {}
        }
        let outcome = codegen::compile_with(self, linker);
        let entry = self.entry.get_or_init(|| match &outcome {
            Ok(executable) => CompiledEntry::Linked(executable.clone()),
            Err(err) => CompiledEntry::Rejected(err.clone()),
        });
        match entry {
            CompiledEntry::Linked(executable) => Ok(executable.clone()),
            CompiledEntry::Rejected(err) => Err(err.clone()),
        }
    }

    /// A copy of this form that never compiles, for the interpreter stub of
    /// forms too large to lower.
    pub(crate) fn interpreted_copy(&self) -> FormRef {
        Arc::new(LambdaForm {
            arity: self.arity,
            names: self.names.clone(),
            result: self.result,
            kind: FormKind::Interpreted,
            interpret_only: true,
            invocation_count: AtomicI32::new(0),
            entry: OnceLock::new(),
            transforms: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn cached_transform(
        self: &Arc<Self>,
        key: TransformKey,
        make: impl FnOnce() -> Result<FormRef>,
    ) -> Result<FormRef> {
        if let Some(found) = self.find_transform(&key) {
            return Ok(found);
        }
        let form = make()?;
        let mut transforms = self.transforms.lock();
        if let Some((_, existing)) = transforms.iter().find(|(k, _)| *k == key) {
            return Ok(existing.clone());
        }
        if transforms.len() >= TRANSFORM_CACHE_LIMIT {
            transforms.remove(0);
        }
        transforms.push((key, form.clone()));
        Ok(form)
    }

    fn find_transform(&self, key: &TransformKey) -> Option<FormRef> {
        self.transforms
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, form)| form.clone())
    }
}

impl PartialEq for LambdaForm {
    fn eq(&self, other: &Self) -> bool {
        self.arity == other.arity && self.result == other.result && self.names == other.names
    }
}

impl Eq for LambdaForm {}

impl Hash for LambdaForm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.arity.hash(state);
        self.result.hash(state);
        self.names.hash(state);
    }
}

fn normalize(
    arity: usize,
    mut names: Vec<Name>,
    result: Option<usize>,
) -> Result<(Vec<Name>, Option<usize>)> {
    if arity == 0 || arity > names.len() {
        internal!("form arity {} with {} names", arity, names.len());
    }
    let mut positions: HashMap<usize, usize> = HashMap::with_capacity(names.len());
    for (pos, name) in names.iter().enumerate() {
        if (pos < arity) != name.is_param() {
            internal!(
                "name {} at position {} is misplaced for arity {}",
                name.index,
                pos,
                arity
            );
        }
        for arg in &name.arguments {
            if let Argument::Name(id) = arg {
                if !positions.contains_key(id) {
                    internal!("name {} refers forward to {}", name.index, id);
                }
            }
        }
        if positions.insert(name.index, pos).is_some() {
            internal!("duplicate name id {}", name.index);
        }
    }
    let renumber = positions.iter().any(|(id, pos)| id != pos);
    if renumber {
        for (pos, name) in names.iter_mut().enumerate() {
            name.index = pos;
            for arg in name.arguments.iter_mut() {
                if let Argument::Name(id) = arg {
                    *id = positions[&*id];
                }
            }
        }
    }
    let result = match result {
        Some(id) => match positions.get(&id) {
            Some(pos) => Some(*pos),
            None => internal!("result {} is not a name", id),
        },
        None => None,
    };
    if let Some(pos) = result {
        if names[pos].ty.is_void() {
            internal!("result name {} is void", pos);
        }
    }
    for name in &names[arity..] {
        let types = name
            .arguments
            .iter()
            .map(|arg| match arg {
                Argument::Name(index) => names[*index].ty,
                Argument::Const(value) => value.basic_type(),
            })
            .collect::<Vec<_>>();
        if let Some(function) = &name.function {
            function.check_arguments(&types)?;
        }
    }
    Ok((names, result))
}

/// Appends names to a form under construction; ids are positions.
pub struct FormBuilder {
    arity: usize,
    names: Vec<Name>,
}

impl FormBuilder {
    pub fn new(params: &[BasicType]) -> Self {
        Self {
            arity: params.len(),
            names: params
                .iter()
                .enumerate()
                .map(|(index, ty)| Name::param(index, *ty))
                .collect(),
        }
    }

    /// Parameters of a handle of type `ty`, preceded by the handle itself.
    pub fn for_handle_type(ty: &TypeDescriptor) -> Self {
        let mut params = vec![BasicType::L];
        params.extend(ty.parameter_basic_types());
        Self::new(&params)
    }

    pub fn param(&self, index: usize) -> Argument {
        Argument::Name(index)
    }

    pub fn params(&self, range: std::ops::Range<usize>) -> Vec<Argument> {
        range.map(Argument::Name).collect()
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn add(&mut self, function: impl Into<NamedFunction>, arguments: Vec<Argument>) -> usize {
        let index = self.names.len();
        self.names.push(Name::new(index, function.into(), arguments));
        index
    }

    pub fn ty(&self, index: usize) -> BasicType {
        self.names[index].ty
    }

    pub fn build(self, result: Option<usize>, kind: FormKind) -> Result<FormRef> {
        LambdaForm::new(self.arity, self.names, result, kind)
    }
}

static CANONICAL_FORMS: Lazy<ConcurrentMap<(FormKind, String), FormRef>> =
    Lazy::new(ConcurrentMap::new);

/// Process-wide cache for forms that depend only on a kind and a basic
/// signature.
pub(crate) fn canonical_form(
    kind: FormKind,
    signature: String,
    make: impl FnOnce() -> Result<FormRef>,
) -> Result<FormRef> {
    CANONICAL_FORMS.try_get_or_insert_with((kind, signature), make)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_core::PrimitiveKind;

    fn add_one() -> FormRef {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::I]);
        let boxed = b.add(
            Intrinsic::Convert(crate::convert::ValueConversion::Box(PrimitiveKind::Int)),
            vec![b.param(1)],
        );
        let back = b.add(
            Intrinsic::Convert(crate::convert::ValueConversion::UnboxBasic(BasicType::I)),
            vec![Argument::Name(boxed)],
        );
        b.build(Some(back), FormKind::Convert).unwrap()
    }

    #[test]
    fn forward_references_are_rejected() {
        let names = vec![
            Name::param(0, BasicType::L),
            Name::new(
                1,
                Intrinsic::Identity(BasicType::I).into(),
                vec![Argument::Name(2)],
            ),
            Name::param(2, BasicType::I),
        ];
        assert!(LambdaForm::new(1, names, Some(1), FormKind::Identity).is_err());
    }

    #[test]
    fn ids_from_another_numbering_are_renumbered() {
        let names = vec![
            Name::param(7, BasicType::L),
            Name::param(3, BasicType::I),
            Name::new(
                42,
                Intrinsic::Identity(BasicType::I).into(),
                vec![Argument::Name(3)],
            ),
        ];
        let form = LambdaForm::new(2, names, Some(42), FormKind::Identity).unwrap();
        assert_eq!(form.result(), Some(2));
        assert_eq!(form.names()[2].arguments(), &[Argument::Name(1)]);
        assert_eq!(form.basic_signature(), "LI_I");
    }

    #[test]
    fn argument_types_are_checked() {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::J]);
        b.add(Intrinsic::Identity(BasicType::I), vec![b.param(1)]);
        assert!(b.build(None, FormKind::Identity).is_err());
    }

    #[test]
    fn structurally_equal_forms_compare_equal() {
        assert!(*add_one() == *add_one());
        assert_eq!(add_one().use_counts(), vec![0, 1, 1, 1]);
        assert_eq!(
            add_one().interpret(&[Value::Null, Value::Int(4)]).unwrap(),
            Value::Int(4)
        );
    }
}
