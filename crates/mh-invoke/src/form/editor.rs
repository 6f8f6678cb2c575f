//! Derives new forms from existing ones.
//!
//! Every edit is cached on the source form under a [`TransformKey`], so
//! handles built by the same combinator over the same form share the
//! result. Edits that add a captured value take the extended species; the
//! getters of the source form are re-pointed to it.

use super::{Argument, FormKind, FormRef, Intrinsic, LambdaForm, Name, NamedFunction};
use crate::species::Species;
use mh_core::{internal, BasicType, ClassRef, Result, TypeDescriptor, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKey {
    BindArgument {
        pos: usize,
        species: String,
    },
    AddArgument {
        pos: usize,
        ty: BasicType,
    },
    DropArguments {
        pos: usize,
        count: usize,
    },
    PermuteArguments {
        skip: usize,
        reorder: Vec<usize>,
        types: Vec<BasicType>,
    },
    FilterArgument {
        pos: usize,
        filter: TypeDescriptor,
        species: String,
    },
    FilterReturn {
        filter: TypeDescriptor,
        species: String,
    },
    CollectArguments {
        pos: usize,
        collector: TypeDescriptor,
        species: String,
    },
    FoldArguments {
        pos: usize,
        combiner: TypeDescriptor,
        species: String,
    },
    SpreadArguments {
        pos: usize,
        array: ClassRef,
        count: usize,
    },
}

/// Substitutes references to old names and re-points getters.
struct Rewrite {
    subst: HashMap<usize, Argument>,
    species: Option<Arc<Species>>,
}

impl Rewrite {
    fn new(species: Option<&Arc<Species>>) -> Self {
        Self {
            subst: HashMap::new(),
            species: species.cloned(),
        }
    }

    fn replace(&mut self, old: usize, new: usize) {
        self.subst.insert(old, Argument::Name(new));
    }

    fn apply(&self, name: &Name) -> Name {
        let name = name.clone().map_arguments(|arg| match arg {
            Argument::Name(index) => self
                .subst
                .get(index)
                .cloned()
                .unwrap_or_else(|| arg.clone()),
            constant => constant.clone(),
        });
        let getter_slot = match name.function() {
            Some(NamedFunction::Getter { slot, .. }) => Some(*slot),
            _ => None,
        };
        match (&self.species, getter_slot) {
            (Some(species), Some(slot)) => name.with_function(NamedFunction::Getter {
                species: species.clone(),
                slot,
            }),
            _ => name,
        }
    }

    fn apply_all<'a>(&'a self, names: &'a [Name]) -> impl Iterator<Item = Name> + 'a {
        names.iter().map(|name| self.apply(name))
    }

    fn result(&self, result: Option<usize>) -> Result<Option<usize>> {
        match result {
            None => Ok(None),
            Some(index) => match self.subst.get(&index) {
                None => Ok(Some(index)),
                Some(Argument::Name(new)) => Ok(Some(*new)),
                Some(Argument::Const(_)) => internal!("result {} replaced by a constant", index),
            },
        }
    }
}

fn params(form: &LambdaForm) -> &[Name] {
    &form.names[..form.arity]
}

fn temps(form: &LambdaForm) -> &[Name] {
    &form.names[form.arity..]
}

fn last_slot(species: &Species) -> Result<usize> {
    match species.slot_count() {
        0 => internal!("{} has no slot to bind", species),
        n => Ok(n - 1),
    }
}

fn check_param(form: &LambdaForm, pos: usize) -> Result<BasicType> {
    if pos == 0 || pos >= form.arity {
        internal!("{} has no argument {}", form.debug_name(), pos);
    }
    Ok(form.names[pos].ty)
}

/// Replaces parameter `pos` by the last slot of `species`.
pub(crate) fn bind_argument_form(
    form: &FormRef,
    pos: usize,
    species: &Arc<Species>,
) -> Result<FormRef> {
    let key = TransformKey::BindArgument {
        pos,
        species: species.signature().to_string(),
    };
    form.cached_transform(key, || {
        let ty = check_param(form, pos)?;
        let slot = last_slot(species)?;
        if species.slot_type(slot) != Some(ty) {
            internal!("cannot bind {} argument {} into {}", ty, pos, species);
        }
        let n = form.names.len();
        let mut rewrite = Rewrite::new(Some(species));
        rewrite.replace(pos, n);
        let mut names: Vec<Name> = params(form)
            .iter()
            .filter(|name| name.index != pos)
            .cloned()
            .collect();
        names.push(Name::new(n, species.getter(slot)?, vec![Argument::Name(0)]));
        names.extend(rewrite.apply_all(temps(form)));
        LambdaForm::new(form.arity - 1, names, rewrite.result(form.result)?, FormKind::Edited)
    })
}

/// Inserts an ignored parameter of type `ty` before parameter `pos`.
pub(crate) fn add_argument_form(form: &FormRef, pos: usize, ty: BasicType) -> Result<FormRef> {
    form.cached_transform(TransformKey::AddArgument { pos, ty }, || {
        if pos == 0 || pos > form.arity {
            internal!("cannot add argument {} to {}", pos, form.debug_name());
        }
        let mut names = params(form)[..pos].to_vec();
        names.push(Name::param(form.names.len(), ty));
        names.extend_from_slice(&params(form)[pos..]);
        names.extend_from_slice(temps(form));
        LambdaForm::new(form.arity + 1, names, form.result, FormKind::Edited)
    })
}

/// Removes `count` unused parameters starting at `pos`.
pub(crate) fn drop_arguments_form(form: &FormRef, pos: usize, count: usize) -> Result<FormRef> {
    form.cached_transform(TransformKey::DropArguments { pos, count }, || {
        if pos == 0 || pos + count > form.arity {
            internal!("cannot drop {} arguments at {} from {}", count, pos, form.debug_name());
        }
        if let Some(used) = (pos..pos + count).find(|index| form.is_used(*index)) {
            internal!("argument {} of {} is in use", used, form.debug_name());
        }
        let mut names = params(form)[..pos].to_vec();
        names.extend_from_slice(&params(form)[pos + count..]);
        names.extend_from_slice(temps(form));
        LambdaForm::new(form.arity - count, names, form.result, FormKind::Edited)
    })
}

/// Parameter `skip + i` of the old form becomes parameter
/// `skip + reorder[i]` of a form taking `types` after the first `skip`.
pub(crate) fn permute_arguments_form(
    form: &FormRef,
    skip: usize,
    reorder: &[usize],
    types: &[BasicType],
) -> Result<FormRef> {
    let key = TransformKey::PermuteArguments {
        skip,
        reorder: reorder.to_vec(),
        types: types.to_vec(),
    };
    form.cached_transform(key, || {
        if skip + reorder.len() != form.arity {
            internal!("reorder of length {} for {}", reorder.len(), form.debug_name());
        }
        let n = form.names.len();
        let mut rewrite = Rewrite::new(None);
        for (i, target) in reorder.iter().enumerate() {
            match types.get(*target) {
                Some(ty) if *ty == form.names[skip + i].ty => rewrite.replace(skip + i, n + target),
                _ => internal!("bad reorder {:?} over {:?}", reorder, types),
            }
        }
        let mut names = params(form)[..skip].to_vec();
        names.extend(
            types
                .iter()
                .enumerate()
                .map(|(j, ty)| Name::param(n + j, *ty)),
        );
        names.extend(rewrite.apply_all(temps(form)));
        LambdaForm::new(
            skip + types.len(),
            names,
            rewrite.result(form.result)?,
            FormKind::Edited,
        )
    })
}

/// Parameter `pos` is passed through the unary handle in the last slot of
/// `species` before use.
pub(crate) fn filter_argument_form(
    form: &FormRef,
    pos: usize,
    filter: &TypeDescriptor,
    species: &Arc<Species>,
) -> Result<FormRef> {
    let key = TransformKey::FilterArgument {
        pos,
        filter: filter.clone(),
        species: species.signature().to_string(),
    };
    form.cached_transform(key, || {
        let ty = check_param(form, pos)?;
        if filter.parameter_count() != 1 || filter.return_basic_type() != ty {
            internal!("filter {} does not produce argument {}", filter, pos);
        }
        let slot = last_slot(species)?;
        let n = form.names.len();
        let mut names = params(form).to_vec();
        names[pos] = Name::param(n, filter.parameter_type(0).basic_type());
        names.push(Name::new(n + 1, species.getter(slot)?, vec![Argument::Name(0)]));
        names.push(Name::new(
            n + 2,
            NamedFunction::InvokeBasic(filter.clone()),
            vec![Argument::Name(n + 1), Argument::Name(n)],
        ));
        let mut rewrite = Rewrite::new(Some(species));
        rewrite.replace(pos, n + 2);
        names.extend(rewrite.apply_all(temps(form)));
        LambdaForm::new(form.arity, names, rewrite.result(form.result)?, FormKind::Edited)
    })
}

/// The result is passed through the handle in the last slot of `species`.
pub(crate) fn filter_return_form(
    form: &FormRef,
    filter: &TypeDescriptor,
    species: &Arc<Species>,
) -> Result<FormRef> {
    let key = TransformKey::FilterReturn {
        filter: filter.clone(),
        species: species.signature().to_string(),
    };
    form.cached_transform(key, || {
        let produced: Vec<BasicType> = form.result.map(|index| form.names[index].ty).into_iter().collect();
        if filter.parameter_basic_types() != produced {
            internal!("filter {} cannot take the result of {}", filter, form.debug_name());
        }
        let slot = last_slot(species)?;
        let n = form.names.len();
        let rewrite = Rewrite::new(Some(species));
        let mut names = params(form).to_vec();
        names.extend(rewrite.apply_all(temps(form)));
        names.push(Name::new(n, species.getter(slot)?, vec![Argument::Name(0)]));
        let mut args = vec![Argument::Name(n)];
        args.extend(form.result.map(Argument::Name));
        names.push(Name::new(n + 1, NamedFunction::InvokeBasic(filter.clone()), args));
        let result = (!filter.return_type().is_void()).then_some(n + 1);
        LambdaForm::new(form.arity, names, result, FormKind::Edited)
    })
}

/// Replaces parameter `pos` by the collector's parameters; the collector
/// in the last slot of `species` computes it. A void collector inserts its
/// parameters without replacing anything.
pub(crate) fn collect_arguments_form(
    form: &FormRef,
    pos: usize,
    collector: &TypeDescriptor,
    species: &Arc<Species>,
) -> Result<FormRef> {
    let key = TransformKey::CollectArguments {
        pos,
        collector: collector.clone(),
        species: species.signature().to_string(),
    };
    form.cached_transform(key, || {
        let produces = !collector.return_type().is_void();
        if produces {
            let ty = check_param(form, pos)?;
            if collector.return_basic_type() != ty {
                internal!("collector {} does not produce argument {}", collector, pos);
            }
        } else if pos == 0 || pos > form.arity {
            internal!("cannot collect at {} in {}", pos, form.debug_name());
        }
        let slot = last_slot(species)?;
        let n = form.names.len();
        let k = collector.parameter_count();
        let mut names = params(form)[..pos].to_vec();
        names.extend(
            collector
                .parameter_basic_types()
                .into_iter()
                .enumerate()
                .map(|(j, ty)| Name::param(n + j, ty)),
        );
        let rest = if produces { pos + 1 } else { pos };
        names.extend_from_slice(&params(form)[rest..]);
        names.push(Name::new(n + k, species.getter(slot)?, vec![Argument::Name(0)]));
        let mut args = vec![Argument::Name(n + k)];
        args.extend((n..n + k).map(Argument::Name));
        names.push(Name::new(n + k + 1, NamedFunction::InvokeBasic(collector.clone()), args));
        let mut rewrite = Rewrite::new(Some(species));
        if produces {
            rewrite.replace(pos, n + k + 1);
        }
        names.extend(rewrite.apply_all(temps(form)));
        let arity = form.arity - usize::from(produces) + k;
        LambdaForm::new(arity, names, rewrite.result(form.result)?, FormKind::Edited)
    })
}

/// The combiner in the last slot of `species` runs on the arguments after
/// position `pos`; its result, unless void, becomes parameter `pos`.
pub(crate) fn fold_arguments_form(
    form: &FormRef,
    pos: usize,
    combiner: &TypeDescriptor,
    species: &Arc<Species>,
) -> Result<FormRef> {
    let key = TransformKey::FoldArguments {
        pos,
        combiner: combiner.clone(),
        species: species.signature().to_string(),
    };
    form.cached_transform(key, || {
        let produces = !combiner.return_type().is_void();
        if produces {
            let ty = check_param(form, pos)?;
            if combiner.return_basic_type() != ty {
                internal!("combiner {} does not produce argument {}", combiner, pos);
            }
        }
        let first = if produces { pos + 1 } else { pos };
        let k = combiner.parameter_count();
        if first + k > form.arity {
            internal!("combiner {} reads past the arguments of {}", combiner, form.debug_name());
        }
        let taken: Vec<BasicType> = (first..first + k).map(|i| form.names[i].ty).collect();
        if taken != combiner.parameter_basic_types() {
            internal!("combiner {} does not fit {}", combiner, form.debug_name());
        }
        let slot = last_slot(species)?;
        let n = form.names.len();
        let mut names: Vec<Name> = params(form)
            .iter()
            .filter(|name| !(produces && name.index == pos))
            .cloned()
            .collect();
        names.push(Name::new(n, species.getter(slot)?, vec![Argument::Name(0)]));
        let mut args = vec![Argument::Name(n)];
        args.extend((first..first + k).map(Argument::Name));
        names.push(Name::new(n + 1, NamedFunction::InvokeBasic(combiner.clone()), args));
        let mut rewrite = Rewrite::new(Some(species));
        if produces {
            rewrite.replace(pos, n + 1);
        }
        names.extend(rewrite.apply_all(temps(form)));
        let arity = form.arity - usize::from(produces);
        LambdaForm::new(arity, names, rewrite.result(form.result)?, FormKind::Edited)
    })
}

/// Parameters `pos..pos + count` are loaded out of one array parameter
/// after checking its length.
pub(crate) fn spread_arguments_form(
    form: &FormRef,
    pos: usize,
    array: &ClassRef,
    count: usize,
) -> Result<FormRef> {
    let key = TransformKey::SpreadArguments {
        pos,
        array: array.clone(),
        count,
    };
    form.cached_transform(key, || {
        if pos == 0 || pos + count > form.arity {
            internal!("cannot spread {} arguments at {} in {}", count, pos, form.debug_name());
        }
        let n = form.names.len();
        let mut names = params(form)[..pos].to_vec();
        names.push(Name::param(n, BasicType::L));
        names.extend_from_slice(&params(form)[pos + count..]);
        names.push(Name::new(
            n + 1,
            Intrinsic::CheckSpreadLength { len: count }.into(),
            vec![Argument::Name(n)],
        ));
        let mut rewrite = Rewrite::new(None);
        for i in 0..count {
            let load = Name::new(
                n + 2 + i,
                Intrinsic::ArrayLoad {
                    array: array.clone(),
                }
                .into(),
                vec![Argument::Name(n), Argument::Const(Value::Int(i as i32))],
            );
            if load.ty != form.names[pos + i].ty {
                internal!("cannot spread {} into argument {}", array, pos + i);
            }
            names.push(load);
            rewrite.replace(pos + i, n + 2 + i);
        }
        names.extend(rewrite.apply_all(temps(form)));
        LambdaForm::new(
            form.arity - count + 1,
            names,
            rewrite.result(form.result)?,
            FormKind::Edited,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormBuilder;
    use crate::species::SpeciesRegistry;

    /// `(mh, a, b) -> identity(b)` over ints.
    fn second() -> FormRef {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::I, BasicType::I]);
        let t = b.add(Intrinsic::Identity(BasicType::I), vec![b.param(2)]);
        b.build(Some(t), FormKind::Identity).unwrap()
    }

    #[test]
    fn edits_are_cached_per_form_and_key() {
        let form = second();
        let a = add_argument_form(&form, 1, BasicType::J).unwrap();
        let b = add_argument_form(&form, 1, BasicType::J).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.basic_signature(), "LJII_I");
        let c = add_argument_form(&form, 2, BasicType::J).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn binding_reads_the_new_slot() {
        let species = SpeciesRegistry::global().get("I").unwrap();
        let bound = bind_argument_form(&second(), 2, &species).unwrap();
        assert_eq!(bound.basic_signature(), "LI_I");
        assert!(matches!(
            bound.names()[2].function(),
            Some(NamedFunction::Getter { slot: 0, .. })
        ));
        assert_eq!(bound.names()[3].arguments(), &[Argument::Name(2)]);
    }

    #[test]
    fn only_unused_arguments_can_be_dropped() {
        let form = second();
        let dropped = drop_arguments_form(&form, 1, 1).unwrap();
        assert_eq!(dropped.basic_signature(), "LI_I");
        assert!(drop_arguments_form(&form, 2, 1).is_err());
    }

    #[test]
    fn permutation_can_duplicate_inputs() {
        let swapped =
            permute_arguments_form(&second(), 1, &[0, 0], &[BasicType::I]).unwrap();
        assert_eq!(swapped.basic_signature(), "LI_I");
        let flipped =
            permute_arguments_form(&second(), 1, &[1, 0], &[BasicType::I, BasicType::I]).unwrap();
        assert_eq!(flipped.names()[3].arguments(), &[Argument::Name(1)]);
    }

    #[test]
    fn spreading_checks_then_loads() {
        let array = mh_core::classes::int().array_type();
        let spread = spread_arguments_form(&second(), 1, &array, 2).unwrap();
        assert_eq!(spread.basic_signature(), "LL_I");
        assert!(matches!(
            spread.names()[2].function(),
            Some(NamedFunction::Intrinsic(Intrinsic::CheckSpreadLength { len: 2 }))
        ));
    }
}
