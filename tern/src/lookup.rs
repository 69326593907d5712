//! Method resolution over the single-rooted type tree.
//!
//! Every walk stops at the root, recognised by identity: a type whose
//! parent is itself.
use crate::{Constructor, Heap, Symbol, TypeObject, Value};

/// Walks `ty` and its ancestors, nearest first.
pub struct Ancestors<'h> {
    heap: &'h Heap,
    next: Option<Value>,
}

impl Iterator for Ancestors<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let ty = self.heap.try_get::<TypeObject>(current)?;
        if ty.parent != current {
            self.next = Some(ty.parent);
        }
        Some(current)
    }
}

pub fn ancestors(heap: &Heap, ty: Value) -> Ancestors<'_> {
    Ancestors {
        heap,
        next: Some(ty),
    }
}

/// Finds `name` in the method table of `ty` or its nearest ancestor that
/// defines it. Overrides shadow inherited definitions.
pub fn find_method(heap: &Heap, ty: Value, name: Symbol) -> Option<Value> {
    ancestors(heap, ty).find_map(|t| heap.get::<TypeObject>(t).methods.get(&name).copied())
}

/// Like [`find_method`] but also reports which type holds the method.
pub fn find_method_holder(heap: &Heap, ty: Value, name: Symbol) -> Option<(Value, Value)> {
    ancestors(heap, ty).find_map(|t| {
        heap.get::<TypeObject>(t)
            .methods
            .get(&name)
            .map(|&method| (t, method))
    })
}

/// `true` if `ancestor` is `ty` or appears on its parent chain.
pub fn is_subtype(heap: &Heap, ty: Value, ancestor: Value) -> bool {
    ancestors(heap, ty).any(|t| t == ancestor)
}

/// The first constructor on the chain that is not [`Constructor::Inherit`].
pub fn resolve_constructor(heap: &Heap, ty: Value) -> Constructor {
    ancestors(heap, ty)
        .map(|t| heap.get::<TypeObject>(t).constructor)
        .find(|c| !matches!(c, Constructor::Inherit))
        .unwrap_or(Constructor::Abstract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeapSettings, NoRoots, SpecialObjects};

    fn subtype(heap: &mut Heap, special: &SpecialObjects, name: &str, parent: Value) -> Value {
        heap.alloc(
            special.type_,
            TypeObject::new(Symbol::intern(name), parent, Constructor::Inherit),
            &mut NoRoots,
        )
    }

    #[test]
    fn lookup_resolves_to_nearest_definition() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        let base = subtype(&mut heap, &special, "Base", special.object);
        let derived = subtype(&mut heap, &special, "Derived", base);
        let speak = Symbol::intern("speak");
        let walk = Symbol::intern("walk");

        heap.get_mut::<TypeObject>(base).methods.insert(speak, Value::FALSE);
        heap.get_mut::<TypeObject>(base).methods.insert(walk, Value::FALSE);
        heap.get_mut::<TypeObject>(derived).methods.insert(speak, Value::TRUE);

        assert_eq!(find_method(&heap, derived, speak), Some(Value::TRUE));
        assert_eq!(find_method(&heap, derived, walk), Some(Value::FALSE));
        assert_eq!(find_method_holder(&heap, derived, walk), Some((base, Value::FALSE)));
    }

    #[test]
    fn missing_method_walk_terminates_at_the_root() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        let ty = subtype(&mut heap, &special, "Lonely", special.object);
        assert_eq!(find_method(&heap, ty, Symbol::intern("absent")), None);
        assert_eq!(ancestors(&heap, ty).collect::<Vec<_>>(), vec![ty, special.object]);
    }

    #[test]
    fn subtype_check_follows_parent_links() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        assert!(is_subtype(&heap, special.type_error, special.exception));
        assert!(is_subtype(&heap, special.type_error, special.object));
        assert!(!is_subtype(&heap, special.exception, special.type_error));
        assert!(!is_subtype(&heap, special.array, special.exception));
    }

    #[test]
    fn constructors_are_inherited_until_defined() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        let ty = subtype(&mut heap, &special, "Plain", special.object);
        assert!(matches!(resolve_constructor(&heap, ty), Constructor::Instance));
        assert!(matches!(
            resolve_constructor(&heap, special.array),
            Constructor::Abstract
        ));
    }
}
