use std::collections::HashMap;

use crate::vm::Segment;

/// The storage class of a symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Static,
    Field,
    Argument,
    Local,
}

impl Kind {
    const COUNT: usize = 4;

    /// Whether symbols of this kind live in the class scope (as opposed to the
    /// subroutine scope).
    pub const fn is_class_scoped(self) -> bool {
        matches!(self, Kind::Static | Kind::Field)
    }

    /// The VM segment where symbols of this kind are stored.
    pub const fn segment(self) -> Segment {
        match self {
            Kind::Static => Segment::Static,
            Kind::Field => Segment::This,
            Kind::Argument => Segment::Argument,
            Kind::Local => Segment::Local,
        }
    }

    const fn counter(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub ty: String,
    pub kind: Kind,
    pub index: u16,
}

/// Two-level (class and subroutine) scoped symbol table.
///
/// Lookups consult the subroutine scope first, so a subroutine-level name
/// shadows a class-level one.
#[derive(Debug, Default)]
pub struct SymbolTable {
    class_scope: HashMap<String, Symbol>,
    subroutine_scope: HashMap<String, Symbol>,
    counts: [u16; Kind::COUNT],
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Clears the subroutine scope, resetting argument and local indices.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
        self.counts[Kind::Argument.counter()] = 0;
        self.counts[Kind::Local.counter()] = 0;
    }

    /// Defines a new symbol in the scope implied by `kind`, assigning it the
    /// next free index of that kind, which is also returned.
    ///
    /// Redefining a name in the same scope replaces the previous entry, and
    /// the new entry still consumes a fresh index. Returns `None`, defining
    /// nothing, once every index of the kind is taken.
    pub fn define(&mut self, name: &str, ty: &str, kind: Kind) -> Option<u16> {
        let counter = &mut self.counts[kind.counter()];
        let index = *counter;
        *counter = index.checked_add(1)?;

        let scope = if kind.is_class_scoped() {
            &mut self.class_scope
        } else {
            &mut self.subroutine_scope
        };
        let symbol = Symbol {
            ty: ty.to_string(),
            kind,
            index,
        };
        scope.insert(name.to_string(), symbol);
        Some(index)
    }

    /// Returns the number of symbols of the provided kind defined in the
    /// current scope.
    pub fn var_count(&self, kind: Kind) -> u16 {
        self.counts[kind.counter()]
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.subroutine_scope
            .get(name)
            .or_else(|| self.class_scope.get(name))
    }

    pub fn kind_of(&self, name: &str) -> Option<Kind> {
        self.get(name).map(|symbol| symbol.kind)
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|symbol| symbol.ty.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<u16> {
        self.get(name).map(|symbol| symbol.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_per_kind() {
        let mut t = SymbolTable::new();
        assert_eq!(t.define("a", "int", Kind::Field), Some(0));
        assert_eq!(t.define("b", "int", Kind::Static), Some(0));
        assert_eq!(t.define("c", "Point", Kind::Field), Some(1));
        t.start_subroutine();
        assert_eq!(t.define("this", "Main", Kind::Argument), Some(0));
        assert_eq!(t.define("d", "int", Kind::Argument), Some(1));
        assert_eq!(t.define("e", "char", Kind::Local), Some(0));

        assert_eq!(t.var_count(Kind::Field), 2);
        assert_eq!(t.var_count(Kind::Static), 1);
        assert_eq!(t.var_count(Kind::Argument), 2);
        assert_eq!(t.var_count(Kind::Local), 1);

        assert_eq!(
            t.get("c"),
            Some(&Symbol {
                ty: "Point".into(),
                kind: Kind::Field,
                index: 1,
            })
        );
        assert_eq!(t.kind_of("e"), Some(Kind::Local));
        assert_eq!(t.type_of("e"), Some("char"));
        assert_eq!(t.index_of("d"), Some(1));
    }

    #[test]
    fn unresolved_names() {
        let t = SymbolTable::new();
        assert_eq!(t.kind_of("Math"), None);
        assert_eq!(t.type_of("Math"), None);
        assert_eq!(t.index_of("Math"), None);
    }

    #[test]
    fn subroutine_scope_shadows_class_scope() {
        let mut t = SymbolTable::new();
        t.define("x", "int", Kind::Field);
        t.start_subroutine();
        t.define("x", "boolean", Kind::Local);
        assert_eq!(t.kind_of("x"), Some(Kind::Local));
        assert_eq!(t.type_of("x"), Some("boolean"));

        t.start_subroutine();
        assert_eq!(t.kind_of("x"), Some(Kind::Field));
        assert_eq!(t.type_of("x"), Some("int"));
    }

    #[test]
    fn start_subroutine_clears_scope_and_counters() {
        let mut t = SymbolTable::new();
        t.define("s", "int", Kind::Static);
        t.start_subroutine();
        t.define("a", "int", Kind::Argument);
        t.define("l", "int", Kind::Local);
        t.start_subroutine();
        assert_eq!(t.kind_of("a"), None);
        assert_eq!(t.kind_of("l"), None);
        assert_eq!(t.var_count(Kind::Argument), 0);
        assert_eq!(t.var_count(Kind::Local), 0);
        // Class scope survives.
        assert_eq!(t.var_count(Kind::Static), 1);
        assert_eq!(t.kind_of("s"), Some(Kind::Static));
    }

    #[test]
    fn redefinition_in_same_scope_overwrites() {
        let mut t = SymbolTable::new();
        t.start_subroutine();
        t.define("x", "int", Kind::Local);
        t.define("x", "boolean", Kind::Local);
        assert_eq!(t.type_of("x"), Some("boolean"));
        assert_eq!(t.index_of("x"), Some(1));
        // The overwritten entry still counts towards the local count.
        assert_eq!(t.var_count(Kind::Local), 2);
    }

    #[test]
    fn redefinition_across_kinds_in_same_scope_overwrites() {
        let mut t = SymbolTable::new();
        t.start_subroutine();
        t.define("x", "int", Kind::Argument);
        t.define("x", "int", Kind::Local);
        assert_eq!(t.kind_of("x"), Some(Kind::Local));
        assert_eq!(t.index_of("x"), Some(0));
    }

    #[test]
    fn indices_run_out() {
        let mut t = SymbolTable::new();
        for i in 0..u16::MAX {
            assert_eq!(t.define(&format!("f{i}"), "int", Kind::Field), Some(i));
        }
        assert_eq!(t.define("last", "int", Kind::Field), None);
        assert_eq!(t.kind_of("last"), None);
        assert_eq!(t.var_count(Kind::Field), u16::MAX);
        // Other kinds are unaffected.
        assert_eq!(t.define("s", "int", Kind::Static), Some(0));
    }

    #[test]
    fn kind_segments() {
        assert_eq!(Kind::Static.segment(), Segment::Static);
        assert_eq!(Kind::Field.segment(), Segment::This);
        assert_eq!(Kind::Argument.segment(), Segment::Argument);
        assert_eq!(Kind::Local.segment(), Segment::Local);
    }
}
