//! Atomic string table
//!
//! Identifiers and property names are interned into `Atom`s: two atoms
//! are the same name iff their ids are equal. Atoms live for the VM's
//! lifetime; the table is owned by the `VmInstance`.

use rustc_hash::FxHashMap;

/// Canonical interned string handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

macro_rules! well_known_atoms {
    ($($ident:ident => $text:expr,)*) => {
        /// Atoms interned at table construction, addressable without a
        /// table lookup.
        #[allow(non_snake_case)]
        pub struct WellKnown {
            $(pub $ident: Atom,)*
        }

        impl AtomTable {
            fn intern_well_known(&mut self) -> WellKnown {
                WellKnown {
                    $($ident: self.intern($text),)*
                }
            }
        }
    };
}

well_known_atoms! {
    length => "length",
    prototype => "prototype",
    constructor => "constructor",
    name => "name",
    message => "message",
    stack => "stack",
    value => "value",
    done => "done",
    next => "next",
    toString => "toString",
    toLocaleString => "toLocaleString",
    valueOf => "valueOf",
    arguments => "arguments",
    caller => "caller",
    eval => "eval",
    undefined_ => "undefined",
    object_ => "object",
    boolean_ => "boolean",
    number_ => "number",
    string_ => "string",
    symbol_ => "symbol",
    function_ => "function",
    default_ => "default",
    get => "get",
    set => "set",
    writable => "writable",
    enumerable => "enumerable",
    configurable => "configurable",
    globalThis => "globalThis",
    NaN => "NaN",
    Infinity => "Infinity",
    empty => "",
    this_ => "this",
    callee => "callee",
    index => "index",
    raw => "raw",
    then => "then",
    resolve => "resolve",
    reject => "reject",
}

/// Intern pool producing canonical identifier handles.
pub struct AtomTable {
    names: Vec<Box<str>>,
    map: FxHashMap<Box<str>, Atom>,
}

impl AtomTable {
    pub fn new() -> (Self, WellKnown) {
        let mut table = AtomTable {
            names: Vec::with_capacity(64),
            map: FxHashMap::default(),
        };
        let well_known = table.intern_well_known();
        (table, well_known)
    }

    /// Intern a string, returning its canonical atom.
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(&atom) = self.map.get(s) {
            return atom;
        }
        let atom = Atom(self.names.len() as u32);
        let boxed: Box<str> = s.into();
        self.names.push(boxed.clone());
        self.map.insert(boxed, atom);
        atom
    }

    /// Look up an atom without interning.
    pub fn lookup(&self, s: &str) -> Option<Atom> {
        self.map.get(s).copied()
    }

    /// The text of an atom.
    #[inline]
    pub fn name(&self, atom: Atom) -> &str {
        &self.names[atom.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_canonical() {
        let (mut table, _) = AtomTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "foo");
    }

    #[test]
    fn well_known_preinterned() {
        let (mut table, wk) = AtomTable::new();
        assert_eq!(table.intern("length"), wk.length);
        assert_eq!(table.intern("prototype"), wk.prototype);
        assert_eq!(table.name(wk.empty), "");
    }

    #[test]
    fn lookup_does_not_intern() {
        let (mut table, _) = AtomTable::new();
        assert_eq!(table.lookup("never-seen"), None);
        let a = table.intern("seen");
        assert_eq!(table.lookup("seen"), Some(a));
    }
}
