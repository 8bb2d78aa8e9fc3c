//! Process-wide symbol interning.
//!
//! Every identifier and quoted symbol goes through [`intern`], so two symbols
//! with the same name always compare equal by id. The table is created on
//! first use and only ever grows.

use std::fmt;
use std::sync::{LazyLock, Mutex, MutexGuard};
use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static INTERNER: LazyLock<Mutex<StringInterner<DefaultBackend>>> =
    LazyLock::new(|| Mutex::new(StringInterner::new()));

fn table() -> MutexGuard<'static, StringInterner<DefaultBackend>> {
    // Append-only, so a poisoned table is still consistent
    INTERNER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An interned name. Cheap to copy, compare and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(DefaultSymbol);

/// Intern `name`, returning the canonical symbol for it
pub fn intern(name: &str) -> Symbol {
    Symbol(table().get_or_intern(name))
}

impl Symbol {
    /// The name this symbol was interned from
    pub fn name(self) -> String {
        // Symbols are only minted by `intern`, which never removes entries.
        table().resolve(self.0).unwrap_or_default().to_owned()
    }

    /// Run `f` on the name. The table is unlocked by then, so `f` may intern.
    pub fn with_name<R>(self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.name())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        intern(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_name(|name| f.write_str(name))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_name(|name| write!(f, "Symbol({name})"))
    }
}
