//! Symbol interner: dense ids for symbol strings.

use std::collections::HashMap;

use crate::types::Token;

/// A pool of unique symbols.
///
/// Maps symbol text to a dense id and back. Ids are handed out in
/// first-appearance order starting from 0 and are never reused, so the pool
/// only grows for the lifetime of a run.
#[derive(Debug, Default, Clone)]
pub struct SymbolInterner {
    /// text -> id
    ids: HashMap<String, Token>,
    /// id -> text
    symbols: Vec<String>,
}

impl SymbolInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a symbol, returning its id.
    ///
    /// If the symbol was seen before its existing id is returned, otherwise
    /// the next sequential id is assigned.
    pub fn intern(&mut self, symbol: &str) -> Token {
        if let Some(&id) = self.ids.get(symbol) {
            return id;
        }

        let id = self.symbols.len();
        self.symbols.push(symbol.to_string());
        self.ids.insert(symbol.to_string(), id);
        id
    }

    /// Returns the id of an already interned symbol.
    pub fn get(&self, symbol: &str) -> Option<Token> {
        self.ids.get(symbol).copied()
    }

    /// Returns the text of a symbol id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this interner.
    pub fn text(&self, id: Token) -> &str {
        &self.symbols[id]
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates over `(id, text)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &str)> {
        self.symbols.iter().enumerate().map(|(id, s)| (id, s.as_str()))
    }
}
