//! Symbol table and text-to-sequence conversion.

use std::collections::HashMap;

use crate::config::CharacterConfig;

/// Ordered symbol table: pad, eos, bos, characters, punctuations.
///
/// The pad symbol, when configured, always has id 0.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    symbols: Vec<char>,
    ids: HashMap<char, i64>,
    lowercase: bool,
}

impl Vocabulary {
    pub fn new(characters: &CharacterConfig, lowercase: bool) -> Self {
        let specials = [&characters.pad, &characters.eos, &characters.bos]
            .into_iter()
            .filter_map(|s| s.chars().next());
        let all = specials
            .chain(characters.characters.chars())
            .chain(characters.punctuations.chars());

        let mut symbols = Vec::new();
        let mut ids = HashMap::new();
        for c in all {
            if !ids.contains_key(&c) {
                ids.insert(c, symbols.len() as i64);
                symbols.push(c);
            }
        }

        Self {
            symbols,
            ids,
            lowercase,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn pad_id(&self) -> i64 {
        0
    }

    pub fn symbol(&self, id: i64) -> Option<char> {
        usize::try_from(id).ok().and_then(|i| self.symbols.get(i).copied())
    }

    /// Collapse whitespace runs and optionally lowercase.
    pub fn clean(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.lowercase {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }

    /// Token ids for `text`. Symbols outside the table are dropped.
    pub fn text_to_sequence(&self, text: &str) -> Vec<i64> {
        let cleaned = self.clean(text);
        let mut out = Vec::with_capacity(cleaned.len());
        let mut dropped = 0usize;
        for c in cleaned.chars() {
            match self.ids.get(&c) {
                Some(&id) => out.push(id),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::debug!("Dropped {} unknown symbols from {:?}", dropped, text);
        }
        out
    }
}
