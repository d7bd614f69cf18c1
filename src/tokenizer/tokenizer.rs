use std::collections::HashMap;

/// Deterministic text tokenizer
///
/// Lowercases the input, removes every character outside `[a-z0-9 ]` and
/// splits on runs of spaces. Positions are the zero-based index of a term in
/// the resulting sequence.
#[derive(Clone, Debug, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase and strip everything outside `[a-z0-9 ]`
    pub fn normalize(&self, text: &str) -> String {
        text.chars()
            .flat_map(char::to_lowercase)
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
            .collect()
    }

    /// Tokenize and return (term, position) pairs in order
    ///
    /// # Example
    ///
    /// ```
    /// use fragdex::tokenizer::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("Hello, World!");
    /// assert_eq!(tokens, vec![("hello".to_string(), 0), ("world".to_string(), 1)]);
    /// ```
    pub fn tokenize(&self, text: &str) -> Vec<(String, u32)> {
        self.normalize(text)
            .split(' ')
            .filter(|word| !word.is_empty())
            .enumerate()
            .map(|(pos, word)| (word.to_string(), pos as u32))
            .collect()
    }

    /// Tokenize text into a vector of terms
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|(term, _)| term).collect()
    }

    /// Normalize a single query term; `None` when nothing survives normalization
    pub fn normalize_term(&self, term: &str) -> Option<String> {
        let normalized: String = self.normalize(term).split(' ').collect();
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }

    /// The only term of `text`; `None` when it yields zero or several terms
    pub fn single_term(&self, text: &str) -> Option<String> {
        let mut terms = self.terms(text).into_iter();
        match (terms.next(), terms.next()) {
            (Some(term), None) => Some(term),
            _ => None,
        }
    }

    /// Compute term frequencies for a tokenized document
    pub fn term_frequencies(&self, text: &str) -> HashMap<String, u32> {
        let mut freq = HashMap::new();
        for (term, _) in self.tokenize(text) {
            *freq.entry(term).or_insert(0) += 1;
        }
        freq
    }

    /// Map each term to its ascending positions in the document
    pub fn positions_by_term(&self, text: &str) -> HashMap<String, Vec<u32>> {
        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in self.tokenize(text) {
            positions.entry(term).or_default().push(pos);
        }
        positions
    }
}
