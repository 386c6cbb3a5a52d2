use crate::common::MapReduceApp;
use regex::Regex;

fn words_regex() -> Regex {
    Regex::new(r"\b[a-zA-Z0-9]+\b").expect("invalid regex")
}

pub struct WordCount {
    words: Regex,
}

impl WordCount {
    pub fn new() -> Self {
        Self {
            words: words_regex(),
        }
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

impl MapReduceApp for WordCount {
    fn map(&self, _filename: String, contents: String) -> Vec<(String, String)> {
        self.words
            .find_iter(&contents)
            .map(|w| (w.as_str().to_lowercase(), String::from("1")))
            .collect()
    }

    /// Every map value is a single occurrence, so the count is the number of
    /// values, whatever they contain.
    fn reduce(&self, _key: String, values: Vec<String>) -> String {
        values.len().to_string()
    }
}

/// word -> "<number of documents> <doc1>,<doc2>,..."
pub struct InvertedIndex {
    words: Regex,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            words: words_regex(),
        }
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MapReduceApp for InvertedIndex {
    fn map(&self, filename: String, contents: String) -> Vec<(String, String)> {
        let mut words: Vec<String> = self
            .words
            .find_iter(&contents)
            .map(|w| w.as_str().to_string())
            .collect();
        words.sort_unstable();
        words.dedup();
        words
            .into_iter()
            .map(|w| (w, filename.clone()))
            .collect()
    }

    fn reduce(&self, _key: String, mut values: Vec<String>) -> String {
        values.sort_unstable();
        values.dedup();
        format!("{} {}", values.len(), values.join(","))
    }
}
