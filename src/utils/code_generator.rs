//! Short code generation and validation utilities.
//!
//! Codes are random draws over a configurable alphabet with a length picked
//! uniformly from a range. Uniqueness is not checked here; see
//! [`crate::application::services::SlugPool`].

use rand::Rng;
use regex::Regex;
use std::collections::HashSet;

pub const BASE62_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Prefixes that would shadow system routes.
pub const DEFAULT_RESERVED_PREFIXES: &[&str] =
    &["api", "admin", "health", "static", "stats", "dashboard"];

/// Random code generator with format and reserved-prefix checks.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    alphabet: Vec<char>,
    min_length: usize,
    max_length: usize,
    reserved_prefixes: Vec<String>,
    format: Regex,
}

impl CodeGenerator {
    /// # Errors
    ///
    /// Returns an error if the alphabet is empty or contains `:`, or the
    /// length range is empty or starts at zero.
    pub fn new(
        alphabet: &str,
        min_length: usize,
        max_length: usize,
        reserved_prefixes: &[String],
    ) -> Result<Self, String> {
        let mut seen = HashSet::new();
        let alphabet: Vec<char> = alphabet.chars().filter(|c| seen.insert(*c)).collect();
        if alphabet.is_empty() {
            return Err("code alphabet must not be empty".to_string());
        }
        // Cache keys use ':' to separate namespaces from codes.
        if alphabet.contains(&':') {
            return Err("code alphabet must not contain ':'".to_string());
        }
        if min_length == 0 || min_length > max_length {
            return Err(format!(
                "invalid code length range {}..={}",
                min_length, max_length
            ));
        }

        let class: String = alphabet.iter().map(|c| regex::escape(&c.to_string())).collect();
        let format = Regex::new(&format!("^[{}]{{{},{}}}$", class, min_length, max_length))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            alphabet,
            min_length,
            max_length,
            reserved_prefixes: reserved_prefixes
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            format,
        })
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        let len = rng.random_range(self.min_length..=self.max_length);
        (0..len)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect()
    }

    /// Draws up to `count` distinct codes. Draws that repeat an earlier one are
    /// skipped, so tiny alphabets may return fewer than requested.
    pub fn generate_batch(&self, count: usize) -> Vec<String> {
        let mut seen = HashSet::with_capacity(count);
        let mut codes = Vec::with_capacity(count);
        for _ in 0..count.saturating_mul(2) {
            if codes.len() == count {
                break;
            }
            let code = self.generate();
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }
        codes
    }

    /// Case-insensitive check against the reserved prefixes.
    pub fn is_reserved(&self, code: &str) -> bool {
        let lower = code.to_ascii_lowercase();
        self.reserved_prefixes
            .iter()
            .any(|prefix| lower.starts_with(prefix.as_str()))
    }

    pub fn is_valid_format(&self, code: &str) -> bool {
        self.format.is_match(code)
    }

    /// Well-formed and not reserved.
    pub fn is_acceptable(&self, code: &str) -> bool {
        self.is_valid_format(code) && !self.is_reserved(code)
    }
}
