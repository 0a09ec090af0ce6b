//! Column alignment for human-readable dumps.
//!
//! An [`Aligner`] remembers the widest value seen per category. Widths are
//! recomputed only when the value list of a category changes, detected by a
//! SHA-256 digest of the sorted list.

use crate::error::{OrmError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Side on which padding is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pad {
    Right,
    Left,
}

#[derive(Debug, Clone)]
struct CategoryWidth {
    width: usize,
    digest: String,
}

#[derive(Debug, Default)]
pub struct Aligner {
    categories: HashMap<String, CategoryWidth>,
    computations: usize,
}

impl Aligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the widest of `values` (at least `min_width`) for `category`
    pub fn set_max_size<S: AsRef<str>>(&mut self, category: &str, values: &[S], min_width: usize) {
        let digest = digest_values(values, min_width);

        if let Some(cached) = self.categories.get(category) {
            if cached.digest == digest {
                return;
            }
        }

        let width = values
            .iter()
            .map(|v| v.as_ref().chars().count())
            .max()
            .unwrap_or(0)
            .max(min_width);

        self.computations += 1;
        self.categories
            .insert(category.to_string(), CategoryWidth { width, digest });
    }

    /// Width of a category
    pub fn max_size(&self, category: &str) -> Result<usize> {
        self.categories
            .get(category)
            .map(|c| c.width)
            .ok_or_else(|| OrmError::Parameter(format!("The category {} does not exist", category)))
    }

    /// Pad `value` to the summed width of `categories` plus `extra`
    pub fn smart_align(&self, value: &str, categories: &[&str], extra: usize, pad: Pad) -> Result<String> {
        let mut width = extra;
        for category in categories {
            width += self.max_size(category)?;
        }

        let len = value.chars().count();
        if len >= width {
            return Ok(value.to_string());
        }

        let fill = " ".repeat(width - len);
        Ok(match pad {
            Pad::Right => format!("{}{}", value, fill),
            Pad::Left => format!("{}{}", fill, value),
        })
    }

    /// Number of width computations performed so far
    pub fn computations(&self) -> usize {
        self.computations
    }
}

fn digest_values<S: AsRef<str>>(values: &[S], min_width: usize) -> String {
    let mut sorted: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(min_width.to_le_bytes());
    for value in sorted {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_single_category() {
        let mut aligner = Aligner::new();
        aligner.set_max_size("names", &["id", "email"], 0);

        assert_eq!(aligner.max_size("names").unwrap(), 5);
        assert_eq!(aligner.smart_align("id", &["names"], 0, Pad::Right).unwrap(), "id   ");
        assert_eq!(aligner.smart_align("id", &["names"], 1, Pad::Left).unwrap(), "    id");
    }

    #[test]
    fn test_align_summed_categories() {
        let mut aligner = Aligner::new();
        aligner.set_max_size("type", &["INT", "VARCHAR"], 0);
        aligner.set_max_size("size", &["11", "255"], 0);

        assert_eq!(
            aligner.smart_align("INT(11)", &["type", "size"], 2, Pad::Right).unwrap(),
            "INT(11)     "
        );
    }

    #[test]
    fn test_width_is_memoised_until_values_change() {
        let mut aligner = Aligner::new();
        aligner.set_max_size("names", &["b", "aa"], 0);
        aligner.set_max_size("names", &["aa", "b"], 0);
        assert_eq!(aligner.computations(), 1);

        aligner.set_max_size("names", &["aa", "b", "cccc"], 0);
        assert_eq!(aligner.computations(), 2);
        assert_eq!(aligner.max_size("names").unwrap(), 4);
    }

    #[test]
    fn test_min_width_and_unknown_category() {
        let mut aligner = Aligner::new();
        aligner.set_max_size("empty", &[] as &[&str], 3);

        assert_eq!(aligner.max_size("empty").unwrap(), 3);
        assert!(matches!(aligner.max_size("other"), Err(OrmError::Parameter(_))));
    }
}
