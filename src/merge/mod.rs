//! Layer merging for configuration values
//!
//! Configuration layers are YAML mappings. Merging walks an overriding layer
//! and overlays it key by key on top of the accumulated value, recording
//! which layer supplied every leaf.
//!
//! Key paths address values inside a merged mapping using dot notation,
//! with `\.` for a literal dot and `[n]` for a list index:
//! `compilation.engine_args[0]`, `metadata.defaults.doc_type`.

pub mod yaml;

/// One step of a key path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySegment {
    /// A mapping key
    Key(String),
    /// A list index
    Index(usize),
}

/// Split a dotted key path into segments.
///
/// ```
/// use texcorpus::merge::{parse_key_path, KeySegment};
///
/// let segments = parse_key_path("compilation.engine_args[1]");
/// assert_eq!(segments[0], KeySegment::Key("compilation".to_string()));
/// assert_eq!(segments[2], KeySegment::Index(1));
/// ```
pub fn parse_key_path(path: &str) -> Vec<KeySegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.trim().chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => {
                if !current.is_empty() {
                    segments.push(KeySegment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(KeySegment::Key(std::mem::take(&mut current)));
                }
                let inner: String = chars.by_ref().take_while(|c| *c != ']').collect();
                match inner.trim().parse::<usize>() {
                    Ok(index) => segments.push(KeySegment::Index(index)),
                    Err(_) if !inner.trim().is_empty() => {
                        segments.push(KeySegment::Key(inner.trim().to_string()))
                    }
                    Err(_) => {}
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        segments.push(KeySegment::Key(current));
    }

    segments
}

/// Join a parent key path and a child key, escaping dots in the child.
pub fn join_key_path(parent: &str, key: &str) -> String {
    let escaped = key.replace('.', "\\.");
    if parent.is_empty() {
        escaped
    } else {
        format!("{}.{}", parent, escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_path_dots() {
        assert_eq!(
            parse_key_path("poly.pages_per_sheet"),
            vec![
                KeySegment::Key("poly".to_string()),
                KeySegment::Key("pages_per_sheet".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_key_path_index() {
        assert_eq!(
            parse_key_path("batch.exclude[2]"),
            vec![
                KeySegment::Key("batch".to_string()),
                KeySegment::Key("exclude".to_string()),
                KeySegment::Index(2)
            ]
        );
    }

    #[test]
    fn test_parse_key_path_escaped_dot() {
        assert_eq!(
            parse_key_path(r"naming.v1\.0"),
            vec![
                KeySegment::Key("naming".to_string()),
                KeySegment::Key("v1.0".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_key_path_empty() {
        assert!(parse_key_path("").is_empty());
        assert!(parse_key_path("  ").is_empty());
    }

    #[test]
    fn test_join_key_path_round_trips() {
        let joined = join_key_path("naming", "v1.0");
        assert_eq!(joined, r"naming.v1\.0");
        assert_eq!(parse_key_path(&joined).len(), 2);
        assert_eq!(join_key_path("", "batch"), "batch");
    }
}
