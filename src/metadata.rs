//! # Embedded Metadata
//!
//! Documents carry metadata in two syntaxes, both invisible to the
//! typesetting engine:
//!
//! 1. a **metadata block** of YAML written as LaTeX comments:
//!
//!    ```text
//!    %### BEGIN metadata ###
//!    % id: DOC-3f2a9c01be
//!    % title: Kinematics of rigid bodies
//!    % tags: [mechanics, kinematics]
//!    %### END metadata ###
//!    ```
//!
//! 2. **command declarations** such as `\newcommand{\DocTitle}{...}` or
//!    `\def\DocClass{...}`, mapped to metadata keys by a [`TexKeyMap`].
//!
//! ## Tolerance
//!
//! Extraction never fails as a whole. It returns whatever could be
//! recovered plus a list of [`Issue`]s:
//!
//! - no block and no declarations: empty metadata, no issue;
//! - a key repeated in the block: the last value wins, one warning;
//! - a value that does not parse: that key is omitted, one error, the
//!   other keys are still extracted;
//! - a key declared by a command *and* in the block: the block wins;
//! - a block that is never closed, or whose top level is not a mapping,
//!   makes the result [`Extraction::Unrecoverable`]; declarations are still
//!   returned as the partial result.
//!
//! Extraction is a pure function of the source text.
//!
//! ## Writing back
//!
//! [`rewrite`] produces new source text for a [`Metadata`] value, touching
//! only metadata lines: declarations are updated in place when possible,
//! everything else goes into the block, and the block is left byte-for-byte
//! untouched when its content did not change.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::merge::yaml::key_to_string;

/// First line of a metadata block.
pub const BLOCK_BEGIN: &str = "%### BEGIN metadata ###";
/// Last line of a metadata block.
pub const BLOCK_END: &str = "%### END metadata ###";

/// Normalize a metadata key: trimmed, lower-cased, spaces and hyphens
/// turned into underscores.
pub fn normalize_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '\t' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// A metadata value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Convert a YAML value. Nulls have no metadata representation.
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Sequence(items) => Some(Self::List(
                items.iter().filter_map(Self::from_yaml).collect(),
            )),
            Value::Mapping(map) => Some(Self::Map(
                map.iter()
                    .filter_map(|(k, v)| Some((key_to_string(k)?, Self::from_yaml(v)?)))
                    .collect(),
            )),
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }

    pub fn to_yaml(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Float(f) => Value::Number((*f).into()),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Sequence(items.iter().map(Self::to_yaml).collect()),
            Self::Map(map) => {
                let mut out = Mapping::new();
                for (k, v) in map {
                    out.insert(Value::String(k.clone()), v.to_yaml());
                }
                Value::Mapping(out)
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a value typed by a user, e.g. on the command line.
    ///
    /// YAML scalars and flow lists are recognized (`3`, `true`,
    /// `[a, b]`); anything that does not parse is kept as text.
    pub fn parse_user(text: &str) -> Self {
        serde_yaml::from_str::<Value>(text)
            .ok()
            .and_then(|v| Self::from_yaml(&v))
            .unwrap_or_else(|| Self::Text(text.to_string()))
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Where a metadata entry lives in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The YAML metadata block
    Block,
    /// A command declaration such as `\newcommand{\DocTitle}{...}`
    Command(String),
    /// Set in memory, not written yet
    Assigned,
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: MetadataValue,
    origin: Origin,
}

/// Ordered metadata of one document.
///
/// Equality compares keys and values only: two values are equal when they
/// hold the same keys with the same values, regardless of order or origin.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<Entry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = normalize_key(key);
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.position(key).map(|i| &self.entries[i].value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Text of a key, if it holds text or a number.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            MetadataValue::Text(s) if s.trim().is_empty() => None,
            MetadataValue::Text(s) => Some(s.clone()),
            MetadataValue::Integer(i) => Some(i.to_string()),
            MetadataValue::Float(x) => Some(x.to_string()),
            _ => None,
        }
    }

    pub fn origin(&self, key: &str) -> Option<&Origin> {
        self.position(key).map(|i| &self.entries[i].origin)
    }

    /// Set a key. An existing key keeps its position and origin.
    pub fn set(&mut self, key: &str, value: impl Into<MetadataValue>) {
        let value = value.into();
        match self.position(key) {
            Some(i) => self.entries[i].value = value,
            None => self.entries.push(Entry {
                key: normalize_key(key),
                value,
                origin: Origin::Assigned,
            }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.position(key).map(|i| self.entries.remove(i).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Key/value pairs as a sorted map, e.g. for serialization.
    pub fn to_map(&self) -> BTreeMap<String, MetadataValue> {
        self.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// The same keys and values with no origin, so that [`rewrite`] puts
    /// every key in the metadata block and drops their declarations.
    pub fn detached(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    origin: Origin::Assigned,
                    ..e.clone()
                })
                .collect(),
        }
    }

    fn insert_with_origin(&mut self, key: String, value: MetadataValue, origin: Origin) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.origin = origin;
            }
            None => self.entries.push(Entry { key, value, origin }),
        }
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

/// How serious an extraction issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A recoverable problem found while extracting metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    /// 1-based source line
    pub line: Option<usize>,
    pub key: Option<String>,
    pub message: String,
}

impl Issue {
    pub(crate) fn warning(line: usize, key: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line: Some(line + 1),
            key: key.map(String::from),
            message: message.into(),
        }
    }

    fn error(line: usize, key: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line: Some(line + 1),
            key: key.map(String::from),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", level)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(key) = &self.key {
            write!(f, " [{}]", key)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of extracting metadata from a source text
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Metadata was extracted, possibly with recoverable issues.
    Complete {
        metadata: Metadata,
        issues: Vec<Issue>,
    },
    /// The metadata block is structurally broken. `partial` holds what could
    /// still be read (command declarations); `issues` is never empty.
    Unrecoverable {
        partial: Metadata,
        issues: Vec<Issue>,
    },
}

impl Extraction {
    pub fn into_parts(self) -> (Metadata, Vec<Issue>) {
        match self {
            Extraction::Complete { metadata, issues } => (metadata, issues),
            Extraction::Unrecoverable { partial, issues } => (partial, issues),
        }
    }

    pub fn issues(&self) -> &[Issue] {
        match self {
            Extraction::Complete { issues, .. } | Extraction::Unrecoverable { issues, .. } => issues,
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Extraction::Unrecoverable { .. })
    }
}

/// Mapping between LaTeX command names (without backslash) and metadata keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexKeyMap {
    pairs: Vec<(String, String)>,
}

impl TexKeyMap {
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Add or replace the key a command maps to.
    pub fn with(mut self, command: &str, key: &str) -> Self {
        self.pairs.retain(|(c, _)| c != command);
        self.pairs.push((command.to_string(), normalize_key(key)));
        self
    }

    pub fn key_for(&self, command: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(c, _)| c == command)
            .map(|(_, k)| k.as_str())
    }

    pub fn command_for(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.pairs
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(c, _)| c.as_str())
    }
}

impl Default for TexKeyMap {
    fn default() -> Self {
        Self::empty()
            .with("DocId", "id")
            .with("DocTitle", "title")
            .with("DocType", "doc_type")
            .with("DocVariant", "variant")
            .with("DocVersion", "version")
            .with("DocAuthor", "author")
            .with("DocClass", "class")
            .with("DocSubject", "subject")
    }
}

/// Extract metadata with the default command map.
pub fn extract(source: &str) -> (Metadata, Vec<Issue>) {
    extract_detailed(source, &TexKeyMap::default()).into_parts()
}

/// Extract metadata, distinguishing unrecoverable blocks.
pub fn extract_detailed(source: &str, keys: &TexKeyMap) -> Extraction {
    let scan = Scan::new(source, keys);
    let mut metadata = Metadata::new();
    let mut issues = scan.issues.clone();

    for site in &scan.commands {
        if let Some(previous) = metadata.origin(&site.key) {
            issues.push(Issue::warning(
                site.line,
                Some(&site.key),
                format!(
                    "declared again by \\{} (previous: {}); keeping the last declaration",
                    site.command,
                    describe_origin(previous)
                ),
            ));
        }
        metadata.insert_with_origin(
            site.key.clone(),
            MetadataValue::Text(site.body.clone()),
            Origin::Command(site.command.clone()),
        );
    }

    if scan.unrecoverable {
        return Extraction::Unrecoverable {
            partial: metadata,
            issues,
        };
    }

    for entry in &scan.entries {
        let Ok((key, value)) = &entry.parsed else {
            continue;
        };
        match metadata.origin(key) {
            Some(Origin::Block) => issues.push(Issue::warning(
                entry.line,
                Some(key),
                "duplicate key in metadata block; keeping the last value",
            )),
            Some(Origin::Command(command)) => issues.push(Issue::warning(
                entry.line,
                Some(key),
                format!(
                    "also declared by \\{}; the metadata block value wins",
                    command
                ),
            )),
            _ => {}
        }
        metadata.insert_with_origin(key.clone(), value.clone(), Origin::Block);
    }

    Extraction::Complete { metadata, issues }
}

fn describe_origin(origin: &Origin) -> String {
    match origin {
        Origin::Block => "metadata block".to_string(),
        Origin::Command(c) => format!("\\{}", c),
        Origin::Assigned => "unsaved value".to_string(),
    }
}

/// Metadata syntax a source is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// No metadata at all
    Bare,
    /// Format 1: command declarations only
    Commands,
    /// Format 2 with leftover format 1 declarations
    Mixed,
    /// Format 2: a metadata block and no mapped declarations
    Block,
}

impl SourceFormat {
    /// Detect the format of `source`. A malformed block still counts as a
    /// block.
    pub fn detect(source: &str, keys: &TexKeyMap) -> Self {
        let scan = Scan::new(source, keys);
        let has_block = scan.block.is_some() || scan.unrecoverable;
        match (has_block, scan.commands.is_empty()) {
            (true, true) => Self::Block,
            (true, false) => Self::Mixed,
            (false, false) => Self::Commands,
            (false, true) => Self::Bare,
        }
    }

    /// Format version number; `None` without metadata.
    pub fn version(self) -> Option<u32> {
        match self {
            Self::Bare => None,
            Self::Commands => Some(1),
            Self::Mixed | Self::Block => Some(2),
        }
    }

    /// Whether declarations remain to be moved into the block.
    pub fn needs_migration(self) -> bool {
        matches!(self, Self::Commands | Self::Mixed)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare => write!(f, "no metadata"),
            Self::Commands => write!(f, "format 1 (commands)"),
            Self::Mixed => write!(f, "format 2 with commands"),
            Self::Block => write!(f, "format 2 (block)"),
        }
    }
}

/// Produce new source text with `metadata` written back.
///
/// Fails when the existing metadata block is unrecoverable, since rewriting
/// it could destroy content.
pub fn rewrite(
    source: &str,
    metadata: &Metadata,
    keys: &TexKeyMap,
) -> std::result::Result<String, String> {
    let scan = Scan::new(source, keys);
    if scan.unrecoverable {
        return Err("the metadata block is malformed; fix it by hand before saving".to_string());
    }
    let eol = if source.contains("\r\n") { "\r\n" } else { "\n" };

    // The effective declaration of a key is its last one.
    let mut effective_sites: BTreeMap<&str, usize> = BTreeMap::new();
    for (index, site) in scan.commands.iter().enumerate() {
        effective_sites.insert(site.key.as_str(), index);
    }

    let mut in_place: BTreeMap<usize, String> = BTreeMap::new();
    let mut block_entries: Vec<(&str, &MetadataValue)> = Vec::new();

    for (key, value) in metadata.iter() {
        let stays_in_command = matches!(metadata.origin(key), Some(Origin::Command(_)))
            && value.as_text().is_some_and(fits_in_command)
            && effective_sites.contains_key(key);
        if stays_in_command {
            if let (Some(index), Some(text)) = (effective_sites.get(key), value.as_text()) {
                in_place.insert(*index, text.to_string());
            }
        } else {
            block_entries.push((key, value));
        }
    }

    // Declarations for keys that are gone or that move into the block.
    // A declaration shadowed by the block stays where it is.
    let dropped: Vec<usize> = scan
        .commands
        .iter()
        .enumerate()
        .filter(|(_, site)| match metadata.origin(&site.key) {
            None | Some(Origin::Assigned) => true,
            Some(Origin::Block) => false,
            Some(Origin::Command(_)) => !effective_sites
                .get(site.key.as_str())
                .is_some_and(|i| in_place.contains_key(i)),
        })
        .map(|(index, _)| index)
        .collect();

    let block_changed = {
        let current: BTreeMap<&str, &MetadataValue> = scan
            .entries
            .iter()
            .filter_map(|e| e.parsed.as_ref().ok().map(|(k, v)| (k.as_str(), v)))
            .collect();
        let wanted: BTreeMap<&str, &MetadataValue> = block_entries.iter().copied().collect();
        current != wanted
    };

    let new_block = if block_changed {
        let preserved: Vec<&str> = scan
            .entries
            .iter()
            .filter(|e| e.parsed.is_err())
            .flat_map(|e| e.raw_lines.iter().map(|i| scan.lines[*i]))
            .collect();
        Some(render_block(&block_entries, &preserved, eol)?)
    } else {
        None
    };

    let mut out = String::with_capacity(source.len() + 256);
    if let (Some(block), None) = (&new_block, scan.block) {
        if !block_entries.is_empty() {
            out.push_str(block);
        }
    }

    let sites_by_line: BTreeMap<usize, usize> = scan
        .commands
        .iter()
        .enumerate()
        .filter(|(index, _)| in_place.contains_key(index))
        .map(|(index, site)| (site.line, index))
        .collect();

    for (line_index, line) in scan.lines.iter().enumerate() {
        if let Some((begin, end)) = scan.block {
            if line_index == begin {
                match &new_block {
                    Some(block) => out.push_str(block),
                    None => {
                        for original in &scan.lines[begin..=end] {
                            out.push_str(original);
                        }
                    }
                }
                continue;
            }
            if line_index > begin && line_index <= end {
                continue;
            }
        }
        if let Some(index) = sites_by_line.get(&line_index) {
            let site = &scan.commands[*index];
            let text = &in_place[index];
            out.push_str(&line[..site.body_start]);
            out.push_str(text);
            out.push_str(&line[site.body_end..]);
            continue;
        }
        let dropped_here: Vec<&CommandSite> = dropped
            .iter()
            .map(|i| &scan.commands[*i])
            .filter(|site| site.line == line_index)
            .collect();
        if !dropped_here.is_empty() {
            let rest = remove_declarations(line, &dropped_here);
            if !rest.trim().is_empty() {
                out.push_str(&rest);
            }
            continue;
        }
        out.push_str(line);
    }

    // A block whose END line had no newline at end of file keeps none.
    if let (Some(_), Some((_, end))) = (&new_block, scan.block) {
        if !scan.lines[end].ends_with('\n') && out.ends_with(eol) {
            out.truncate(out.len() - eol.len());
        }
    }

    Ok(out)
}

fn render_block(
    entries: &[(&str, &MetadataValue)],
    preserved: &[&str],
    eol: &str,
) -> std::result::Result<String, String> {
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(Value::String(key.to_string()), value.to_yaml());
    }
    let yaml = if map.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(&map).map_err(|e| e.to_string())?
    };

    let mut out = String::new();
    out.push_str(BLOCK_BEGIN);
    out.push_str(eol);
    for line in yaml.lines() {
        if line.is_empty() {
            out.push('%');
        } else {
            out.push_str("% ");
            out.push_str(line);
        }
        out.push_str(eol);
    }
    for line in preserved {
        out.push_str(line.trim_end_matches(['\r', '\n']));
        out.push_str(eol);
    }
    out.push_str(BLOCK_END);
    out.push_str(eol);
    Ok(out)
}

/// Remove declarations from their line, keeping anything else written on it.
fn remove_declarations(line: &str, sites: &[&CommandSite]) -> String {
    let mut out = String::new();
    let mut cursor = 0;
    for site in sites {
        out.push_str(&line[cursor..site.decl_start]);
        cursor = site.decl_end;
    }
    out.push_str(&line[cursor..]);
    out
}

/// Whether `text` reads back unchanged from a command body: one line,
/// balanced braces, no comment, nothing that extraction trims away.
fn fits_in_command(text: &str) -> bool {
    !text.is_empty()
        && text == text.trim()
        && !text.contains(['\n', '\r'])
        && braces_balanced(text)
        && comment_start(text) == text.len()
}

fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !escaped
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CommandSite {
    key: String,
    command: String,
    body: String,
    line: usize,
    /// Byte offsets within the line
    decl_start: usize,
    decl_end: usize,
    body_start: usize,
    body_end: usize,
}

#[derive(Debug, Clone)]
struct BlockEntry {
    line: usize,
    raw_lines: Vec<usize>,
    parsed: std::result::Result<(String, MetadataValue), ()>,
}

struct Scan<'a> {
    lines: Vec<&'a str>,
    /// Line indices of the BEGIN and END markers
    block: Option<(usize, usize)>,
    unrecoverable: bool,
    entries: Vec<BlockEntry>,
    commands: Vec<CommandSite>,
    issues: Vec<Issue>,
}

fn is_marker(line: &str, marker: &str) -> bool {
    let normalized: Vec<&str> = line.split_whitespace().collect();
    let expected: Vec<&str> = marker.split_whitespace().collect();
    normalized == expected
}

impl<'a> Scan<'a> {
    fn new(source: &'a str, keys: &TexKeyMap) -> Self {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        let mut scan = Scan {
            lines,
            block: None,
            unrecoverable: false,
            entries: Vec::new(),
            commands: Vec::new(),
            issues: Vec::new(),
        };

        let begin = scan.lines.iter().position(|l| is_marker(l, BLOCK_BEGIN));
        let end = begin.and_then(|b| {
            scan.lines[b + 1..]
                .iter()
                .position(|l| is_marker(l, BLOCK_END))
                .map(|offset| b + 1 + offset)
        });

        match (begin, end) {
            (Some(b), Some(e)) => {
                scan.block = Some((b, e));
                scan.scan_block(b, e);
                if let Some(extra) = scan.lines[e + 1..]
                    .iter()
                    .position(|l| is_marker(l, BLOCK_BEGIN))
                {
                    scan.issues.push(Issue::warning(
                        e + 1 + extra,
                        None,
                        "additional metadata block ignored",
                    ));
                }
            }
            (Some(b), None) => {
                scan.unrecoverable = true;
                scan.issues.push(Issue::error(
                    b,
                    None,
                    format!("metadata block is never closed (expected '{}')", BLOCK_END),
                ));
            }
            _ => {}
        }

        scan.scan_commands(keys, begin, end);
        scan
    }

    fn body_text(line: &str) -> String {
        let line = line.trim_end_matches(['\n', '\r']);
        let stripped = match line.trim_start().strip_prefix('%') {
            Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
            None => line,
        };
        let indent: String = stripped
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { "    " } else { " " })
            .collect();
        let rest = stripped.trim_start_matches([' ', '\t']);
        format!("{}{}", indent, rest)
    }

    fn scan_block(&mut self, begin: usize, end: usize) {
        let body: Vec<(usize, String)> = (begin + 1..end)
            .map(|i| (i, Self::body_text(self.lines[i])))
            .collect();

        let whole: Vec<&str> = body.iter().map(|(_, t)| t.as_str()).collect();
        if let Ok(value) = serde_yaml::from_str::<Value>(&whole.join("\n")) {
            match value {
                Value::Mapping(_) | Value::Null => {}
                other => {
                    self.unrecoverable = true;
                    self.issues.push(Issue::error(
                        begin,
                        None,
                        format!(
                            "metadata block must be a mapping of keys to values, found {}",
                            crate::merge::yaml::type_name(&other)
                        ),
                    ));
                    return;
                }
            }
        }

        let mut groups: Vec<(usize, Vec<usize>, Vec<String>)> = Vec::new();
        for (index, text) in body {
            let trimmed = text.trim();
            let top_level = !text.starts_with([' ', '\t']);
            if top_level && (trimmed.starts_with('#') || trimmed == "---" || trimmed == "...") {
                continue;
            }
            let continuation = trimmed.is_empty() || !top_level || trimmed.starts_with('-');
            match groups.last_mut() {
                Some((_, raw, lines)) if continuation => {
                    raw.push(index);
                    lines.push(text);
                }
                _ if continuation && trimmed.is_empty() => {}
                _ if continuation => self.issues.push(Issue::warning(
                    index,
                    None,
                    "line does not belong to any key; ignored",
                )),
                _ => groups.push((index, vec![index], vec![text])),
            }
        }

        for (line, raw_lines, texts) in groups {
            let text = texts.join("\n");
            let guessed = guess_key(&texts[0]);
            let parsed = match serde_yaml::from_str::<Value>(&text) {
                Ok(Value::Mapping(map)) => {
                    let mut pairs = Vec::new();
                    for (k, v) in &map {
                        let Some(key) = key_to_string(k).map(|k| normalize_key(&k)) else {
                            self.issues.push(Issue::error(line, None, "keys must be scalars"));
                            continue;
                        };
                        match MetadataValue::from_yaml(v) {
                            Some(value) => pairs.push((key, value)),
                            None => self.issues.push(Issue::warning(
                                line,
                                Some(&key),
                                "key has no value; ignored",
                            )),
                        }
                    }
                    pairs
                }
                Ok(_) => {
                    self.issues.push(Issue::error(
                        line,
                        guessed.as_deref(),
                        "expected 'key: value'",
                    ));
                    self.entries.push(BlockEntry {
                        line,
                        raw_lines,
                        parsed: Err(()),
                    });
                    continue;
                }
                Err(e) => {
                    let detail = e.to_string();
                    let detail = detail.lines().next().unwrap_or_default().to_string();
                    self.issues.push(Issue::error(
                        line,
                        guessed.as_deref(),
                        format!("malformed value, key omitted: {}", detail),
                    ));
                    self.entries.push(BlockEntry {
                        line,
                        raw_lines,
                        parsed: Err(()),
                    });
                    continue;
                }
            };
            for pair in parsed {
                self.entries.push(BlockEntry {
                    line,
                    raw_lines: raw_lines.clone(),
                    parsed: Ok(pair),
                });
            }
        }
    }

    fn scan_commands(&mut self, keys: &TexKeyMap, begin: Option<usize>, end: Option<usize>) {
        for (index, line) in self.lines.iter().enumerate() {
            let inside_block = match (begin, end) {
                (Some(b), Some(e)) => index >= b && index <= e,
                (Some(b), None) => index >= b,
                _ => false,
            };
            if inside_block {
                continue;
            }
            for decl in find_declarations(line) {
                let Some(key) = keys.key_for(&decl.name) else {
                    continue;
                };
                let Some((body_start, body_end)) = decl.body else {
                    self.issues.push(Issue::error(
                        index,
                        Some(key),
                        format!("body of \\{} is not closed on its line; ignored", decl.name),
                    ));
                    continue;
                };
                let body = line[body_start..body_end].trim().to_string();
                if body.is_empty() {
                    continue;
                }
                self.commands.push(CommandSite {
                    key: key.to_string(),
                    command: decl.name,
                    body,
                    line: index,
                    decl_start: decl.start,
                    decl_end: body_end + 1,
                    body_start,
                    body_end,
                });
            }
        }
    }
}

fn guess_key(first_line: &str) -> Option<String> {
    let (key, _) = first_line.split_once(':')?;
    let key = key.trim().trim_matches(['"', '\'']);
    if key.is_empty() {
        None
    } else {
        Some(normalize_key(key))
    }
}

struct Declaration {
    name: String,
    start: usize,
    /// Byte range of the body, or `None` when it is not closed on the line
    body: Option<(usize, usize)>,
}

/// Byte offset of the first unescaped `%`, which starts a TeX comment.
fn comment_start(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'%' => return i,
            _ => i += 1,
        }
    }
    line.len()
}

/// Find `\newcommand{\Name}{body}`, `\renewcommand`, `\providecommand`
/// and `\def\Name{body}` declarations without arguments.
fn find_declarations(line: &str) -> Vec<Declaration> {
    const KEYWORDS: [&str; 4] = ["newcommand", "renewcommand", "providecommand", "def"];
    let limit = comment_start(line);
    let bytes = line.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < limit {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        let start = i;
        let word_end = line[i + 1..]
            .find(|c: char| !c.is_ascii_alphabetic())
            .map(|n| i + 1 + n)
            .unwrap_or(line.len());
        let word = &line[i + 1..word_end];
        if !KEYWORDS.contains(&word) {
            i = word_end.max(i + 2);
            continue;
        }

        let mut pos = word_end;
        if line[pos..].starts_with('*') {
            pos += 1;
        }
        pos = skip_spaces(line, pos);

        let braced_name = word != "def" && line[pos..].starts_with('{');
        if braced_name {
            pos = skip_spaces(line, pos + 1);
        }
        if !line[pos..].starts_with('\\') {
            i = pos.max(i + 1);
            continue;
        }
        let name_end = line[pos + 1..]
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '@'))
            .map(|n| pos + 1 + n)
            .unwrap_or(line.len());
        let name = line[pos + 1..name_end].to_string();
        pos = skip_spaces(line, name_end);
        if braced_name {
            if !line[pos..].starts_with('}') {
                i = pos.max(i + 1);
                continue;
            }
            pos = skip_spaces(line, pos + 1);
        }
        if line[pos..].starts_with('[') {
            // Commands taking arguments are not metadata.
            i = pos + 1;
            continue;
        }
        if name.is_empty() || !line[pos..].starts_with('{') {
            i = pos.max(i + 1);
            continue;
        }

        let body_start = pos + 1;
        let body = closing_brace(line, body_start, limit).map(|close| (body_start, close));
        i = match body {
            Some((_, close)) => close + 1,
            None => limit,
        };
        found.push(Declaration { name, start, body });
    }

    found
}

fn skip_spaces(line: &str, pos: usize) -> usize {
    line[pos..]
        .find(|c: char| c != ' ' && c != '\t')
        .map(|n| pos + n)
        .unwrap_or(line.len())
}

/// Index of the brace closing the group opened just before `from`.
fn closing_brace(line: &str, from: usize, limit: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < limit {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
