//! # Document Model
//!
//! A [`Document`] ties together a source file, the metadata extracted from
//! it and, once resolved, the configuration it is compiled with. There is
//! no ambient "current document": every operation receives the documents it
//! works on.
//!
//! Metadata changes made through [`Document::set_metadata`] and
//! [`Document::remove_metadata`] live in memory until [`Document::save`]
//! writes them back into the source.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::filesystem::{rename_no_clobber, write_atomic};
use crate::metadata::{
    extract_detailed, rewrite, Issue, Metadata, MetadataValue, SourceFormat, TexKeyMap,
};
use crate::settings::MetadataDefaults;

/// A stable unique document identifier (metadata key `id`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentIdentity(String);

impl DocumentIdentity {
    /// Wrap an identifier. Blank identifiers are "not assigned".
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Identity built from a digest-derived string, never blank.
    pub(crate) fn from_digest(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pedagogical classification, derived from the `doc_type` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// `cours`
    Course,
    /// `td`
    Tutorial,
    /// `tp`
    Lab,
    /// `colle`
    OralExam,
    Other(String),
}

impl DocumentKind {
    pub fn from_doc_type(doc_type: &str) -> Self {
        match doc_type.trim().to_lowercase().as_str() {
            "cours" | "course" => Self::Course,
            "td" | "tutorial" => Self::Tutorial,
            "tp" | "lab" => Self::Lab,
            "colle" | "oral" => Self::OralExam,
            other => Self::Other(other.to_string()),
        }
    }

    /// The `doc_type` spelling of this kind.
    pub fn code(&self) -> &str {
        match self {
            Self::Course => "cours",
            Self::Tutorial => "td",
            Self::Lab => "tp",
            Self::OralExam => "colle",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course => write!(f, "course"),
            Self::Tutorial => write!(f, "tutorial"),
            Self::Lab => write!(f, "lab"),
            Self::OralExam => write!(f, "oral exam"),
            Self::Other(code) if code.is_empty() => write!(f, "unclassified"),
            Self::Other(code) => write!(f, "other ({})", code),
        }
    }
}

/// Byte encoding a source file was read in, and is written back in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    #[default]
    Utf8,
    /// Fallback for files that are not valid UTF-8; every byte maps to
    /// the code point of the same value
    Latin1,
}

impl SourceEncoding {
    /// Decode `bytes`, falling back to Latin-1 when they are not UTF-8.
    ///
    /// Returns the text, the encoding and, for the fallback, the 0-based
    /// line of the first byte that is not valid UTF-8.
    pub fn decode(bytes: Vec<u8>) -> (String, Self, Option<usize>) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, Self::Utf8, None),
            Err(e) => {
                let valid = e.utf8_error().valid_up_to();
                let bytes = e.into_bytes();
                let line = bytes[..valid].iter().filter(|b| **b == b'\n').count();
                let text = bytes.iter().map(|&b| char::from(b)).collect();
                (text, Self::Latin1, Some(line))
            }
        }
    }

    /// Encode `text` back to bytes, or name the first character this
    /// encoding cannot represent.
    pub fn encode(self, text: &str) -> std::result::Result<Vec<u8>, char> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| c))
                .collect(),
        }
    }
}

/// Result of looking up a metadata key
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataLookup<'a> {
    Set(&'a MetadataValue),
    NotSet,
}

impl<'a> MetadataLookup<'a> {
    pub fn value(&self) -> Option<&'a MetadataValue> {
        match self {
            MetadataLookup::Set(value) => Some(value),
            MetadataLookup::NotSet => None,
        }
    }
}

/// A source file with its metadata and, optionally, its resolved configuration
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    source: String,
    encoding: SourceEncoding,
    encoding_issue: Option<Issue>,
    metadata: Metadata,
    issues: Vec<Issue>,
    unrecoverable: bool,
    keys: TexKeyMap,
    config: Option<EffectiveConfig>,
    dirty: bool,
}

impl Document {
    /// Read and parse a source file with the default command map.
    ///
    /// Metadata problems never fail the call: they are available from
    /// [`Document::issues`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with_keys(path, TexKeyMap::default())
    }

    pub fn from_path_with_keys(path: impl AsRef<Path>, keys: TexKeyMap) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        let (source, encoding, invalid_line) = SourceEncoding::decode(bytes);
        let mut document = Self::from_source(path, source, keys);
        document.encoding = encoding;
        if let Some(line) = invalid_line {
            let issue = Issue::warning(
                line,
                None,
                "file is not valid UTF-8; read as Latin-1 and saved the same way",
            );
            document.issues.insert(0, issue.clone());
            document.encoding_issue = Some(issue);
        }
        Ok(document)
    }

    /// Build a document from text already in memory.
    pub fn from_source(path: impl Into<PathBuf>, source: impl Into<String>, keys: TexKeyMap) -> Self {
        let source = source.into();
        let extraction = extract_detailed(&source, &keys);
        let unrecoverable = extraction.is_unrecoverable();
        let (metadata, issues) = extraction.into_parts();
        Self {
            path: path.into(),
            source,
            encoding: SourceEncoding::Utf8,
            encoding_issue: None,
            metadata,
            issues,
            unrecoverable,
            keys,
            config: None,
            dirty: false,
        }
    }

    /// Attach the configuration this document is compiled with.
    pub fn with_config(mut self, config: EffectiveConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config(&self) -> Option<&EffectiveConfig> {
        self.config.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Whether the metadata block could not be read at all.
    pub fn is_unrecoverable(&self) -> bool {
        self.unrecoverable
    }

    /// Whether in-memory metadata differs from the file.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn metadata_value(&self, key: &str) -> MetadataLookup<'_> {
        match self.metadata.get(key) {
            Some(value) => MetadataLookup::Set(value),
            None => MetadataLookup::NotSet,
        }
    }

    /// Set a metadata key in memory. Call [`Document::save`] to persist.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<MetadataValue>) {
        self.metadata.set(key, value);
        self.dirty = true;
    }

    /// Remove a metadata key in memory. Returns the previous value.
    pub fn remove_metadata(&mut self, key: &str) -> Option<MetadataValue> {
        let previous = self.metadata.remove(key);
        if previous.is_some() {
            self.dirty = true;
        }
        previous
    }

    /// Write in-memory metadata back into the source file.
    ///
    /// Only metadata lines change. The file is replaced atomically, in the
    /// encoding it was read in, and the document is re-read from the
    /// written text. A value the file's encoding cannot hold is an error
    /// and nothing is written.
    pub fn save(&mut self) -> Result<()> {
        let text = self.rendered_source()?;
        if text != self.source {
            let bytes = self.encoding.encode(&text).map_err(|c| Error::Metadata {
                path: self.path.clone(),
                message: format!("'{}' cannot be written to a Latin-1 file", c),
            })?;
            write_atomic(&self.path, &bytes)?;
            debug!("Saved metadata of {}", self.path.display());
        }
        self.reload_from(text);
        Ok(())
    }

    /// The source text `save` would write, without writing it.
    pub fn rendered_source(&self) -> Result<String> {
        rewrite(&self.source, &self.metadata, &self.keys).map_err(|message| Error::Metadata {
            path: self.path.clone(),
            message,
        })
    }

    fn reload_from(&mut self, source: String) {
        let extraction = extract_detailed(&source, &self.keys);
        self.unrecoverable = extraction.is_unrecoverable();
        let (metadata, mut issues) = extraction.into_parts();
        if let Some(issue) = &self.encoding_issue {
            issues.insert(0, issue.clone());
        }
        self.source = source;
        self.metadata = metadata;
        self.issues = issues;
        self.dirty = false;
    }

    /// Metadata syntax of the source as last read or saved.
    pub fn format(&self) -> SourceFormat {
        SourceFormat::detect(&self.source, &self.keys)
    }

    /// Move every metadata key into the metadata block. Their command
    /// declarations are removed on the next [`Document::save`].
    ///
    /// Returns `false` when the source has no declarations to move.
    pub fn move_metadata_to_block(&mut self) -> bool {
        if !self.format().needs_migration() {
            return false;
        }
        self.metadata = self.metadata.detached();
        self.dirty = true;
        true
    }

    /// Move the source file, refusing to overwrite an existing one.
    pub fn rename_to(&mut self, new_path: &Path) -> Result<()> {
        rename_no_clobber(&self.path, new_path)?;
        self.path = new_path.to_path_buf();
        Ok(())
    }

    pub fn identity(&self) -> Option<DocumentIdentity> {
        self.metadata.text("id").and_then(DocumentIdentity::new)
    }

    /// File name without extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The metadata title, falling back to the file stem.
    pub fn title(&self) -> String {
        self.metadata.text("title").unwrap_or_else(|| self.stem())
    }

    /// Metadata text for `key`, or the configured default.
    pub fn text_or_default(&self, key: &str, defaults: &MetadataDefaults) -> Option<String> {
        self.metadata.text(key).or_else(|| match key {
            "doc_type" => Some(defaults.doc_type.clone()),
            "variant" => Some(defaults.variant.clone()),
            "version" => Some(defaults.version.clone()),
            _ => None,
        })
    }

    /// Classification from `doc_type`, or from the configured default when
    /// the document has none and a configuration is attached.
    pub fn kind(&self) -> DocumentKind {
        let doc_type = self.metadata.text("doc_type").or_else(|| {
            self.config
                .as_ref()
                .and_then(|c| c.optional_string("metadata.defaults.doc_type").ok().flatten())
        });
        match doc_type {
            Some(doc_type) => DocumentKind::from_doc_type(&doc_type),
            None => DocumentKind::Other(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let temp = TempDir::new().unwrap();
        let path = write_doc(
            temp.path(),
            "statics.tex",
            "%### BEGIN metadata ###\n% id: DOC-1\n% doc_type: td\n%### END metadata ###\nBody\n",
        );
        let doc = Document::from_path(&path).unwrap();
        assert_eq!(doc.identity().unwrap().as_str(), "DOC-1");
        assert_eq!(doc.kind(), DocumentKind::Tutorial);
        assert_eq!(doc.title(), "statics");
        assert!(doc.issues().is_empty());
        assert_eq!(
            doc.metadata_value("id"),
            MetadataLookup::Set(&MetadataValue::from("DOC-1"))
        );
        assert_eq!(doc.metadata_value("title"), MetadataLookup::NotSet);
    }

    #[test]
    fn test_set_is_in_memory_until_save() {
        let temp = TempDir::new().unwrap();
        let original = "\\documentclass{article}\nBody\n";
        let path = write_doc(temp.path(), "a.tex", original);

        let mut doc = Document::from_path(&path).unwrap();
        doc.set_metadata("title", "Optics");
        assert!(doc.is_dirty());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);

        doc.save().unwrap();
        assert!(!doc.is_dirty());
        let reopened = Document::from_path(&path).unwrap();
        assert_eq!(reopened.metadata(), doc.metadata());
        assert!(reopened.source().ends_with(original));
    }

    #[test]
    fn test_save_round_trip_with_commands() {
        let temp = TempDir::new().unwrap();
        let path = write_doc(
            temp.path(),
            "b.tex",
            "\\newcommand{\\DocTitle}{Waves}\n\\def\\DocClass{MP}\n\\begin{document}x\\end{document}\n",
        );
        let mut doc = Document::from_path(&path).unwrap();
        doc.set_metadata("title", "Waves and optics");
        doc.remove_metadata("class");
        doc.set_metadata("tags", MetadataValue::List(vec!["physics".into()]));
        doc.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\\newcommand{\\DocTitle}{Waves and optics}"));
        assert!(!text.contains("DocClass"));
        assert!(text.contains("\\begin{document}x\\end{document}\n"));

        let reopened = Document::from_path(&path).unwrap();
        assert_eq!(reopened.metadata(), doc.metadata());
    }

    #[test]
    fn test_save_refuses_unrecoverable_block() {
        let temp = TempDir::new().unwrap();
        let original = "%### BEGIN metadata ###\n% title: x\nBody\n";
        let path = write_doc(temp.path(), "c.tex", original);
        let mut doc = Document::from_path(&path).unwrap();
        assert!(doc.is_unrecoverable());
        doc.set_metadata("id", "DOC-2");
        assert!(matches!(doc.save(), Err(Error::Metadata { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_rename_to() {
        let temp = TempDir::new().unwrap();
        let path = write_doc(temp.path(), "old.tex", "x");
        let taken = write_doc(temp.path(), "taken.tex", "y");
        let mut doc = Document::from_path(&path).unwrap();

        assert!(doc.rename_to(&taken).is_err());
        assert_eq!(doc.path(), path.as_path());

        let target = temp.path().join("new.tex");
        doc.rename_to(&target).unwrap();
        assert_eq!(doc.path(), target.as_path());
        assert!(target.exists());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(DocumentKind::from_doc_type("Cours"), DocumentKind::Course);
        assert_eq!(DocumentKind::from_doc_type("TP"), DocumentKind::Lab);
        assert_eq!(DocumentKind::from_doc_type("colle"), DocumentKind::OralExam);
        assert_eq!(
            DocumentKind::from_doc_type("exam"),
            DocumentKind::Other("exam".to_string())
        );
        assert_eq!(DocumentKind::Tutorial.code(), "td");
    }

    #[test]
    fn test_blank_identity_is_unassigned() {
        assert!(DocumentIdentity::new("   ").is_none());
        assert_eq!(DocumentIdentity::new(" X ").unwrap().as_str(), "X");
    }

    #[test]
    fn test_latin1_source_is_saved_in_latin1() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("legacy.tex");
        let mut original = b"\\newcommand{\\DocTitle}{Optique}\n".to_vec();
        original.extend_from_slice(b"\xe9t\xe9 chaud\n");
        fs::write(&path, &original).unwrap();

        let mut doc = Document::from_path(&path).unwrap();
        assert_eq!(doc.encoding(), SourceEncoding::Latin1);
        assert_eq!(doc.issues().len(), 1);
        assert_eq!(doc.issues()[0].line, Some(2));
        assert!(doc.issues()[0].message.contains("Latin-1"));
        assert!(doc.source().contains("été chaud"));

        doc.set_metadata("title", "Électricité");
        doc.save().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"}\n\xe9t\xe9 chaud\n"));
        assert!(bytes.starts_with(b"\\newcommand{\\DocTitle}{\xc9lectricit\xe9}\n"));
        assert_eq!(doc.issues().len(), 1);
        assert_eq!(
            Document::from_path(&path).unwrap().title(),
            "Électricité"
        );
    }

    #[test]
    fn test_latin1_source_refuses_unencodable_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("legacy.tex");
        let original = b"\\newcommand{\\DocTitle}{Optique}\n\xe9t\xe9\n".to_vec();
        fs::write(&path, &original).unwrap();

        let mut doc = Document::from_path(&path).unwrap();
        doc.set_metadata("title", "Optique → ondes");
        let err = doc.save().unwrap_err();
        assert!(err.to_string().contains("Latin-1"));
        assert_eq!(fs::read(&path).unwrap(), original);
    }
}
