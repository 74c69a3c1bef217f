//! Package archive layout.
//!
//! A package is a zip file laid out as an Open Packaging Conventions package:
//!
//! | Part | Contents |
//! |------|----------|
//! | `[Content_Types].xml` | content type per file extension |
//! | `_rels/.rels` | relationships from the package root |
//! | `{id}.nuspec` | the manifest, related from the root |
//! | `package/services/metadata/core-properties/*.psmdcp` | core properties |
//! | everything else | package content |
//!
//! Part names inside the zip use `/`; callers pass package paths with `\`.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::io::{self, Read, Seek, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Relationship type linking the package root to its manifest.
pub const MANIFEST_RELATIONSHIP_TYPE: &str =
    "http://schemas.microsoft.com/packaging/2010/07/manifest";

/// Relationship type linking the package root to its core properties.
pub const CORE_PROPERTIES_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

/// Part holding the root relationships.
pub const RELATIONSHIPS_PART: &str = "_rels/.rels";

/// Part holding the content type table.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Directory holding the core properties part.
pub const CORE_PROPERTIES_DIRECTORY: &str = "package/services/metadata/core-properties";

const RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";
const CORE_PROPERTIES_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const DUBLIN_CORE_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const DUBLIN_CORE_TERMS_NAMESPACE: &str = "http://purl.org/dc/terms/";

const RELATIONSHIPS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";
const CORE_PROPERTIES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.core-properties+xml";
const DEFAULT_CONTENT_TYPE: &str = "application/octet";

/// Errors from reading or writing the archive layout.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The zip container is invalid.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A layout part is not valid XML.
    #[error("XML error in '{part}': {message}")]
    Xml {
        /// Part being read or written.
        part: String,
        /// What went wrong.
        message: String,
    },

    /// Two parts map to the same name.
    #[error("the package already contains a part named '{0}'")]
    DuplicatePart(String),

    /// A part name is empty or escapes the package root.
    #[error("'{0}' is not a valid part name")]
    InvalidPartName(String),

    /// A required part is missing.
    #[error("the package has no part named '{0}'")]
    MissingPart(String),
}

fn xml_error(part: &str, err: impl Display) -> ArchiveError {
    ArchiveError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}

/// A relationship from the package root to a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    /// Relationship id, unique within the package.
    pub id: String,
    /// Relationship type URI.
    pub relationship_type: String,
    /// Absolute part name of the target, e.g. `/Sample.nuspec`.
    pub target: String,
}

impl Relationship {
    /// Part name of the target without its leading `/`.
    pub fn target_part(&self) -> &str {
        self.target.trim_start_matches('/')
    }
}

/// Dublin Core properties describing the package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoreProperties {
    /// Package authors.
    pub creator: String,
    /// Package description.
    pub description: String,
    /// Package id.
    pub identifier: String,
    /// Package version.
    pub version: String,
    /// Package locale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Package tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    /// Tool that wrote the package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
}

/// Convert a package path (`lib\net45\a.dll`) to a zip part name
/// (`lib/net45/a.dll`).
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidPartName`] for empty names and names with
/// `.` or `..` segments.
pub fn part_name(package_path: &str) -> Result<String, ArchiveError> {
    let name = package_path.replace('\\', "/");
    let name = name.trim_start_matches('/');
    let valid = !name.is_empty()
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(name.to_string())
    } else {
        Err(ArchiveError::InvalidPartName(package_path.to_string()))
    }
}

/// Convert a zip part name back to a package path.
pub fn package_path(part_name: &str) -> String {
    part_name.trim_start_matches('/').replace('/', "\\")
}

/// Whether a part belongs to the archive layout rather than the content.
pub fn is_layout_part(part_name: &str) -> bool {
    let name = part_name.trim_start_matches('/');
    name == CONTENT_TYPES_PART
        || name.starts_with("_rels/")
        || name.ends_with(".rels")
        || name.starts_with("package/")
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Writes parts into a package archive.
///
/// The content-type table, relationships and core properties are written by
/// [`PackageWriter::finish`].
pub struct PackageWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    names: HashSet<String>,
    extensions: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
    relationships: Vec<Relationship>,
}

impl<W: Write + Seek> std::fmt::Debug for PackageWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageWriter")
            .field("parts", &self.names.len())
            .field("relationships", &self.relationships)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> PackageWriter<W> {
    /// Start a package in `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            names: HashSet::new(),
            extensions: BTreeMap::new(),
            overrides: BTreeMap::new(),
            relationships: Vec::new(),
        }
    }

    fn start_part(
        &mut self,
        package_path: &str,
        content_type: &str,
    ) -> Result<String, ArchiveError> {
        let name = part_name(package_path)?;
        if is_layout_part(&name) || !self.names.insert(name.to_lowercase()) {
            return Err(ArchiveError::DuplicatePart(name));
        }

        let file_name = name.rsplit('/').next().unwrap_or(&name);
        match file_name.rfind('.') {
            Some(index) if index > 0 => {
                self.extensions
                    .entry(file_name[index + 1..].to_lowercase())
                    .or_insert_with(|| content_type.to_string());
            }
            _ => {
                self.overrides.insert(format!("/{name}"), content_type.to_string());
            }
        }

        self.zip.start_file(name.as_str(), file_options())?;
        Ok(name)
    }

    /// Copy `content` into a new part at `package_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or already used, or on I/O
    /// failure.
    pub fn add_part(
        &mut self,
        package_path: &str,
        content: &mut dyn Read,
    ) -> Result<String, ArchiveError> {
        let name = self.start_part(package_path, DEFAULT_CONTENT_TYPE)?;
        io::copy(content, &mut self.zip)?;
        Ok(name)
    }

    /// Add a relationship from the package root to `part`.
    pub fn add_relationship(&mut self, relationship_type: &str, part: &str) -> &Relationship {
        let target = format!("/{}", part.trim_start_matches('/'));
        let id = format!("R{}", &digest(&[relationship_type, target.as_str()])[..16]);
        self.relationships.push(Relationship {
            id,
            relationship_type: relationship_type.to_string(),
            target,
        });
        &self.relationships[self.relationships.len() - 1]
    }

    /// Write the core properties, relationships and content types, and close
    /// the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if any layout part cannot be written.
    pub fn finish(mut self, properties: &CoreProperties) -> Result<W, ArchiveError> {
        let hash = digest(&[properties.identifier.as_str(), properties.version.as_str()]);
        let core_part = format!("{CORE_PROPERTIES_DIRECTORY}/{}.psmdcp", &hash[..32]);
        let xml = render_core_properties(properties)?;
        self.zip.start_file(core_part.as_str(), file_options())?;
        self.zip.write_all(xml.as_bytes())?;
        self.add_relationship(CORE_PROPERTIES_RELATIONSHIP_TYPE, &core_part);

        let xml = render_relationships(&self.relationships)?;
        self.zip.start_file(RELATIONSHIPS_PART, file_options())?;
        self.zip.write_all(xml.as_bytes())?;

        let xml = render_content_types(&self.extensions, &self.overrides)?;
        self.zip.start_file(CONTENT_TYPES_PART, file_options())?;
        self.zip.write_all(xml.as_bytes())?;

        Ok(self.zip.finish()?)
    }
}

/// Reads the layout of a package archive.
#[derive(Debug)]
pub struct PackageReader<R: Read + Seek> {
    zip: ZipArchive<R>,
    relationships: Vec<Relationship>,
    core_properties: Option<CoreProperties>,
}

impl<R: Read + Seek> PackageReader<R> {
    /// Open an archive and read its relationships and core properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid or has no root
    /// relationships part.
    pub fn open(reader: R) -> Result<Self, ArchiveError> {
        let zip = ZipArchive::new(reader)?;
        let mut package = Self {
            zip,
            relationships: Vec::new(),
            core_properties: None,
        };

        let rels = package.read_part(RELATIONSHIPS_PART)?;
        package.relationships = parse_relationships(&rels)?;

        let core_part = package
            .relationship(CORE_PROPERTIES_RELATIONSHIP_TYPE)
            .map(|r| r.target_part().to_string());
        if let Some(part) = core_part {
            let xml = package.read_part(&part)?;
            package.core_properties = Some(parse_core_properties(&part, &xml)?);
        }
        Ok(package)
    }

    /// Root relationships, in document order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// First root relationship of the given type.
    pub fn relationship(&self, relationship_type: &str) -> Option<&Relationship> {
        self.relationships
            .iter()
            .find(|r| r.relationship_type == relationship_type)
    }

    /// Core properties, when the package has them.
    pub fn core_properties(&self) -> Option<&CoreProperties> {
        self.core_properties.as_ref()
    }

    /// Every part name in the archive, including layout parts.
    pub fn part_names(&self) -> Vec<String> {
        self.zip
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect()
    }

    /// Read a part by name. `\` separators are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MissingPart`] if there is no such part.
    pub fn read_part(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let name = name.replace('\\', "/");
        let name = name.trim_start_matches('/');
        let mut file = match self.zip.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ArchiveError::MissingPart(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn new_writer() -> Result<Writer<Vec<u8>>, String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| e.to_string())?;
    Ok(writer)
}

fn finish_writer(writer: Writer<Vec<u8>>) -> Result<String, String> {
    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}

fn render_relationships(relationships: &[Relationship]) -> Result<String, ArchiveError> {
    let render = || -> Result<String, String> {
        let mut writer = new_writer()?;
        let mut root = BytesStart::new("Relationships");
        root.push_attribute(("xmlns", RELATIONSHIPS_NAMESPACE));
        writer.write_event(Event::Start(root)).map_err(|e| e.to_string())?;
        for relationship in relationships {
            let mut element = BytesStart::new("Relationship");
            element.push_attribute(("Type", relationship.relationship_type.as_str()));
            element.push_attribute(("Target", relationship.target.as_str()));
            element.push_attribute(("Id", relationship.id.as_str()));
            writer.write_event(Event::Empty(element)).map_err(|e| e.to_string())?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("Relationships")))
            .map_err(|e| e.to_string())?;
        finish_writer(writer)
    };
    render().map_err(|e| xml_error(RELATIONSHIPS_PART, e))
}

fn render_content_types(
    extensions: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> Result<String, ArchiveError> {
    let render = || -> Result<String, String> {
        let mut writer = new_writer()?;
        let mut root = BytesStart::new("Types");
        root.push_attribute(("xmlns", CONTENT_TYPES_NAMESPACE));
        writer.write_event(Event::Start(root)).map_err(|e| e.to_string())?;

        let layout = [
            ("rels", RELATIONSHIPS_CONTENT_TYPE),
            ("psmdcp", CORE_PROPERTIES_CONTENT_TYPE),
        ];
        let content = extensions
            .iter()
            .filter(|(ext, _)| !layout.iter().any(|(l, _)| l == ext))
            .map(|(ext, ty)| (ext.as_str(), ty.as_str()));
        for (extension, content_type) in layout.into_iter().chain(content) {
            let mut element = BytesStart::new("Default");
            element.push_attribute(("Extension", extension));
            element.push_attribute(("ContentType", content_type));
            writer.write_event(Event::Empty(element)).map_err(|e| e.to_string())?;
        }
        for (part, content_type) in overrides {
            let mut element = BytesStart::new("Override");
            element.push_attribute(("PartName", part.as_str()));
            element.push_attribute(("ContentType", content_type.as_str()));
            writer.write_event(Event::Empty(element)).map_err(|e| e.to_string())?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("Types")))
            .map_err(|e| e.to_string())?;
        finish_writer(writer)
    };
    render().map_err(|e| xml_error(CONTENT_TYPES_PART, e))
}

fn render_core_properties(properties: &CoreProperties) -> Result<String, ArchiveError> {
    let render = || -> Result<String, String> {
        let mut writer = new_writer()?;
        let mut root = BytesStart::new("coreProperties");
        root.push_attribute(("xmlns:dc", DUBLIN_CORE_NAMESPACE));
        root.push_attribute(("xmlns:dcterms", DUBLIN_CORE_TERMS_NAMESPACE));
        root.push_attribute(("xmlns", CORE_PROPERTIES_NAMESPACE));
        writer.write_event(Event::Start(root)).map_err(|e| e.to_string())?;

        let fields = [
            ("dc:creator", Some(properties.creator.as_str())),
            ("dc:description", Some(properties.description.as_str())),
            ("dc:identifier", Some(properties.identifier.as_str())),
            ("version", Some(properties.version.as_str())),
            ("dc:language", properties.language.as_deref()),
            ("keywords", properties.keywords.as_deref()),
            ("lastModifiedBy", properties.last_modified_by.as_deref()),
        ];
        for (name, value) in fields {
            let Some(value) = value else {
                continue;
            };
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(|e| e.to_string())?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(|e| e.to_string())?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(|e| e.to_string())?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("coreProperties")))
            .map_err(|e| e.to_string())?;
        finish_writer(writer)
    };
    render().map_err(|e| xml_error(CORE_PROPERTIES_DIRECTORY, e))
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, ArchiveError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(RELATIONSHIPS_PART, e))? {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"Relationship" =>
            {
                let mut relationship = Relationship {
                    id: String::new(),
                    relationship_type: String::new(),
                    target: String::new(),
                };
                for attr in element.attributes() {
                    let attr = attr.map_err(|e| xml_error(RELATIONSHIPS_PART, e))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| xml_error(RELATIONSHIPS_PART, e))?
                        .into_owned();
                    match attr.key.as_ref() {
                        b"Id" => relationship.id = value,
                        b"Type" => relationship.relationship_type = value,
                        b"Target" => relationship.target = value,
                        _ => {}
                    }
                }
                relationships.push(relationship);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

fn parse_core_properties(part: &str, xml: &[u8]) -> Result<CoreProperties, ArchiveError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut properties = CoreProperties::default();
    let mut current: Option<Vec<u8>> = None;
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Start(element) => current = Some(element.local_name().as_ref().to_vec()),
            Event::End(_) => current = None,
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| xml_error(part, e))?.trim().to_string();
                match current.as_deref() {
                    Some(b"creator") => properties.creator = value,
                    Some(b"description") => properties.description = value,
                    Some(b"identifier") => properties.identifier = value,
                    Some(b"version") => properties.version = value,
                    Some(b"language") => properties.language = Some(value),
                    Some(b"keywords") => properties.keywords = Some(value),
                    Some(b"lastModifiedBy") => properties.last_modified_by = Some(value),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn properties() -> CoreProperties {
        CoreProperties {
            creator: "alice".into(),
            description: "A & B".into(),
            identifier: "Sample".into(),
            version: "1.0.0".into(),
            language: None,
            keywords: Some("one two".into()),
            last_modified_by: Some("parcel".into()),
        }
    }

    fn write_sample() -> Vec<u8> {
        let mut writer = PackageWriter::new(Cursor::new(Vec::new()));
        writer
            .add_part(r"lib\net45\Sample.dll", &mut &b"binary"[..])
            .unwrap();
        writer.add_part("LICENSE", &mut &b"text"[..]).unwrap();
        let manifest = writer.add_part("Sample.nuspec", &mut &b"<package/>"[..]).unwrap();
        writer.add_relationship(MANIFEST_RELATIONSHIP_TYPE, &manifest);
        writer.finish(&properties()).unwrap().into_inner()
    }

    #[test]
    fn test_part_names() {
        assert_eq!(part_name(r"lib\net45\a.dll").unwrap(), "lib/net45/a.dll");
        assert_eq!(part_name(r"\a.dll").unwrap(), "a.dll");
        assert!(part_name("").is_err());
        assert!(part_name(r"lib\..\a.dll").is_err());
        assert!(part_name(r"lib\\a.dll").is_err());
        assert_eq!(package_path("/lib/net45/a.dll"), r"lib\net45\a.dll");
    }

    #[test]
    fn test_layout_round_trip() {
        let bytes = write_sample();
        let mut reader = PackageReader::open(Cursor::new(bytes)).unwrap();

        let manifest = reader.relationship(MANIFEST_RELATIONSHIP_TYPE).unwrap();
        assert_eq!(manifest.target, "/Sample.nuspec");
        assert!(manifest.id.starts_with('R'));
        assert_eq!(reader.relationships().len(), 2);

        assert_eq!(reader.core_properties(), Some(&properties()));
        assert_eq!(reader.read_part(r"lib\net45\Sample.dll").unwrap(), b"binary");

        let content_types =
            String::from_utf8(reader.read_part(CONTENT_TYPES_PART).unwrap()).unwrap();
        assert!(content_types.contains(r#"Extension="dll""#));
        assert!(content_types.contains(r#"PartName="/LICENSE""#));

        let names = reader.part_names();
        assert!(names.iter().any(|n| n.starts_with(CORE_PROPERTIES_DIRECTORY)));
        let content: Vec<_> = names.iter().filter(|n| !is_layout_part(n)).collect();
        assert_eq!(content.len(), 3);
    }

    #[test]
    fn test_output_is_deterministic() {
        assert_eq!(write_sample(), write_sample());
    }

    #[test]
    fn test_duplicate_parts_are_rejected() {
        let mut writer = PackageWriter::new(Cursor::new(Vec::new()));
        writer.add_part("a.txt", &mut &b"1"[..]).unwrap();
        assert!(matches!(
            writer.add_part("A.TXT", &mut &b"2"[..]),
            Err(ArchiveError::DuplicatePart(_))
        ));
        assert!(matches!(
            writer.add_part(r"_rels\.rels", &mut &b"2"[..]),
            Err(ArchiveError::DuplicatePart(_))
        ));
    }

    #[test]
    fn test_missing_part() {
        let mut reader = PackageReader::open(Cursor::new(write_sample())).unwrap();
        assert!(matches!(
            reader.read_part("nope.txt"),
            Err(ArchiveError::MissingPart(_))
        ));
    }
}
