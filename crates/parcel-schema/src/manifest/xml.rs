//! Manifest document encoding and decoding.
//!
//! Decoding builds a small element tree first and then maps it onto the
//! manifest records, so structural checks (unknown elements, missing
//! `metadata`) see the whole document. Encoding writes elements in the fixed
//! order the schema declares.

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use super::schema::{MAX_SCHEMA_VERSION, SchemaTable, compute_minimum_schema_version};
use super::{
    Manifest, ManifestDependency, ManifestDependencyGroup, ManifestError, ManifestFile,
    ManifestFrameworkAssembly, ManifestMetadata, ManifestReference,
};

const SCHEMA_VERSION_ATTRIBUTE: &str = "schemaVersion";

#[derive(Debug, Default)]
struct Element {
    name: String,
    prefix: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn namespace(&self) -> Option<&str> {
        match &self.prefix {
            Some(prefix) => self.attribute(&format!("xmlns:{prefix}")),
            None => self.attribute("xmlns"),
        }
    }
}

fn xml_error(err: impl Display) -> ManifestError {
    ManifestError::Xml(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String, ManifestError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(xml_error)
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, ManifestError> {
    let name = utf8(start.local_name().as_ref())?;
    let prefix = start
        .name()
        .prefix()
        .map(|p| utf8(p.as_ref()))
        .transpose()?;

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        prefix,
        attributes,
        ..Element::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ManifestError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(ManifestError::Xml(
                "document has more than one root element".to_string(),
            ));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn parse_tree(text: &str) -> Result<Element, ManifestError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ManifestError::Xml("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&utf8(&data.into_inner())?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ManifestError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ManifestError::Xml("document has no root element".to_string()))
}

/// Context carried through decoding for structure errors.
struct Decoder<'a> {
    package_id: Option<&'a str>,
    schema_version: u32,
}

impl Decoder<'_> {
    fn structure(&self, message: impl Into<String>) -> ManifestError {
        ManifestError::Structure {
            message: message.into(),
            package_id: self.package_id.map(str::to_string),
            schema_version: self.schema_version,
        }
    }

    fn unknown(&self, element: &Element, parent: &str) -> ManifestError {
        self.structure(format!(
            "the element '{}' is not allowed in '{parent}'",
            element.name
        ))
    }

    fn expect_children<'e>(
        &self,
        element: &'e Element,
        child: &str,
    ) -> Result<Vec<&'e Element>, ManifestError> {
        element
            .children
            .iter()
            .map(|c| {
                if c.name == child {
                    Ok(c)
                } else {
                    Err(self.unknown(c, &element.name))
                }
            })
            .collect()
    }

    fn metadata(&self, element: &Element) -> Result<ManifestMetadata, ManifestError> {
        let mut metadata = ManifestMetadata::default();
        for child in &element.children {
            let text = || child.text.clone();
            match child.name.as_str() {
                "id" => metadata.id = text(),
                "version" => metadata.version = text(),
                "title" => metadata.title = Some(text()),
                "authors" => metadata.authors = text(),
                "owners" => metadata.owners = Some(text()),
                "licenseUrl" => metadata.license_url = Some(text()),
                "projectUrl" => metadata.project_url = Some(text()),
                "iconUrl" => metadata.icon_url = Some(text()),
                "requireLicenseAcceptance" => {
                    metadata.require_license_acceptance = self.boolean(child)?;
                }
                "description" => metadata.description = text(),
                "summary" => metadata.summary = Some(text()),
                "releaseNotes" => metadata.release_notes = Some(text()),
                "copyright" => metadata.copyright = Some(text()),
                "language" => metadata.language = Some(text()),
                "tags" => metadata.tags = Some(text()),
                "dependencies" => self.dependencies(child, &mut metadata)?,
                "frameworkAssemblies" => {
                    for assembly in self.expect_children(child, "frameworkAssembly")? {
                        metadata.framework_assemblies.push(ManifestFrameworkAssembly {
                            assembly_name: assembly
                                .attribute("assemblyName")
                                .unwrap_or_default()
                                .to_string(),
                            target_framework: assembly
                                .attribute("targetFramework")
                                .map(str::to_string),
                        });
                    }
                }
                "references" => {
                    for reference in self.expect_children(child, "reference")? {
                        metadata.references.push(ManifestReference {
                            file: reference.attribute("file").unwrap_or_default().to_string(),
                        });
                    }
                }
                _ => return Err(self.unknown(child, "metadata")),
            }
        }
        Ok(metadata)
    }

    fn boolean(&self, element: &Element) -> Result<bool, ManifestError> {
        let value = element.text.trim();
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.is_empty() || value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(self.structure(format!(
                "'{value}' is not a valid value for '{}'",
                element.name
            )))
        }
    }

    fn dependencies(
        &self,
        element: &Element,
        metadata: &mut ManifestMetadata,
    ) -> Result<(), ManifestError> {
        for child in &element.children {
            match child.name.as_str() {
                "dependency" => metadata.dependencies.push(dependency(child)),
                "group" => {
                    let dependencies = self
                        .expect_children(child, "dependency")?
                        .into_iter()
                        .map(dependency)
                        .collect();
                    metadata.dependency_groups.push(ManifestDependencyGroup {
                        target_framework: child
                            .attribute("targetFramework")
                            .filter(|fx| !fx.trim().is_empty())
                            .map(str::to_string),
                        dependencies,
                    });
                }
                _ => return Err(self.unknown(child, "dependencies")),
            }
        }
        Ok(())
    }

    fn files(&self, element: &Element) -> Result<Vec<ManifestFile>, ManifestError> {
        Ok(self
            .expect_children(element, "file")?
            .into_iter()
            .map(|file| ManifestFile {
                source: file.attribute("src").unwrap_or_default().to_string(),
                target: file.attribute("target").map(str::to_string),
                exclude: file.attribute("exclude").map(str::to_string),
            })
            .collect())
    }
}

fn dependency(element: &Element) -> ManifestDependency {
    ManifestDependency {
        id: element.attribute("id").unwrap_or_default().to_string(),
        version: element
            .attribute("version")
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string),
        exclude: element.attribute("exclude").map(str::to_string),
    }
}

fn declared_schema_version(
    metadata: &Element,
    namespace_tier: u32,
) -> Result<u32, ManifestError> {
    let Some(value) = metadata.attribute(SCHEMA_VERSION_ATTRIBUTE) else {
        return Ok(namespace_tier);
    };
    let decoder = Decoder {
        package_id: metadata.child("id").map(|id| id.text.trim()),
        schema_version: namespace_tier,
    };
    let version: u32 = value.trim().parse().map_err(|_| {
        decoder.structure(format!("'{value}' is not a valid schema version"))
    })?;
    if version > MAX_SCHEMA_VERSION {
        return Err(decoder.structure(format!(
            "schema version {version} is newer than the supported version {MAX_SCHEMA_VERSION}"
        )));
    }
    Ok(version)
}

/// Decode a manifest document without normalizing or validating it.
pub(super) fn decode(text: &str, table: &SchemaTable) -> Result<Manifest, ManifestError> {
    let root = parse_tree(text)?;

    let namespace_tier = match root.namespace() {
        Some(namespace) => table.tier_for(namespace).unwrap_or_else(|| {
            warn!(namespace, "unknown manifest namespace, reading as the active schema");
            table.active_version()
        }),
        None => {
            debug!("manifest has no namespace, reading as the active schema");
            table.active_version()
        }
    };

    let mut decoder = Decoder {
        package_id: None,
        schema_version: namespace_tier,
    };
    if root.name != "package" {
        return Err(decoder.structure(format!(
            "the root element must be 'package', found '{}'",
            root.name
        )));
    }

    let mut metadata_element = None;
    let mut files_element = None;
    for child in &root.children {
        let slot = match child.name.as_str() {
            "metadata" => &mut metadata_element,
            "files" => &mut files_element,
            _ => return Err(decoder.unknown(child, "package")),
        };
        if slot.replace(child).is_some() {
            return Err(decoder.structure(format!(
                "the element '{}' appears more than once",
                child.name
            )));
        }
    }
    let metadata_element =
        metadata_element.ok_or_else(|| decoder.structure("the 'metadata' element is missing"))?;

    decoder.package_id = metadata_element
        .child("id")
        .map(|id| id.text.trim())
        .filter(|id| !id.is_empty());
    decoder.schema_version = declared_schema_version(metadata_element, namespace_tier)?;

    let metadata = decoder.metadata(metadata_element)?;
    let files = files_element.map(|f| decoder.files(f)).transpose()?;
    Ok(Manifest { metadata, files })
}

fn write<'a>(
    writer: &mut Writer<Vec<u8>>,
    event: impl Into<Event<'a>>,
) -> Result<(), ManifestError> {
    writer.write_event(event).map_err(xml_error)
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), ManifestError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn optional_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: Option<&String>,
) -> Result<(), ManifestError> {
    match value {
        Some(value) => text_element(writer, name, value),
        None => Ok(()),
    }
}

fn dependency_element(
    writer: &mut Writer<Vec<u8>>,
    dependency: &ManifestDependency,
) -> Result<(), ManifestError> {
    let mut element = BytesStart::new("dependency");
    element.push_attribute(("id", dependency.id.as_str()));
    if let Some(version) = &dependency.version {
        element.push_attribute(("version", version.as_str()));
    }
    if let Some(exclude) = &dependency.exclude {
        element.push_attribute(("exclude", exclude.as_str()));
    }
    write(writer, Event::Empty(element))
}

fn write_dependencies(
    writer: &mut Writer<Vec<u8>>,
    metadata: &ManifestMetadata,
) -> Result<(), ManifestError> {
    if metadata.dependencies.is_empty() && metadata.dependency_groups.is_empty() {
        return Ok(());
    }
    write(writer, Event::Start(BytesStart::new("dependencies")))?;
    for dependency in &metadata.dependencies {
        dependency_element(writer, dependency)?;
    }
    for group in &metadata.dependency_groups {
        let mut element = BytesStart::new("group");
        if let Some(framework) = &group.target_framework {
            element.push_attribute(("targetFramework", framework.as_str()));
        }
        if group.dependencies.is_empty() {
            write(writer, Event::Empty(element))?;
            continue;
        }
        write(writer, Event::Start(element))?;
        for dependency in &group.dependencies {
            dependency_element(writer, dependency)?;
        }
        write(writer, Event::End(BytesEnd::new("group")))?;
    }
    write(writer, Event::End(BytesEnd::new("dependencies")))
}

fn write_metadata(
    writer: &mut Writer<Vec<u8>>,
    metadata: &ManifestMetadata,
) -> Result<(), ManifestError> {
    let mut start = BytesStart::new("metadata");
    let schema_version = compute_minimum_schema_version(metadata).to_string();
    if !metadata.framework_assemblies.is_empty() {
        start.push_attribute((SCHEMA_VERSION_ATTRIBUTE, schema_version.as_str()));
    }
    write(writer, Event::Start(start))?;

    text_element(writer, "id", &metadata.id)?;
    text_element(writer, "version", &metadata.version)?;
    optional_element(writer, "title", metadata.title.as_ref())?;
    text_element(writer, "authors", &metadata.authors)?;
    optional_element(writer, "owners", metadata.owners.as_ref())?;
    optional_element(writer, "licenseUrl", metadata.license_url.as_ref())?;
    optional_element(writer, "projectUrl", metadata.project_url.as_ref())?;
    optional_element(writer, "iconUrl", metadata.icon_url.as_ref())?;
    text_element(
        writer,
        "requireLicenseAcceptance",
        if metadata.require_license_acceptance {
            "true"
        } else {
            "false"
        },
    )?;
    text_element(writer, "description", &metadata.description)?;
    optional_element(writer, "summary", metadata.summary.as_ref())?;
    optional_element(writer, "releaseNotes", metadata.release_notes.as_ref())?;
    optional_element(writer, "copyright", metadata.copyright.as_ref())?;
    optional_element(writer, "language", metadata.language.as_ref())?;
    optional_element(writer, "tags", metadata.tags.as_ref())?;
    write_dependencies(writer, metadata)?;

    if !metadata.framework_assemblies.is_empty() {
        write(writer, Event::Start(BytesStart::new("frameworkAssemblies")))?;
        for assembly in &metadata.framework_assemblies {
            let mut element = BytesStart::new("frameworkAssembly");
            element.push_attribute(("assemblyName", assembly.assembly_name.as_str()));
            if let Some(framework) = &assembly.target_framework {
                element.push_attribute(("targetFramework", framework.as_str()));
            }
            write(writer, Event::Empty(element))?;
        }
        write(writer, Event::End(BytesEnd::new("frameworkAssemblies")))?;
    }

    if !metadata.references.is_empty() {
        write(writer, Event::Start(BytesStart::new("references")))?;
        for reference in &metadata.references {
            let mut element = BytesStart::new("reference");
            element.push_attribute(("file", reference.file.as_str()));
            write(writer, Event::Empty(element))?;
        }
        write(writer, Event::End(BytesEnd::new("references")))?;
    }

    write(writer, Event::End(BytesEnd::new("metadata")))
}

fn write_files(writer: &mut Writer<Vec<u8>>, files: &[ManifestFile]) -> Result<(), ManifestError> {
    if files.is_empty() {
        return write(writer, Event::Empty(BytesStart::new("files")));
    }
    write(writer, Event::Start(BytesStart::new("files")))?;
    for file in files {
        let mut element = BytesStart::new("file");
        element.push_attribute(("src", file.source.as_str()));
        if let Some(target) = &file.target {
            element.push_attribute(("target", target.as_str()));
        }
        if let Some(exclude) = &file.exclude {
            element.push_attribute(("exclude", exclude.as_str()));
        }
        write(writer, Event::Empty(element))?;
    }
    write(writer, Event::End(BytesEnd::new("files")))
}

/// Encode a manifest under the active namespace.
pub(super) fn encode(manifest: &Manifest, table: &SchemaTable) -> Result<String, ManifestError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;

    let mut package = BytesStart::new("package");
    package.push_attribute(("xmlns", table.active_namespace()));
    write(&mut writer, Event::Start(package))?;
    write_metadata(&mut writer, &manifest.metadata)?;
    if let Some(files) = &manifest.files {
        write_files(&mut writer, files)?;
    }
    write(&mut writer, Event::End(BytesEnd::new("package")))?;

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}
