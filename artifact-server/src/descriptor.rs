//! Project descriptors (`.pom`): generation from a coordinate and the parsing
//! needed to check that a supplied one describes the artifact it is uploaded
//! with.
//!
//! Both directions go through the serde model below on `quick-xml`, so
//! entities, CDATA sections and comments are handled by the XML reader.

use crate::coordinate::Coordinate;
use crate::error::{AppError, AppResult};
use crate::validation::MAX_DESCRIPTOR_SIZE;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const POM_NAMESPACE: &str = "http://maven.apache.org/POM/4.0.0";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const POM_SCHEMA: &str = "http://maven.apache.org/xsd/maven-4.0.0.xsd";

/// The `<project>` element. Sections this server never reads
/// (`dependencies`, `build`, ...) are skipped by the deserializer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "project", rename_all = "camelCase")]
pub struct Pom {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,
    #[serde(rename = "@xmlns:xsi", default, skip_serializing_if = "Option::is_none")]
    pub xmlns_xsi: Option<String>,
    #[serde(
        rename = "@xsi:schemaLocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PomParent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomParent {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Identity fields read from a descriptor. `group` and `version` fall back to
/// the `<parent>` section as Maven inherits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorInfo {
    pub group: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub packaging: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn root_is_project(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return element.local_name().as_ref() == b"project";
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

pub fn parse(bytes: &[u8]) -> AppResult<DescriptorInfo> {
    if bytes.len() > MAX_DESCRIPTOR_SIZE {
        return Err(AppError::InvalidDescriptor(format!(
            "descriptor is {} bytes, limit is {MAX_DESCRIPTOR_SIZE}",
            bytes.len()
        )));
    }
    let xml = std::str::from_utf8(bytes)
        .map_err(|_| AppError::InvalidDescriptor("descriptor is not UTF-8".to_string()))?;
    if !root_is_project(xml) {
        return Err(AppError::InvalidDescriptor(
            "missing <project> element".to_string(),
        ));
    }

    let pom: Pom = quick_xml::de::from_str(xml)
        .map_err(|e| AppError::InvalidDescriptor(format!("malformed descriptor: {e}")))?;
    let parent = pom.parent.unwrap_or_default();

    let artifact_id = clean(pom.artifact_id)
        .ok_or_else(|| AppError::InvalidDescriptor("missing <artifactId>".to_string()))?;

    Ok(DescriptorInfo {
        group: clean(pom.group_id).or_else(|| clean(parent.group_id)),
        artifact_id,
        version: clean(pom.version).or_else(|| clean(parent.version)),
        packaging: clean(pom.packaging),
        name: clean(pom.name),
        description: clean(pom.description),
        url: clean(pom.url),
    })
}

/// Parse `bytes` and check it describes `coordinate`.
///
/// The version may be the exact version or its base (`1.0-SNAPSHOT` for a
/// timestamped build). Values still containing `${...}` are not compared.
pub fn validate(bytes: &[u8], coordinate: &Coordinate) -> AppResult<DescriptorInfo> {
    let info = parse(bytes)?;

    let mismatch = |field: &str, found: &str, expected: &str| {
        AppError::InvalidDescriptor(format!(
            "{field} '{found}' does not match coordinate {field} '{expected}'"
        ))
    };
    let is_property = |value: &str| value.contains("${");

    if info.artifact_id != coordinate.artifact_id && !is_property(&info.artifact_id) {
        return Err(mismatch("artifactId", &info.artifact_id, &coordinate.artifact_id));
    }

    match &info.group {
        Some(group) if group != &coordinate.group && !is_property(group) => {
            return Err(mismatch("groupId", group, &coordinate.group));
        }
        Some(_) => {}
        None => {
            return Err(AppError::InvalidDescriptor(
                "missing <groupId>".to_string(),
            ))
        }
    }

    match &info.version {
        Some(version)
            if version != &coordinate.version
                && *version != coordinate.base_version()
                && !is_property(version) =>
        {
            return Err(mismatch("version", version, &coordinate.version));
        }
        Some(_) => {}
        None => {
            return Err(AppError::InvalidDescriptor(
                "missing <version>".to_string(),
            ))
        }
    }

    Ok(info)
}

/// Minimal descriptor for an artifact uploaded without one.
pub fn generate(coordinate: &Coordinate) -> AppResult<String> {
    let pom = Pom {
        xmlns: Some(POM_NAMESPACE.to_string()),
        xmlns_xsi: Some(XSI_NAMESPACE.to_string()),
        schema_location: Some(format!("{POM_NAMESPACE} {POM_SCHEMA}")),
        model_version: Some("4.0.0".to_string()),
        group_id: Some(coordinate.group.clone()),
        artifact_id: Some(coordinate.artifact_id.clone()),
        version: Some(coordinate.base_version()),
        packaging: Some(coordinate.extension.clone()),
        description: Some("Generated descriptor".to_string()),
        ..Pom::default()
    };
    write_document(&pom)
}

/// Serialize `document` as an indented XML file with a declaration. The root
/// element takes the document type's serde name.
pub(crate) fn write_document<T: Serialize>(document: &T) -> AppResult<String> {
    let mut xml = String::from(XML_DECLARATION);
    let mut serializer = quick_xml::se::Serializer::new(&mut xml);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| AppError::InternalError(format!("Failed to write XML document: {e}")))?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(raw: &str) -> Coordinate {
        Coordinate::parse(raw).unwrap()
    }

    #[test]
    fn test_generated_descriptor_validates() {
        let c = coord("org.example:lib:1.0.0");
        let pom = generate(&c).unwrap();
        assert!(pom.starts_with("<?xml"));
        assert!(pom.contains("<artifactId>lib</artifactId>"));
        assert!(pom.contains("<packaging>jar</packaging>"));
        assert!(pom.contains(r#"xmlns="http://maven.apache.org/POM/4.0.0""#));

        let info = validate(pom.as_bytes(), &c).unwrap();
        assert_eq!(info.group.as_deref(), Some("org.example"));
        assert_eq!(info.version.as_deref(), Some("1.0.0"));
        assert_eq!(info.description.as_deref(), Some("Generated descriptor"));
    }

    #[test]
    fn test_timestamped_build_uses_base_version() {
        let c = coord("org.example:lib:1.0-20240101.120000-1");
        let pom = generate(&c).unwrap();
        assert!(pom.contains("<version>1.0-SNAPSHOT</version>"));
        assert!(validate(pom.as_bytes(), &c).is_ok());
    }

    #[test]
    fn test_parent_and_dependencies_are_not_confused() {
        let pom = r#"<?xml version="1.0"?>
<project>
  <!-- <artifactId>commented</artifactId> -->
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>1.0.0</version>
  </parent>
  <artifactId>lib</artifactId>
  <dependencies>
    <dependency>
      <groupId>other</groupId>
      <artifactId>dep</artifactId>
      <version>9.9</version>
    </dependency>
  </dependencies>
</project>"#;
        let info = parse(pom.as_bytes()).unwrap();
        assert_eq!(info.artifact_id, "lib");
        assert_eq!(info.group.as_deref(), Some("org.example"));
        assert_eq!(info.version.as_deref(), Some("1.0.0"));
        assert!(validate(pom.as_bytes(), &coord("org.example:lib:1.0.0")).is_ok());
    }

    #[test]
    fn test_character_references_cdata_and_spaced_end_tags() {
        let c = coord("org.example:lib:1.0.0");
        for group in [
            "<groupId>org&#46;example</groupId>",
            "<groupId><![CDATA[org.example]]></groupId>",
            "<groupId>org.example</groupId >",
            "<groupId>\n    org.example\n  </groupId>",
        ] {
            let pom = format!(
                "<project>\n  {group}\n  <artifactId>lib</artifactId>\n  <version>1.0.0</version>\n</project>"
            );
            let info = validate(pom.as_bytes(), &c).unwrap_or_else(|e| panic!("{group}: {e}"));
            assert_eq!(info.group.as_deref(), Some("org.example"), "{group}");
        }
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let pom = generate(&coord("org.example:lib:1.0.0")).unwrap();
        for other in ["org.other:lib:1.0.0", "org.example:core:1.0.0", "org.example:lib:2.0"] {
            assert!(
                matches!(
                    validate(pom.as_bytes(), &coord(other)),
                    Err(AppError::InvalidDescriptor(_))
                ),
                "{other}"
            );
        }
    }

    #[test]
    fn test_property_values_are_not_compared() {
        let pom = r#"<project>
  <groupId>${project.parent.groupId}</groupId>
  <artifactId>lib</artifactId>
  <version>${revision}</version>
</project>"#;
        assert!(validate(pom.as_bytes(), &coord("org.example:lib:3.1")).is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse(b"not xml").is_err());
        assert!(parse(&[0xff, 0xfe]).is_err());
        assert!(parse(b"<project></project>").is_err());
        assert!(parse(b"<metadata><artifactId>lib</artifactId></metadata>").is_err());
        assert!(parse(b"<project><artifactId>lib</groupId></project>").is_err());
    }
}
