//! Wire types and query building for the drive-style REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use fieldsync_core::{defaults, DriveQuery, ObjectMeta, RemoteObject};

/// Fields requested on every object listing.
pub const OBJECT_FIELDS: &str = "id,name,mimeType,size,modifiedTime,appProperties";

/// One object resource as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub app_properties: HashMap<String, String>,
}

impl From<FileResource> for RemoteObject {
    fn from(resource: FileResource) -> Self {
        RemoteObject {
            id: resource.id,
            name: resource.name,
            media_type: resource.mime_type,
            size: resource.size,
            modified_at: resource.modified_time,
            tags: resource.app_properties,
        }
    }
}

/// Listing response envelope.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<FileResource>,
}

/// Object metadata sent on create and update requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub app_properties: BTreeMap<String, String>,
}

impl From<&ObjectMeta> for FileMetadata {
    fn from(meta: &ObjectMeta) -> Self {
        Self {
            name: meta.name.clone(),
            mime_type: meta.media_type.clone(),
            parents: meta.parent.iter().cloned().collect(),
            app_properties: meta.tags.clone(),
        }
    }
}

/// Tag patch body for metadata updates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPatch<'a> {
    pub app_properties: &'a BTreeMap<String, String>,
}

/// Escape a term for embedding in a query string (`\` and `'`).
pub fn escape_term(term: &str) -> String {
    term.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Render a [`DriveQuery`] into the API's `q` filter expression.
///
/// Trashed objects are always excluded.
pub fn build_query(query: &DriveQuery) -> String {
    let mut clauses = vec!["trashed=false".to_string()];

    if let Some(name) = &query.name {
        clauses.push(format!("name='{}'", escape_term(name)));
    }
    if let Some(fragment) = &query.name_contains {
        clauses.push(format!("name contains '{}'", escape_term(fragment)));
    }
    if let Some(parent) = &query.parent {
        clauses.push(format!("'{}' in parents", escape_term(parent)));
    }
    if let Some((key, value)) = &query.tag {
        clauses.push(format!(
            "appProperties has {{ key='{}' and value='{}' }}",
            escape_term(key),
            escape_term(value)
        ));
    }
    if query.folders_only {
        clauses.push(format!("mimeType='{}'", defaults::FOLDER_MEDIA_TYPE));
    } else if let Some(media_type) = &query.media_type {
        clauses.push(format!("mimeType='{}'", escape_term(media_type)));
    }

    clauses.join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_term() {
        assert_eq!(escape_term("plain"), "plain");
        assert_eq!(escape_term("O'Brien"), "O\\'Brien");
        assert_eq!(escape_term("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_build_query_name() {
        let q = DriveQuery::by_name("FieldSync").folders();
        assert_eq!(
            build_query(&q),
            "trashed=false and name='FieldSync' and mimeType='application/x-directory'"
        );
    }

    #[test]
    fn test_build_query_tag_and_parent() {
        let q = DriveQuery::by_tag("contentHash", "abc123").in_parent("folder-1");
        assert_eq!(
            build_query(&q),
            "trashed=false and 'folder-1' in parents and \
             appProperties has { key='contentHash' and value='abc123' }"
        );
    }

    #[test]
    fn test_build_query_escapes_quotes() {
        let q = DriveQuery::by_name("it's.pdf");
        assert!(build_query(&q).contains("name='it\\'s.pdf'"));
    }

    #[test]
    fn test_file_list_parses_missing_fields() {
        let list: FileList = serde_json::from_str(
            r#"{"files":[{"id":"f1","name":"doc.pdf","mimeType":"application/pdf"}]}"#,
        )
        .unwrap();
        assert_eq!(list.files.len(), 1);
        let obj: RemoteObject = list.files[0].clone().into();
        assert_eq!(obj.id, "f1");
        assert!(obj.tags.is_empty());
        assert!(obj.size.is_none());
    }

    #[test]
    fn test_file_list_parses_tags_and_size() {
        let list: FileList = serde_json::from_str(
            r#"{"files":[{"id":"f1","name":"n","mimeType":"application/pdf",
                "size":1024,"appProperties":{"contentHash":"abc"}}]}"#,
        )
        .unwrap();
        let obj: RemoteObject = list.files[0].clone().into();
        assert_eq!(obj.size, Some(1024));
        assert_eq!(obj.tag("contentHash"), Some("abc"));
    }

    #[test]
    fn test_file_metadata_from_object_meta() {
        let meta = fieldsync_core::ObjectMeta::new("doc.pdf", "application/pdf")
            .in_parent("root-1")
            .tagged("contentHash", "abc");
        let wire = FileMetadata::from(&meta);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["name"], "doc.pdf");
        assert_eq!(json["mimeType"], "application/pdf");
        assert_eq!(json["parents"][0], "root-1");
        assert_eq!(json["appProperties"]["contentHash"], "abc");
    }

    #[test]
    fn test_file_metadata_omits_empty_collections() {
        let meta = fieldsync_core::ObjectMeta::new("doc.pdf", "application/pdf");
        let json = serde_json::to_value(FileMetadata::from(&meta)).unwrap();
        assert!(json.get("parents").is_none());
        assert!(json.get("appProperties").is_none());
    }
}
