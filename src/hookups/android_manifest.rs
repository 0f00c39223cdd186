//! AndroidManifest hookups
//!
//! Adds `<uses-permission>` entries, permission definitions, `<service>`
//! and `<activity>` components, and raw manifest- or application-scoped
//! XML. Every entry is a discrete marked block. Equivalence against
//! manually-authored entries is decided by key attributes (`android:name`
//! by default): a same-key entry outside any marker is a manual override
//! and the managed twin is not added.

use std::path::Path;

use crate::marker::{
    ensure_block, is_within_marked_span, marked_spans, marker_ident, BlockMarker, InsertAnchor,
    MarkerLanguage,
};

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// A `<uses-permission>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPermission {
    pub name: String,
    pub max_sdk_version: Option<u32>,
}

impl ManifestPermission {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            max_sdk_version: None,
        }
    }
}

/// A `<permission>` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDefinition {
    pub name: String,
    pub protection_level: Option<String>,
}

/// A `<service>` or `<activity>` component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestComponent {
    pub name: String,
    /// Extra attributes beyond `android:name`, in declaration order.
    pub attributes: Vec<(String, String)>,
    /// Child elements, pre-rendered (intent filters and the like).
    pub children: Option<String>,
}

impl ManifestComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: None,
        }
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    pub fn children(mut self, xml: &str) -> Self {
        self.children = Some(xml.to_string());
        self
    }

    fn render(&self, element: &str) -> String {
        let mut attrs = format!(" android:name=\"{}\"", self.name);
        for (key, value) in &self.attributes {
            attrs.push_str(&format!(" {}=\"{}\"", key, value));
        }
        match &self.children {
            Some(children) => format!("<{element}{attrs}>\n{children}\n</{element}>"),
            None => format!("<{element}{attrs} />"),
        }
    }
}

/// A raw XML block with a caller-chosen identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawXmlBlock {
    pub identifier: String,
    pub xml: String,
}

/// Declarative manifest patch.
#[derive(Debug, Clone, Default)]
pub struct ManifestHookup {
    pub permissions: Vec<ManifestPermission>,
    pub permission_definitions: Vec<PermissionDefinition>,
    pub services: Vec<ManifestComponent>,
    pub activities: Vec<ManifestComponent>,
    pub manifest_blocks: Vec<RawXmlBlock>,
    pub application_blocks: Vec<RawXmlBlock>,
    /// Attributes that decide equivalence with manual entries.
    pub key_attributes: Vec<String>,
}

impl ManifestHookup {
    pub fn permission(mut self, name: &str) -> Self {
        self.permissions.push(ManifestPermission::new(name));
        self
    }

    pub fn service(mut self, component: ManifestComponent) -> Self {
        self.services.push(component);
        self
    }

    pub fn activity(mut self, component: ManifestComponent) -> Self {
        self.activities.push(component);
        self
    }

    pub fn key_attribute(mut self, attribute: &str) -> Self {
        self.key_attributes.push(attribute.to_string());
        self
    }

    fn effective_key_attributes(&self) -> Vec<String> {
        if self.key_attributes.is_empty() {
            vec!["android:name".to_string()]
        } else {
            self.key_attributes.clone()
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.permissions.is_empty()
            && self.permission_definitions.is_empty()
            && self.services.is_empty()
            && self.activities.is_empty()
            && self.manifest_blocks.is_empty()
            && self.application_blocks.is_empty()
        {
            return Err("manifest hookup declares nothing to add".to_string());
        }
        for p in &self.permissions {
            if p.name.is_empty() {
                return Err("uses-permission entry with empty name".to_string());
            }
        }
        for c in self.services.iter().chain(&self.activities) {
            if c.name.is_empty() {
                return Err("manifest component with empty android:name".to_string());
            }
        }
        for b in self.manifest_blocks.iter().chain(&self.application_blocks) {
            if b.identifier.is_empty() || b.xml.is_empty() {
                return Err("raw manifest block needs identifier and xml".to_string());
            }
        }
        Ok(())
    }
}

/// Whether an entry with the same key attribute value exists outside every
/// marked block.
fn manual_twin_present(content: &str, key_attributes: &[String], value: &str) -> bool {
    let spans = marked_spans(content);
    for attr in key_attributes {
        let needle = format!("{}=\"{}\"", attr, value);
        let mut from = 0;
        while let Some(rel) = content[from..].find(&needle) {
            let pos = from + rel;
            if !is_within_marked_span(&spans, pos) {
                return true;
            }
            from = pos + needle.len();
        }
    }
    false
}

enum Scope {
    Manifest,
    Application,
}

struct Entry {
    identifier: String,
    xml: String,
    scope: Scope,
    /// Key attribute value for manual-override detection; raw blocks have
    /// none and are governed by their marker only.
    key_value: Option<String>,
}

pub(super) fn apply(path: &Path, spec: &ManifestHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::AndroidManifest;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    if !original.contains("</manifest>") {
        return HookupResult::error(path, kind, "target has no closing </manifest> element");
    }

    let mut entries = Vec::new();
    for p in &spec.permissions {
        let xml = match p.max_sdk_version {
            Some(max) => format!(
                "<uses-permission android:name=\"{}\" android:maxSdkVersion=\"{}\" />",
                p.name, max
            ),
            None => format!("<uses-permission android:name=\"{}\" />", p.name),
        };
        entries.push(Entry {
            identifier: format!("PERM_{}", marker_ident(&p.name)),
            xml,
            scope: Scope::Manifest,
            key_value: Some(p.name.clone()),
        });
    }
    for d in &spec.permission_definitions {
        let xml = match &d.protection_level {
            Some(level) => format!(
                "<permission android:name=\"{}\" android:protectionLevel=\"{}\" />",
                d.name, level
            ),
            None => format!("<permission android:name=\"{}\" />", d.name),
        };
        entries.push(Entry {
            identifier: format!("PERMDEF_{}", marker_ident(&d.name)),
            xml,
            scope: Scope::Manifest,
            key_value: Some(d.name.clone()),
        });
    }
    for s in &spec.services {
        entries.push(Entry {
            identifier: format!("SERVICE_{}", marker_ident(&s.name)),
            xml: s.render("service"),
            scope: Scope::Application,
            key_value: Some(s.name.clone()),
        });
    }
    for a in &spec.activities {
        entries.push(Entry {
            identifier: format!("ACTIVITY_{}", marker_ident(&a.name)),
            xml: a.render("activity"),
            scope: Scope::Application,
            key_value: Some(a.name.clone()),
        });
    }
    for b in &spec.manifest_blocks {
        entries.push(Entry {
            identifier: format!("RAW_{}", marker_ident(&b.identifier)),
            xml: b.xml.clone(),
            scope: Scope::Manifest,
            key_value: None,
        });
    }
    for b in &spec.application_blocks {
        entries.push(Entry {
            identifier: format!("RAW_{}", marker_ident(&b.identifier)),
            xml: b.xml.clone(),
            scope: Scope::Application,
            key_value: None,
        });
    }

    let needs_application = entries.iter().any(|e| matches!(e.scope, Scope::Application));
    if needs_application && !original.contains("</application>") {
        return HookupResult::error(path, kind, "target has no closing </application> element");
    }

    let key_attributes = spec.effective_key_attributes();
    let mut content = original.clone();
    let mut added = Vec::new();
    let mut manual = Vec::new();

    for entry in &entries {
        if let Some(value) = &entry.key_value {
            if manual_twin_present(&content, &key_attributes, value) {
                manual.push(value.clone());
                continue;
            }
        }
        let marker = BlockMarker::new("XML", &entry.identifier, MarkerLanguage::Xml);
        let anchor = match entry.scope {
            Scope::Manifest => InsertAnchor::Before("</manifest>".to_string()),
            Scope::Application => InsertAnchor::Before("</application>".to_string()),
        };
        let edit = ensure_block(&content, &marker, &entry.xml, &anchor);
        if edit.modified {
            added.push(entry.identifier.clone());
        }
        content = edit.content;
        ctx.record_block(path, "XML", &entry.identifier);
    }

    if content == original {
        return HookupResult::skipped(
            path,
            kind,
            format!("added=[]; manual overrides: [{}]", manual.join(", ")),
        );
    }

    if let Err(result) = write_target(path, kind, &content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(
        path,
        kind,
        format!(
            "added=[{}]; manual overrides: [{}]",
            added.join(", "),
            manual.join(", ")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android">
    <application android:label="o19">
        <activity android:name=".MainActivity" />
    </application>
</manifest>
"#;

    fn apply_to(content: &str, spec: &ManifestHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AndroidManifest.xml");
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_permission_block_inserted_before_manifest_close() {
        let spec = ManifestHookup::default().permission("android.permission.FOREGROUND_SERVICE");
        let (after, result) = apply_to(MANIFEST, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains(
            "<!-- SPIRE-LOOM:XML:PERM_ANDROID_PERMISSION_FOREGROUND_SERVICE -->"
        ));
        assert!(after.contains(
            "<uses-permission android:name=\"android.permission.FOREGROUND_SERVICE\" />"
        ));
        let block_pos = after.find("SPIRE-LOOM:XML:PERM").unwrap();
        let close_pos = after.find("</manifest>").unwrap();
        assert!(block_pos < close_pos);
    }

    #[test]
    fn test_manual_twin_suppresses_managed_entry() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
    <uses-permission android:name="android.permission.CAMERA"/>
</manifest>
"#;
        let spec = ManifestHookup::default().permission("android.permission.CAMERA");
        let (after, result) = apply_to(manifest, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert!(result.message.unwrap().contains("added=[]"));
        assert!(!after.contains("SPIRE-LOOM"));
        assert_eq!(after, manifest);
    }

    #[test]
    fn test_service_goes_into_application_scope() {
        let spec = ManifestHookup::default().service(
            ManifestComponent::new(".LoomForegroundService")
                .attribute("android:exported", "false")
                .attribute("android:foregroundServiceType", "dataSync"),
        );
        let (after, result) = apply_to(MANIFEST, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        let service_pos = after.find("LoomForegroundService").unwrap();
        let app_close = after.find("</application>").unwrap();
        assert!(service_pos < app_close);
        assert!(after.contains("android:exported=\"false\""));
    }

    #[test]
    fn test_reapplication_is_byte_identical() {
        let spec = ManifestHookup::default()
            .permission("android.permission.INTERNET")
            .service(ManifestComponent::new(".SyncService"));
        let (first, _) = apply_to(MANIFEST, &spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AndroidManifest.xml");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, &spec, &mut ctx);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_managed_twin_updates_but_never_duplicates() {
        let spec = ManifestHookup::default().permission("android.permission.INTERNET");
        let (first, _) = apply_to(MANIFEST, &spec);
        // The managed entry exists inside its marker, so re-application
        // resolves to the same block rather than a manual override.
        assert_eq!(first.matches("android.permission.INTERNET").count(), 1);
    }

    #[test]
    fn test_missing_application_element_is_error() {
        let manifest = "<manifest>\n</manifest>\n";
        let spec = ManifestHookup::default().service(ManifestComponent::new(".S"));
        let (_, result) = apply_to(manifest, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Error);
    }

    #[test]
    fn test_validation() {
        assert!(ManifestHookup::default().validate().is_err());
        assert!(ManifestHookup::default().permission("x").validate().is_ok());
    }
}
