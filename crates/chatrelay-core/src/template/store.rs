//! Template persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::message::Message;

use super::Template;
use super::format::render_messages;

const TEMPLATE_EXTENSION: &str = "txt";

/// Storage for named templates.
pub trait TemplateStore: Send + Sync {
    /// Names of every persisted template, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Load a template by exact name.
    fn load(&self, name: &str) -> Result<Template>;

    /// Persist `messages` under `name`, overwriting any previous version.
    fn save(&self, name: &str, messages: &[Message]) -> Result<Template>;

    /// Case-insensitive lookup; returns the stored spelling of the name.
    fn find(&self, name: &str) -> Result<Option<String>> {
        let wanted = name.trim();
        Ok(self
            .list()?
            .into_iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(wanted)))
    }
}

/// Check a template name and return it trimmed.
///
/// Names become file stems, so they must be non-empty and must not contain
/// path separators or parent references.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.contains(['/', '\\'])
        || trimmed.contains("..")
        || trimmed.starts_with('.')
    {
        return Err(RelayError::InvalidTemplateName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Templates stored as `<dir>/<name>.txt`.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{TEMPLATE_EXTENSION}"))
    }
}

impl TemplateStore for FileTemplateStore {
    fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(TEMPLATE_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Template> {
        let name = validate_name(name)?;
        let path = self.path_for(&name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RelayError::TemplateNotFound(name));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Loaded template");
        Ok(Template::parse(name, &text))
    }

    fn save(&self, name: &str, messages: &[Message]) -> Result<Template> {
        let name = validate_name(name)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&name);
        fs::write(&path, render_messages(messages))?;
        debug!(path = %path.display(), "Saved template");
        Ok(Template::new(name, messages.to_vec()))
    }
}

/// Templates kept in memory in their text form.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<BTreeMap<String, String>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template from its text form.
    pub fn with_template(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.write().insert(name.into(), text.into());
        self
    }

    /// Raw text of a stored template.
    pub fn text(&self, name: &str) -> Option<String> {
        self.templates.read().get(name).cloned()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.templates.read().keys().cloned().collect())
    }

    fn load(&self, name: &str) -> Result<Template> {
        let name = validate_name(name)?;
        let templates = self.templates.read();
        let text = templates
            .get(&name)
            .ok_or_else(|| RelayError::TemplateNotFound(name.clone()))?;
        Ok(Template::parse(name.clone(), text))
    }

    fn save(&self, name: &str, messages: &[Message]) -> Result<Template> {
        let name = validate_name(name)?;
        self.templates
            .write()
            .insert(name.clone(), render_messages(messages));
        Ok(Template::new(name, messages.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", "  ", "../etc/passwd", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(validate_name(bad), Err(RelayError::InvalidTemplateName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(validate_name(" pirate ").unwrap(), "pirate");
    }

    #[test]
    fn file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileTemplateStore::new(temp.path().join("prompts"));
        assert!(store.list().unwrap().is_empty());

        let messages = vec![Message::system("be brief"), Message::user("hi")];
        store.save("brief", &messages).unwrap();

        let on_disk = fs::read_to_string(temp.path().join("prompts/brief.txt")).unwrap();
        assert_eq!(on_disk, "system: be brief\nuser: hi");

        let loaded = store.load("brief").unwrap();
        assert_eq!(loaded.name, "brief");
        assert_eq!(loaded.messages, messages);
        assert_eq!(store.list().unwrap(), vec!["brief"]);
    }

    #[test]
    fn file_store_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("default.txt"), "You are helpful.").unwrap();
        fs::write(temp.path().join("notes.md"), "# notes").unwrap();
        fs::create_dir(temp.path().join("nested.txt")).unwrap();

        let store = FileTemplateStore::new(temp.path());
        assert_eq!(store.list().unwrap(), vec!["default"]);
    }

    #[test]
    fn missing_template_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = FileTemplateStore::new(temp.path());
        assert!(matches!(
            store.load("nope"),
            Err(RelayError::TemplateNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn find_is_case_insensitive() {
        let store = InMemoryTemplateStore::new()
            .with_template("Pirate", "Talk like a pirate.")
            .with_template("default", "You are helpful.");

        assert_eq!(store.find("pirate").unwrap().as_deref(), Some("Pirate"));
        assert_eq!(store.find(" DEFAULT ").unwrap().as_deref(), Some("default"));
        assert_eq!(store.find("ninja").unwrap(), None);
    }

    #[test]
    fn in_memory_store_keeps_text_form() {
        let store = InMemoryTemplateStore::new();
        store
            .save("duo", &[Message::system("a\nb"), Message::user("c")])
            .unwrap();
        assert_eq!(store.text("duo").unwrap(), "system: a\nb\n\nuser: c");
        assert_eq!(store.load("duo").unwrap().behavior_length(), 2);
    }
}
