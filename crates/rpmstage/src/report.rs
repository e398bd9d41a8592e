use std::sync::Mutex;

/// Decisions taken while turning a staged tree into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    IgnoredDir {
        path: String,
    },
    IgnoredFile {
        path: String,
    },
    DirAttribute {
        path: String,
        attribute: Option<String>,
    },
    FileAttribute {
        path: String,
        attribute: String,
    },
    OmittedFile {
        path: String,
    },
    MalformedOverride {
        path: String,
        reason: String,
    },
    SkippedEntry {
        path: String,
        reason: String,
    },
    SkippedScriptlet {
        name: String,
        reason: String,
    },
    MissingScriptletFile {
        name: String,
        path: String,
    },
}

pub trait Reporter: Send + Sync {
    fn emit(&self, ev: Event);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn emit(&self, ev: Event) {
        match ev {
            Event::IgnoredDir { path } => tracing::debug!("Ignoring {path}"),
            Event::IgnoredFile { path } => tracing::debug!("Ignoring {path}"),
            Event::DirAttribute { path, attribute } => {
                tracing::debug!(
                    "attr for dir {path} will be {}",
                    attribute.as_deref().unwrap_or("<none>")
                )
            }
            Event::FileAttribute { path, attribute } => {
                tracing::debug!("attr for {path} will be {attribute}")
            }
            Event::OmittedFile { path } => {
                tracing::debug!("no attribute for {path}, leaving it out of %files")
            }
            Event::MalformedOverride { path, reason } => {
                tracing::warn!("Attribute definition for {path} malformed, skipping! ({reason})")
            }
            Event::SkippedEntry { path, reason } => tracing::warn!("skipping {path}: {reason}"),
            Event::SkippedScriptlet { name, reason } => {
                tracing::warn!("skipping script '{name}': {reason}")
            }
            Event::MissingScriptletFile { name, path } => {
                tracing::warn!("script file {path} for '{name}' does not exist, skipping")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, ev: Event) {
        if let Ok(mut g) = self.events.lock() {
            g.push(ev);
        }
    }
}
