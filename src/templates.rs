use std::path::{Path, PathBuf};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn signature() -> String {
    format!("--\nmailsocial {}\nreply with \"$ help\" for commands", VERSION)
}

/// Body of the one-time welcome message, read from disk on every use so an
/// edited template takes effect on the next cycle.
#[derive(Debug, Clone)]
pub struct WelcomeTemplate {
    path: PathBuf,
}

impl WelcomeTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WelcomeTemplate { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self, host: &str) -> std::io::Result<String> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(raw
            .replace("{{version}}", VERSION)
            .replace("{{host}}", host)
            .replace("{{signature}}", &signature()))
    }
}
