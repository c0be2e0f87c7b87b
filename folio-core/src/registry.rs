use std::path::Path;

use tracing::debug;

use crate::error::{DocumentError, Result};
use crate::generator::Generator;

pub type GeneratorFactory = Box<dyn Fn() -> Box<dyn Generator> + Send + Sync>;

struct Registration {
    mime_types: Vec<String>,
    factory: GeneratorFactory,
}

/// Resolves a mime type to a fresh generator instance.
#[derive(Default)]
pub struct GeneratorRegistry {
    registrations: Vec<Registration>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, mime_types: &[&str], factory: F)
    where
        F: Fn() -> Box<dyn Generator> + Send + Sync + 'static,
    {
        self.registrations.push(Registration {
            mime_types: mime_types.iter().map(|m| m.to_ascii_lowercase()).collect(),
            factory: Box::new(factory),
        });
    }

    pub fn supported_mime_types(&self) -> Vec<&str> {
        self.registrations
            .iter()
            .flat_map(|r| r.mime_types.iter().map(String::as_str))
            .collect()
    }

    pub fn resolve(&self, mime_type: &str) -> Result<Box<dyn Generator>> {
        let wanted = mime_type.to_ascii_lowercase();
        self.registrations
            .iter()
            .find(|r| r.mime_types.iter().any(|m| *m == wanted))
            .map(|r| (r.factory)())
            .ok_or(DocumentError::UnsupportedFormat(mime_type.to_owned()))
    }

    /// Guesses the mime type from the file extension and resolves it.
    pub fn resolve_path(&self, path: &Path) -> Result<(String, Box<dyn Generator>)> {
        for guess in mime_guess::from_path(path).iter() {
            let mime = guess.essence_str().to_owned();
            if let Ok(generator) = self.resolve(&mime) {
                debug!(%mime, path = %path.display(), "resolved generator");
                return Ok((mime, generator));
            }
        }
        Err(DocumentError::UnsupportedFormat(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGenerator;
    use std::path::PathBuf;

    #[test]
    fn resolves_registered_mime_types_case_insensitively() {
        let mut registry = GeneratorRegistry::new();
        registry.register(&["text/plain"], || Box::new(FakeGenerator::new(3)));

        assert!(registry.resolve("Text/Plain").is_ok());
        assert!(matches!(
            registry.resolve("application/pdf"),
            Err(DocumentError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn resolves_by_extension() {
        let mut registry = GeneratorRegistry::new();
        registry.register(&["text/plain"], || Box::new(FakeGenerator::new(3)));

        let (mime, generator) = registry.resolve_path(&PathBuf::from("notes.txt")).unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(generator.name(), "fake");
        assert!(registry.resolve_path(&PathBuf::from("scan.djvu")).is_err());
    }
}
