use super::registry::{ModelRegistry, ModelSpec};
use crate::options::Mode;

/// The model a request will go out with, plus why it differs from the one
/// the user asked for (if it does).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Blank, unknown and mode-incompatible names all resolve to the first
    /// model serving `mode`; only a mode nobody serves is an error.
    pub fn select(&self, requested: Option<&str>, mode: Mode) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        if let Some(model) = requested.and_then(|name| self.registry.ensure(name, mode)) {
            return Ok(ModelSelection {
                model,
                requested: requested.map(str::to_string),
                fallback_reason: None,
            });
        }

        let Some(model) = self.registry.by_mode(mode).into_iter().next() else {
            return Err(format!("No model handles {mode} requests."));
        };
        let reason = match requested {
            None => format!("No model chosen; using {}.", model.name),
            Some(name) if self.registry.get(name).is_some() => {
                format!("{name} cannot be used for {mode}; using {}.", model.name)
            }
            Some(name) => format!("Unknown model '{name}'; using {}.", model.name),
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(reason),
        })
    }
}
