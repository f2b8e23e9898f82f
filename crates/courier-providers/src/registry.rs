use std::sync::Arc;

use courier_config::{ModelCatalog, ProviderCredentials};
use tracing::info;

use crate::backend::ChatBackend;
use crate::{AnthropicBackend, AzureOpenAiBackend, GeminiBackend, GroqBackend, OpenAiBackend};

/// The fixed, ordered set of backend families. Order is irrelevant for
/// correctness (model names are disjoint across families) but deterministic
/// resolution keeps behavior testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Gemini,
    Groq,
}

impl ProviderFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "openai",
            ProviderFamily::AzureOpenAi => "azure-openai",
            ProviderFamily::Anthropic => "anthropic",
            ProviderFamily::Gemini => "gemini",
            ProviderFamily::Groq => "groq",
        }
    }
}

struct FamilySlot {
    family: ProviderFamily,
    models: Vec<String>,
    /// None when the family's credential is absent; such a family is never
    /// selected even if the active model names one of its models.
    backend: Option<Arc<dyn ChatBackend>>,
}

/// Resolves the active model name to the adapter that serves it.
pub struct BackendRegistry {
    slots: Vec<FamilySlot>,
}

impl BackendRegistry {
    /// Construct adapters for every family whose credential is present.
    pub fn from_config(credentials: &ProviderCredentials, models: &ModelCatalog) -> Self {
        let slots = vec![
            FamilySlot {
                family: ProviderFamily::OpenAi,
                models: models.openai.clone(),
                backend: credentials.openai.clone().map(|key| {
                    Arc::new(OpenAiBackend::new(key)) as Arc<dyn ChatBackend>
                }),
            },
            FamilySlot {
                family: ProviderFamily::AzureOpenAi,
                models: models.azure.clone(),
                backend: credentials.azure.clone().map(|cred| {
                    Arc::new(AzureOpenAiBackend::new(cred.api_key, cred.endpoint))
                        as Arc<dyn ChatBackend>
                }),
            },
            FamilySlot {
                family: ProviderFamily::Anthropic,
                models: models.anthropic.clone(),
                backend: credentials.anthropic.clone().map(|key| {
                    Arc::new(AnthropicBackend::new(key)) as Arc<dyn ChatBackend>
                }),
            },
            FamilySlot {
                family: ProviderFamily::Gemini,
                models: models.gemini.clone(),
                backend: credentials.gemini.clone().map(|key| {
                    Arc::new(GeminiBackend::new(key)) as Arc<dyn ChatBackend>
                }),
            },
            FamilySlot {
                family: ProviderFamily::Groq,
                models: models.groq.clone(),
                backend: credentials.groq.clone().map(|key| {
                    Arc::new(GroqBackend::new(key)) as Arc<dyn ChatBackend>
                }),
            },
        ];

        let configured: Vec<&str> = slots
            .iter()
            .filter(|s| s.backend.is_some())
            .map(|s| s.family.name())
            .collect();
        info!("configured backend families: {configured:?}");

        Self { slots }
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn from_slots(
        entries: Vec<(ProviderFamily, Vec<String>, Option<Arc<dyn ChatBackend>>)>,
    ) -> Self {
        Self {
            slots: entries
                .into_iter()
                .map(|(family, models, backend)| FamilySlot {
                    family,
                    models,
                    backend,
                })
                .collect(),
        }
    }

    /// Resolve a model name to the adapter of the first family that both
    /// lists the model and holds a credential. `None` means no backend is
    /// configured for this model and the turn must not attempt delivery.
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn ChatBackend>> {
        self.slots
            .iter()
            .find(|slot| slot.models.iter().any(|m| m == model))
            .and_then(|slot| slot.backend.clone())
    }

    /// Whether a model is switchable: named by a family that is configured.
    pub fn knows_model(&self, model: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.backend.is_some() && slot.models.iter().any(|m| m == model))
    }

    /// Models of configured families, in family order, for help output.
    pub fn available_models(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| slot.backend.is_some())
            .flat_map(|slot| slot.models.iter().cloned())
            .collect()
    }

    pub fn has_any_backend(&self) -> bool {
        self.slots.iter().any(|slot| slot.backend.is_some())
    }
}
