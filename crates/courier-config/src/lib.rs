mod model;

pub use model::{AppConfig, AzureCredential, ModelCatalog, ProviderCredentials};
