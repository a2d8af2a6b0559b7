pub mod config;
pub mod dryrun;
pub mod error;
pub mod filters;
pub mod gemini;
pub mod provider;
pub mod raster;
pub mod session;

pub use config::GeminiConfig;
pub use dryrun::DryrunClient;
pub use error::{ErrorKind, SessionError, SessionOperation};
pub use filters::{FilterEditor, FilterEngine, FilterKind, FilterParams};
pub use gemini::GeminiClient;
pub use provider::{
    client_for_provider, client_for_provider_with_lookup, EditResponse, GenerateRequest,
    RemoteEditClient,
};
pub use session::{Session, SessionSlot, SessionState, DEFAULT_ASPECT_RATIO};
