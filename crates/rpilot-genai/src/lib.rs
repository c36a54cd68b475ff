//! Capability ports and HTTP clients for generation providers.
//!
//! This crate provides:
//! - Port traits the pipeline engine depends on (script, voice, video,
//!   thumbnail, notification, credential refresh)
//! - reqwest-based implementations for the production providers
//!
//! The engine receives these as injected trait objects and never sees
//! provider internals.

pub mod credentials;
pub mod error;
pub mod notify;
pub mod ports;
pub mod script;
pub mod thumbnail;
pub mod video;
pub mod voice;

pub use credentials::OAuthRefresher;
pub use error::{GenAiError, GenAiResult};
pub use notify::WebhookNotifier;
pub use ports::{
    CredentialRefresher, Notifier, ScriptGenerator, ThumbnailSynthesizer, VideoSynthesizer,
    VoiceSynthesizer,
};
pub use script::GeminiScriptGenerator;
pub use thumbnail::HttpThumbnailSynthesizer;
pub use video::HttpVideoSynthesizer;
pub use voice::HttpVoiceSynthesizer;
