//! muse-core: shared note/tag types, wire envelopes and configuration.

pub mod config;
pub mod models;
pub mod wire;

// Config re-exports
pub use config::{
    Config,
    ConfigError,
    LoggingSettings,
    RemoteSettings,
    Secrets,
    ServerSettings,
    Settings,
    SettingsError,
    StorageSettings,
    SyncSettings,
};

// Model re-exports
pub use models::{
    Note,
    NoteDraft,
    RawNote,
    TAG_NAME_MAX_LEN,
    Tag,
    ValidationError,
    normalize_note,
    now_millis,
    parse_tag_names,
};

// Wire re-exports
pub use wire::{
    DeleteRequest,
    ErrorResponse,
    MessageResponse,
    NoteAction,
    SyncCursor,
    SyncResponse,
};
