//! Layered settings
//!
//! Settings resolve through an ordered stack of layers:
//! 1. Global defaults (built-ins, config files, engine setters)
//! 2. Source overlays selected for the template's name
//! 3. The template's own header
//! 4. The render session

mod codec;
mod defaults;
mod descriptor;
mod effective;
mod global;
mod layer;
mod merge;
mod resolve;

pub use codec::{format_duration, format_value, parse_duration, parse_value};
pub use defaults::GlobalDefaults;
pub use descriptor::{
    snake_to_camel, CaseConvention, MergePolicy, SettingDescriptor, SettingKey, ValueType,
};
pub use effective::{
    load_toml_file, parse_toml_str, ConfigError, ConfigSource, EffectiveSettings,
    EffectiveValue, LoadedConfig,
};
pub use global::GlobalSettings;
pub use layer::{SettingValue, SettingsLayer};
pub use merge::{custom_union, list_union, map_union, merge_layers, merge_pair};
pub use resolve::{CustomSnapshot, LayerKind, LayerStack, Resolved};
