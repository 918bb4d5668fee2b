use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chat::services::{Device, GenerationConfig};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettingsModel {
    /// List saved sessions when the application starts.
    pub open_sidebar_when_launched: bool,
    pub model_id: String,
    pub device: Device,
    pub max_new_tokens: u32,
    pub engine_url: String,
    /// Where session records live. Defaults to `<config_dir>/chatbots/chats`.
    pub chats_dir: Option<PathBuf>,
}

impl Default for GeneralSettingsModel {
    fn default() -> Self {
        Self {
            open_sidebar_when_launched: true,
            model_id: "gemma3:4b".to_string(),
            device: Device::Gpu,
            max_new_tokens: GenerationConfig::default().max_new_tokens,
            engine_url: "http://127.0.0.1:11434".to_string(),
            chats_dir: None,
        }
    }
}

impl GeneralSettingsModel {
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: GeneralSettingsModel =
            serde_json::from_str(r#"{ "model_id": "llama3:8b", "device": "cpu" }"#).unwrap();

        assert_eq!(settings.model_id, "llama3:8b");
        assert_eq!(settings.device, Device::Cpu);
        assert_eq!(settings.max_new_tokens, 256);
        assert!(settings.open_sidebar_when_launched);
        assert!(settings.chats_dir.is_none());
    }

    #[test]
    fn test_generation_config() {
        let settings = GeneralSettingsModel {
            max_new_tokens: 64,
            ..Default::default()
        };
        assert_eq!(settings.generation_config().max_new_tokens, 64);
    }
}
