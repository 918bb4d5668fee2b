pub mod general_settings_json_repository;
pub mod general_settings_repository;

pub use general_settings_json_repository::GeneralSettingsJsonRepository;
pub use general_settings_repository::GeneralSettingsRepository;
