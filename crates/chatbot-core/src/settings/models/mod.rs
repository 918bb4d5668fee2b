pub mod general_model;

pub use general_model::GeneralSettingsModel;
