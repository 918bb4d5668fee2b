pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod views;

#[cfg(test)]
pub(crate) mod test_helpers;
