pub mod rules;
pub mod services;
