// Services module - business logic layer

pub mod images;
pub mod import;
pub mod settings;

// Metadata providers
pub mod kinopoisk;
