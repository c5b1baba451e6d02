pub mod auth;
pub mod details;
pub mod todos;
pub mod trash;
