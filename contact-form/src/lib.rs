pub mod config;
pub mod error;
pub mod form;
pub mod handler;
pub mod mailer;
pub mod registry;
pub mod render;
pub mod request;
pub mod secrets;
pub mod security;
pub mod service;
pub mod transport;
pub mod validator;
