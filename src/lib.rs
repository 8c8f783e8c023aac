pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod routes;
pub mod security;
pub mod services;
