// src/services/mod.rs

pub mod admin;
pub mod auth;
pub mod bank;
pub mod exam;
pub mod results;
