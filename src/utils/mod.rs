// src/utils/mod.rs

pub mod device;
pub mod hash;
pub mod html;
pub mod jwt;
