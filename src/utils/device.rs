// src/utils/device.rs

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use crate::{error::AppError, state::AppState, store::DeviceStorage};

pub const DEVICE_HEADER: &str = "x-device-id";
pub const DEFAULT_DEVICE: &str = "default";

const MAX_DEVICE_ID_LEN: usize = 128;

/// Device namespace named by the `X-Device-Id` header.
pub fn device_id(headers: &HeaderMap) -> String {
    headers
        .get(DEVICE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_DEVICE_ID_LEN)
        .unwrap_or(DEFAULT_DEVICE)
        .to_string()
}

pub fn device_storage(state: &AppState, headers: &HeaderMap) -> DeviceStorage {
    DeviceStorage::new(state.local.clone(), device_id(headers))
}

impl FromRequestParts<AppState> for DeviceStorage {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(device_storage(state, &parts.headers))
    }
}
