// =============================================================================
// API Module
// =============================================================================
//
// JSON REST endpoints plus the WebSocket push feed, both thin adapters over
// AppState.

pub mod rest;
pub mod ws;
