/// Fan-out of lobby state to member sockets and the public feed.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Live/persisted state reconciliation and session resumption.
pub mod reconcile;
/// Command facade: validation, authority, registry mutation, mirroring.
pub mod session_service;
/// Public lobby-feed SSE plumbing.
pub mod sse_service;
/// Storage connection supervision and degraded-mode tracking.
pub mod storage_supervisor;
/// WebSocket connection and command handling.
pub mod websocket_service;
