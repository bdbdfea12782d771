// Module layout (Clean Architecture style)
// - bootstrap: configuration and startup
// - infrastructure: DB adapters
// - presentation: HTTP/WS handlers and routing
// - application: cross-cutting policies and domain services
// - domain: core models
// - client: the provider that bridges a local CRDT replica to the hub

pub mod application;
pub mod bootstrap;
pub mod client;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
