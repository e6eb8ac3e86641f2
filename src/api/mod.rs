//! HTTP API for reading and replacing user zones, and for dynamic DNS updates.
//!
//! Every endpoint except `/healthcheck` and `/update` identifies the caller by the
//! [`Config::remote_user_header`][crate::config::Config::remote_user_header] header, which the
//! authenticating reverse proxy in front of Zone Crab is expected to set. Requests without it
//! get HTTP 401 (Unauthorized).
//!
//! Errors are returned as a JSON body of the form `{"error": "..."}`.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/zone_file` (GET)
//!
//!   Returns the caller's zone file as text. A user without a zone gets a fresh one generated
//!   from the template.
//!
//! ## `/zone_file` (PUT)
//!
//!   Replaces the caller's zone file with the request body. Returns HTTP 204 (No Content) once
//!   the zone is checked, committed and loaded by `named`. Returns HTTP 400 (Bad Request) with
//!   the checker's diagnostic if the zone is malformed, or if `named` failed to load it and the
//!   previous zone was restored.
//!
//! ## `/reset_zone` (POST)
//!
//!   Regenerates the caller's zone from the template, discarding all records. Returns
//!   HTTP 204 (No Content).
//!
//! ## `/token` (GET), `/token/reset` (POST)
//!
//!   Return the caller's dynamic update token, issuing or replacing it respectively:
//!
//!   ```json
//!   { "token": "3f2a-09bc-77de-1a40" }
//!   ```
//!
//! ## `/update` (GET)
//!
//!   Dynamic DNS update, authenticated by token instead of the proxy header:
//!
//!   ```bash
//!   ❯ curl 'http://localhost:3000/update?token=3f2a-09bc-77de-1a40&hostname=home&ip=203.0.113.5'
//!   {"hostname":"home.alice.example.com.","ip":"203.0.113.5"}
//!   ```
//!
//!   `ip` is optional and defaults to the client's address, which must then be IPv4.
//!   `hostname` is relative to the token owner's zone, `@` for the zone apex, or fully
//!   qualified within it. Returns HTTP 403 (Forbidden) for unknown tokens, and HTTP 422
//!   (Unprocessable Entity) when the record can't be updated.

mod api_error;
mod model;
mod remote_user;
mod routes;
pub mod server;

pub use server::new;
