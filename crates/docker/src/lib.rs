//! Docker-event tailing, the debounced runtime snapshot cache, and the
//! registry/runtime joins served by `GET /v1/projects` and
//! `GET /v1/ps` (`SPEC_FULL.md` §4.5-4.6).

pub mod cache;
pub mod client;
pub mod compose;
pub mod events;
pub mod payload;

pub use cache::RuntimeCache;
pub use client::DockerClient;
pub use events::EventWatcher;
pub use payload::{ProjectsFilter, get_projects_payload, get_ps_payload};
