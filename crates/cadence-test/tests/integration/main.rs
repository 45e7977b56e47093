//! Integration tests: the workers, scheduler and admin surface against the in-memory store.

mod admin_api;
mod cleanup;
mod helpers;
mod pipeline;
mod rrule_parity;
mod scheduler;
