//! Turning recurrence rules into materialized instances, and instances into resolved views.

pub mod instances;
pub mod materialize;
pub mod occurrence;
pub mod resolver;
pub mod rule;
