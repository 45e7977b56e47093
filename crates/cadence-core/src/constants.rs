/// Route component constants shared across crates
pub const API_ROUTE_COMPONENT: &str = "api";
pub const API_ROUTE_PREFIX: &str = const_str::concat!("/", API_ROUTE_COMPONENT);

pub const ADMIN_ROUTE_COMPONENT: &str = "admin";
pub const ADMIN_ROUTE_PREFIX: &str =
    const_str::concat!(API_ROUTE_PREFIX, "/", ADMIN_ROUTE_COMPONENT);

pub const ORGANIZATIONS_ROUTE_COMPONENT: &str = "organizations";

/// Default cron schedules (5-field, UTC)
pub const DEFAULT_MATERIALIZATION_SCHEDULE: &str = "0 * * * *";
pub const DEFAULT_CLEANUP_SCHEDULE: &str = "0 2 * * *";
pub const DEFAULT_METRICS_SCHEDULE: &str = "*/5 * * * *";
pub const DEFAULT_METRICS_WINDOW_MINUTES: u32 = 5;

/// Environment variables that predate the `CADENCE__` naming scheme.
pub const MATERIALIZATION_SCHEDULE_ENV: &str = "EVENT_GENERATION_CRON_SCHEDULE";
pub const CLEANUP_SCHEDULE_ENV: &str = "CLEANUP_CRON_SCHEDULE";
pub const METRICS_ENABLED_ENV: &str = "API_METRICS_AGGREGATION_ENABLED";
pub const METRICS_SCHEDULE_ENV: &str = "API_METRICS_AGGREGATION_CRON_SCHEDULE";
pub const METRICS_WINDOW_MINUTES_ENV: &str = "API_METRICS_AGGREGATION_WINDOW_MINUTES";

/// Generation window defaults applied when an organization is first initialized
pub const DEFAULT_HOT_WINDOW_MONTHS: i32 = 12;
pub const DEFAULT_HISTORY_RETENTION_MONTHS: i32 = 3;
pub const DEFAULT_PROCESSING_PRIORITY: i32 = 5;
pub const DEFAULT_MAX_INSTANCES_PER_RUN: i32 = 1000;

pub const MIN_PROCESSING_PRIORITY: i32 = 1;
pub const MAX_PROCESSING_PRIORITY: i32 = 10;

/// Materialization worker defaults
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 10;
pub const DEFAULT_MAX_ORGANIZATIONS: usize = 50;

/// Occurrence expansion caps
pub const MAX_ITERATIONS_UNBOUNDED: usize = 10_000;
pub const MAX_ITERATIONS_BOUNDED: usize = 1_000;

/// Template pagination size used by job discovery
pub const TEMPLATE_PAGE_SIZE: i64 = 500;

pub const UNNAMED_EVENT: &str = "Unnamed Event";
pub const INSTANCE_VERSION: &str = "1";
