pub mod base;
pub mod system_metric;
// statistic preparation slots, statistic slots
pub mod stat;
// statistic slots
pub mod log;
// statistic slots, rule check slots
pub mod circuitbreaker;
pub mod config;
pub mod context;
pub mod flow;
// rule check slots, statistic slots
pub mod hotspot;
// rule check slots
pub mod authority;
pub mod system;
