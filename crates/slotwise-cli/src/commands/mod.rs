pub mod availability;
pub mod confirm;
pub mod config;
pub mod propose;
pub mod schedule;
pub mod suggest;
pub mod unschedule;
