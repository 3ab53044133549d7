#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod cycle;
mod interval;
mod metrics;


pub use self::{
    args::Args,
    cycle::{Outcome, Scheduler},
    interval::Interval,
    metrics::CycleMetrics,
};
