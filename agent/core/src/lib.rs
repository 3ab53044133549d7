#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod activity;
pub mod cluster;
pub mod compliance;
pub mod document;
mod report;
pub mod resource;

pub use self::{
    activity::Activity,
    cluster::ClusterInfo,
    compliance::{ComplianceFinding, ComplianceRecord, Severity, Status},
    document::{DocType, Document, Envelope},
    report::{Recorder, Report},
    resource::ResourceDocument,
};
