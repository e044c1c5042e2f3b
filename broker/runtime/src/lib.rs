#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use iam_broker_aws as aws;
pub use iam_broker_core as core;
pub use iam_broker_k8s as k8s;

mod admission;
mod args;
mod exchange;
mod metrics;
mod service;

pub use self::args::Args;
