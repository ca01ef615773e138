pub mod agent;
pub mod cli;
pub mod config;
pub mod dex;
pub mod error;
pub mod memory;
pub mod rpc;
pub mod scanner;
pub mod workflow;

pub use agent::DexAgent;
pub use config::{Config, ScanConfig};
pub use error::{DumperError, Result};
pub use rpc::run_rpc_server;
pub use scanner::{Candidate, DexScanner};
pub use workflow::{
    resolve_target, run_dump_workflow, run_file_workflow, run_scan_workflow, Target,
};
