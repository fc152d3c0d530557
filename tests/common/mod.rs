#![allow(dead_code)]

pub use depflow_test_utils::builders::props;
pub use depflow_test_utils::harness::Harness;
pub use depflow_test_utils::init_tracing;
pub use depflow_test_utils::recorder::Recorder;

use depflow::engine::Scheduler;
use depflow::resource::Resource;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Register one resource per name.
pub fn resources(scheduler: &Scheduler, names: &[&str]) -> Vec<Resource> {
    names
        .iter()
        .map(|n| scheduler.resources().register(n))
        .collect()
}
