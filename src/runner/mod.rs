mod controller;
mod loop_worker;

pub use controller::RunnerController;
pub use loop_worker::{run_pass, sampling_loop, PassReport, RunnerSettings, RunnerState, RunnerSummary};
