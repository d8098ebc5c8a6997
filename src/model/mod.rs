//! Records the orchestration core reads and writes.

pub mod artifact;
pub mod definition;
pub mod result;
pub mod run;

pub use self::artifact::{Media, NewMedia, NewReport, Report, ReportFormat, ReportType};
pub use self::definition::{
    Device, Environment, NewDevice, NewEnvironment, NewTestConfiguration, TestConfiguration,
};
pub use self::result::{ResultSummary, TestResult};
pub use self::run::{NewTestRun, RunStatus, TestRun, Transition};
