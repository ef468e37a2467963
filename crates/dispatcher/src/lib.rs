//! Dataflow dispatcher
//!
//! The orchestration core: artifact staging, launch configuration,
//! schedule registration and the job lifecycle service, plus the cron
//! trigger loop used by the binary's `serve` mode.

pub mod cron_utils;
pub mod launch_config;
pub mod lifecycle;
pub mod registrar;
pub mod stager;
pub mod trigger;

pub use launch_config::{control_plane_endpoint, LaunchConfigBuilder, StepListSpecGenerator};
pub use lifecycle::{
    CancelReport, CancelSettings, JobLifecycleService, LifecycleSettings,
    OrchestratorRepositories, RunOutcome,
};
pub use registrar::ScheduleRegistrar;
pub use stager::{ArtifactSet, ArtifactStager, TempDirAllocator};
pub use trigger::ScheduleTrigger;
