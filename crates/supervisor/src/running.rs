use cache::CloneCache;
use hack_core::ids::JobId;

/// One entry per job currently spawned (`starting` or `running`),
/// keyed globally by `jobId` so `cancelJob` can find it without
/// knowing which project owns it.
#[derive(Debug, Clone, Copy)]
pub struct RunningJob {
  pub pid: u32,
}

pub type RunningJobs = CloneCache<JobId, RunningJob>;
