use core::time::Duration;
use stickypool::{Engine, Error, JobDescription, Result};

/// Reply produced by every successful simulated job.
pub const SIMULATED_OUTPUT: &str = "We did a lot of things, slowly";

/// Stand-in for a loaded model.
///
/// Construction pays a one-off load cost; each job then holds its worker for
/// a fixed amount of time before answering. Swap this type out for a real
/// engine to serve actual work.
#[derive(Debug)]
pub struct SimulatedEngine {
    device: String,
    work: Duration,
    jobs: u64,
}

impl SimulatedEngine {
    /// Loads an engine onto `device`.
    ///
    /// # Errors
    ///
    /// Fails when `device` is empty.
    pub fn load(device: String, load: Duration, work: Duration) -> Result<Self> {
        if device.is_empty() {
            return Err(Error::Engine {
                reason: "no device given".to_string(),
            });
        }

        tracing::info!("Loading engine on {device}");
        std::thread::sleep(load);

        Ok(Self {
            device,
            work,
            jobs: 0,
        })
    }

    /// Device for the engine in `slot`: indexed devices get one index per
    /// slot, `cpu` is shared.
    pub fn device_for(device: &str, slot: usize) -> String {
        if device == "cpu" || device.contains(':') {
            device.to_string()
        } else {
            format!("{device}:{slot}")
        }
    }
}

impl Engine for SimulatedEngine {
    fn run(&mut self, _job: &JobDescription) -> Result<serde_json::Value> {
        std::thread::sleep(self.work);
        self.jobs += 1;

        tracing::debug!(
            "Engine on {} finished job #{} of its lifetime",
            self.device,
            self.jobs
        );

        Ok(SIMULATED_OUTPUT.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_devices_get_one_index_per_slot() {
        assert_eq!(SimulatedEngine::device_for("cpu", 3), "cpu");
        assert_eq!(SimulatedEngine::device_for("cuda", 3), "cuda:3");
        assert_eq!(SimulatedEngine::device_for("cuda:1", 3), "cuda:1");
    }

    #[test]
    fn answers_after_its_work_duration() {
        let mut engine =
            SimulatedEngine::load("cpu".to_string(), Duration::ZERO, Duration::from_millis(20))
                .unwrap();

        let started = std::time::Instant::now();
        let output = engine.run(&JobDescription::new()).unwrap();

        assert_eq!(output, SIMULATED_OUTPUT);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn empty_device_fails_to_load() {
        let err = SimulatedEngine::load(String::new(), Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }
}
