use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use stickypool::PoolConfig;

/// Runtime configuration for the `stickypool-server` binary.
///
/// These settings control how many engines are loaded, how they are built,
/// how much work may queue up, and where the server listens. All values are
/// parsed from CLI arguments or environment variables (a `.env` file is read
/// first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stickypool-server",
    version,
    about = "An HTTP job server backed by a fixed pool of sticky engines"
)]
pub struct CliArgs {
    /// Number of worker threads, and of engines loaded at startup.
    ///
    /// Each worker is permanently paired with one engine, so this is also the
    /// number of jobs that can run at the same time.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Maximum number of jobs allowed to wait for a free worker.
    ///
    /// Jobs beyond this are answered immediately with `503`. Leave unset for
    /// an unbounded queue.
    ///
    /// Environment variable: `MAX_QUEUE_DEPTH`
    #[arg(long, env = "MAX_QUEUE_DEPTH")]
    pub max_queue_depth: Option<usize>,

    /// Time each simulated engine spends on a job, in milliseconds.
    ///
    /// Environment variable: `WORK_MILLIS`
    #[arg(long, env = "WORK_MILLIS", default_value_t = 3000)]
    pub work_millis: u64,

    /// Time each simulated engine takes to load at startup, in milliseconds.
    ///
    /// Environment variable: `LOAD_MILLIS`
    #[arg(long, env = "LOAD_MILLIS", default_value_t = 0)]
    pub load_millis: u64,

    /// Device the engines are placed on, e.g. `cpu` or `cuda`.
    ///
    /// Indexed devices get one index per engine (`cuda` becomes `cuda:0`,
    /// `cuda:1`, ...); `cpu` is shared.
    ///
    /// Environment variable: `DEVICE`
    #[arg(long, env = "DEVICE", default_value_t = String::from("cpu"))]
    pub device: String,

    /// Name stamped onto every incoming job.
    ///
    /// Environment variable: `TASK_NAME`
    #[arg(long, env = "TASK_NAME", default_value_t = String::from("Hotzenplot-task"))]
    pub task_name: String,

    /// Seconds to wait for in-flight jobs to finish on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub server_addr: String,
    pub work_duration: Duration,
    pub load_duration: Duration,
    pub device: String,
    pub task_name: String,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        let mut pool = PoolConfig::new(args.num_workers);
        if let Some(depth) = args.max_queue_depth {
            if depth == 0 {
                bail!("MAX_QUEUE_DEPTH must be greater than 0 when set");
            }
            pool = pool.with_max_queue_depth(depth);
        }

        Ok(Self {
            pool,
            server_addr: args.server_addr,
            work_duration: Duration::from_millis(args.work_millis),
            load_duration: Duration::from_millis(args.load_millis),
            device: args.device,
            task_name: args.task_name,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("stickypool-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_follow_the_reference_deployment() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.pool, PoolConfig::new(10));
        assert_eq!(config.server_addr, "0.0.0.0:8080");
        assert_eq!(config.work_duration, Duration::from_secs(3));
        assert_eq!(config.task_name, "Hotzenplot-task");
        assert_eq!(config.device, "cpu");
    }

    #[test]
    fn queue_depth_is_optional_but_positive() {
        let config = parse(&["--num-workers", "2", "--max-queue-depth", "8"]).unwrap();
        assert_eq!(config.pool, PoolConfig::new(2).with_max_queue_depth(8));

        assert!(parse(&["--max-queue-depth", "0"]).is_err());
    }

    #[test]
    fn rejects_zero_workers_and_zero_timeout() {
        assert!(parse(&["--num-workers", "0"]).is_err());
        assert!(parse(&["--shutdown-timeout", "0"]).is_err());
    }
}
