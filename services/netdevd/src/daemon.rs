//! Daemon event loop.
//!
//! One task owns the orchestrator and serves, in turn:
//! - kernel replies
//! - periodic checks of the links waiting devices reference
//! - reload requests
//! - shutdown

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use netdevd_netdev::{KindRegistry, NetDevConfig, Validator, VerifyContext};
use netdevd_rtnl::Reply;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::kernel::{DryRunKernel, KernelTransport};
use crate::links::LinkRegistry;
use crate::orchestrator::{DeviceEvent, DeviceSnapshot, Orchestrator};
use crate::source::{self, ConfigSet};

/// Pick the kernel transport the configuration asks for.
pub fn open_kernel(
    config: &Config,
    replies: mpsc::UnboundedSender<Reply>,
) -> Result<Arc<dyn KernelTransport>> {
    if config.dry_run {
        info!("Dry run: no devices will be created");
        return Ok(Arc::new(DryRunKernel::new(replies)));
    }

    #[cfg(target_os = "linux")]
    {
        let kernel = crate::kernel::RtnlKernel::open(replies)
            .context("failed to open rtnetlink socket")?;
        return Ok(Arc::new(kernel));
    }

    #[cfg(not(target_os = "linux"))]
    {
        drop(replies);
        bail!("creating devices requires Linux; use --dry-run");
    }
}

/// Parse every device definition in `set`.
///
/// Files that cannot produce a device are logged and skipped.
pub fn parse_devices(registry: &KindRegistry, set: &ConfigSet) -> Vec<NetDevConfig> {
    let validator = Validator::new(registry);

    set.netdevs
        .iter()
        .filter_map(|file| match validator.load(&file.path, &file.entries) {
            Ok(loaded) => Some(loaded.config),
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Skipping device definition");
                None
            }
        })
        .collect()
}

/// The netdevd daemon.
pub struct Daemon {
    config: Config,
    registry: Arc<KindRegistry>,
    orchestrator: Orchestrator,
    links: Arc<dyn LinkRegistry>,
    replies: mpsc::UnboundedReceiver<Reply>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl Daemon {
    /// Assemble the daemon. Fails only if the built-in kinds cannot be
    /// registered.
    pub fn new(
        config: Config,
        kernel: Arc<dyn KernelTransport>,
        links: Arc<dyn LinkRegistry>,
        replies: mpsc::UnboundedReceiver<Reply>,
    ) -> Result<Self> {
        Self::with_context(config, kernel, links, replies, VerifyContext::detect())
    }

    /// Like [`Daemon::new`] with explicit host facts for `[Match]`.
    pub fn with_context(
        config: Config,
        kernel: Arc<dyn KernelTransport>,
        links: Arc<dyn LinkRegistry>,
        replies: mpsc::UnboundedReceiver<Reply>,
        ctx: VerifyContext,
    ) -> Result<Self> {
        let registry =
            Arc::new(KindRegistry::builtin().context("failed to register built-in kinds")?);
        let kinds: Vec<_> = registry.names().collect();
        info!(?kinds, "Registered device kinds");

        let mut orchestrator =
            Orchestrator::new(Arc::clone(&registry), kernel, Arc::clone(&links), ctx)
                .with_capacity(config.message_capacity);
        let events = orchestrator.subscribe();

        Ok(Self {
            config,
            registry,
            orchestrator,
            links,
            replies,
            events,
        })
    }

    /// Read the configuration directory and (re)admit every device.
    pub fn load(&mut self) -> Result<usize> {
        let set = source::load_dir(&self.config.config_dir).with_context(|| {
            format!(
                "failed to read configuration from {}",
                self.config.config_dir.display()
            )
        })?;
        let devices = parse_devices(&self.registry, &set);
        Ok(self.orchestrator.reload(devices, &set.bindings))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run until shutdown, or until settled in `--once` mode.
    ///
    /// Returns the final device table.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut reload: mpsc::UnboundedReceiver<()>,
    ) -> Result<Vec<DeviceSnapshot>> {
        self.load()?;

        let mut poll = tokio::time::interval(self.config.link_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            config_dir = %self.config.config_dir.display(),
            poll_ms = self.config.link_poll_ms,
            once = self.config.once,
            "Daemon running"
        );

        loop {
            if self.config.once && self.orchestrator.is_settled() {
                info!("No requests in flight, exiting");
                break;
            }

            tokio::select! {
                reply = self.replies.recv() => {
                    let Some(reply) = reply else {
                        bail!("kernel reply channel closed");
                    };
                    let outcome = self.orchestrator.handle_reply(reply);
                    debug!(seq = reply.sequence, ?outcome, "Handled reply");
                }
                Some(event) = self.events.recv() => {
                    debug!(?event, "Device event");
                }
                _ = poll.tick() => {
                    self.poll_links();
                }
                Some(()) = reload.recv() => {
                    info!("Reloading configuration");
                    if let Err(e) = self.load() {
                        warn!(error = %e, "Reload failed, keeping current devices");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(self.orchestrator.snapshot())
    }

    fn poll_links(&mut self) {
        for link in self.orchestrator.waiting_links() {
            if self.links.resolve(&link).is_some() {
                let started = self.orchestrator.on_link_changed(&link);
                if started > 0 {
                    debug!(link = %link, started, "Link resolved");
                }
            }
        }
    }
}
