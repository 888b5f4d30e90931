//! Configurators: transforms over the derived network configuration
//!
//! The leader derives a base `TestgroundConfig` from genesis and the
//! collected packets, then applies configurators strictly left to right.
//! Later configurators see the output of earlier ones, so order matters.

use std::time::Duration;

use ledgerlab_core::{BootstrapError, HarnessError, Result, TestgroundConfig};

/// A transform applied to the per-participant configuration set
pub trait Configurator: Send + Sync {
    /// Name used in error messages
    fn name(&self) -> &str;

    fn apply(&self, config: &mut TestgroundConfig) -> Result<()>;
}

/// Configurator backed by a closure
pub struct FnConfigurator<F> {
    name: String,
    f: F,
}

impl<F> Configurator for FnConfigurator<F>
where
    F: Fn(&mut TestgroundConfig) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, config: &mut TestgroundConfig) -> Result<()> {
        (self.f)(config)
    }
}

/// Wrap a closure as a configurator
pub fn configurator<F>(name: impl Into<String>, f: F) -> Box<dyn Configurator>
where
    F: Fn(&mut TestgroundConfig) -> Result<()> + Send + Sync + 'static,
{
    Box::new(FnConfigurator {
        name: name.into(),
        f,
    })
}

/// Apply configurators in order
pub fn apply_all(
    mut config: TestgroundConfig,
    configurators: &[Box<dyn Configurator>],
) -> std::result::Result<TestgroundConfig, BootstrapError> {
    for c in configurators {
        c.apply(&mut config)
            .map_err(|e| BootstrapError::Configure(format!("{}: {}", c.name(), e)))?;
        tracing::debug!(configurator = c.name(), "Applied configurator");
    }
    Ok(config)
}

/// Every node keeps a connection to every other node
pub fn full_mesh() -> Box<dyn Configurator> {
    configurator("full_mesh", |config| {
        let names = config.participants();
        for node in config.nodes.values_mut() {
            node.persistent_peers = names.iter().filter(|n| **n != node.name).cloned().collect();
        }
        Ok(())
    })
}

/// Every node connects to `hub` only; the hub connects to everyone
pub fn star(hub: impl Into<String>) -> Box<dyn Configurator> {
    let hub = hub.into();
    configurator(format!("star({})", hub), move |config| {
        if !config.nodes.contains_key(&hub) {
            return Err(HarnessError::Config(format!("unknown hub {}", hub)));
        }
        let names = config.participants();
        for node in config.nodes.values_mut() {
            node.persistent_peers = if node.name == hub {
                names.iter().filter(|n| **n != hub).cloned().collect()
            } else {
                vec![hub.clone()]
            };
        }
        Ok(())
    })
}

pub fn with_timeout_commit(timeout: Duration) -> Box<dyn Configurator> {
    configurator("timeout_commit", move |config| {
        for node in config.nodes.values_mut() {
            node.timeout_commit = timeout;
        }
        Ok(())
    })
}

pub fn with_max_block_bytes(bytes: u64) -> Box<dyn Configurator> {
    configurator("max_block_bytes", move |config| {
        if bytes == 0 {
            return Err(HarnessError::Config("max_block_bytes must be positive".into()));
        }
        for node in config.nodes.values_mut() {
            node.max_block_bytes = bytes;
        }
        Ok(())
    })
}

pub fn with_mempool_max_txs(max: usize) -> Box<dyn Configurator> {
    configurator("mempool_max_txs", move |config| {
        for node in config.nodes.values_mut() {
            node.mempool_max_txs = max;
        }
        Ok(())
    })
}
