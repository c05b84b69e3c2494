//! Gas price hints that change at upgrade activation times
//!
//! The updater publishes the launch minimum gas price immediately, then
//! steps through Phase1, Phase3 and Phase4. A step whose upgrade is already
//! active applies at once; a future one is applied by a task that sleeps
//! until the activation time. An unscheduled upgrade ends the sequence.

use delta_core::params::protocol::{
    LAUNCH_MIN_GAS_PRICE, PHASE1_MIN_GAS_PRICE, PHASE3_MIN_BASE_FEE, PHASE4_MIN_BASE_FEE,
};
use delta_core::params::Upgrade;
use delta_core::{ChainConfig, Wei};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Receiver of the published hints
pub trait GasPriceSetter: Send + Sync {
    fn set_gas_price(&self, price: Wei);
    fn set_min_fee(&self, min_fee: Wei);
}

/// Latest published hints
#[derive(Debug, Default)]
pub struct GasPriceHints {
    gas_price: RwLock<Option<Wei>>,
    min_fee: RwLock<Option<Wei>>,
}

impl GasPriceHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gas_price(&self) -> Option<Wei> {
        *self.gas_price.read()
    }

    pub fn min_fee(&self) -> Option<Wei> {
        *self.min_fee.read()
    }
}

impl GasPriceSetter for GasPriceHints {
    fn set_gas_price(&self, price: Wei) {
        *self.gas_price.write() = Some(price);
    }

    fn set_min_fee(&self, min_fee: Wei) {
        *self.min_fee.write() = Some(min_fee);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hint {
    GasPrice,
    MinFee,
}

fn publish(setter: &dyn GasPriceSetter, hint: Hint, value: Wei) {
    match hint {
        Hint::GasPrice => setter.set_gas_price(value),
        Hint::MinFee => setter.set_min_fee(value),
    }
}

pub struct GasPriceUpdater {
    setter: Arc<dyn GasPriceSetter>,
    config: Arc<ChainConfig>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl GasPriceUpdater {
    pub fn new(
        setter: Arc<dyn GasPriceSetter>,
        config: Arc<ChainConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            setter,
            config,
            shutdown,
            tracker: TaskTracker::new(),
        }
    }

    /// Publish current hints and schedule the future ones. Must run inside
    /// a tokio runtime.
    pub fn start(&self) {
        self.setter.set_gas_price(LAUNCH_MIN_GAS_PRICE);

        let steps = [
            (Upgrade::Phase1, Hint::GasPrice, PHASE1_MIN_GAS_PRICE),
            (Upgrade::Phase3, Hint::GasPrice, 0),
            (Upgrade::Phase3, Hint::MinFee, PHASE3_MIN_BASE_FEE),
            (Upgrade::Phase4, Hint::MinFee, PHASE4_MIN_BASE_FEE),
        ];
        for (upgrade, hint, value) in steps {
            let Some(activation) = self.config.upgrade_time(upgrade) else {
                debug!(upgrade = upgrade.label(), "upgrade not scheduled, gas price updates end");
                break;
            };
            self.schedule(upgrade, activation, hint, value);
        }
        self.tracker.close();
    }

    fn schedule(&self, upgrade: Upgrade, activation: u64, hint: Hint, value: Wei) {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let wait_ms = activation.saturating_mul(1000).saturating_sub(now_ms);
        if wait_ms == 0 {
            publish(self.setter.as_ref(), hint, value);
            return;
        }

        let setter = self.setter.clone();
        let shutdown = self.shutdown.clone();
        info!(upgrade = upgrade.label(), activation, ?hint, "scheduled gas price update");
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {
                    publish(setter.as_ref(), hint, value);
                    info!(upgrade = upgrade.label(), ?hint, value, "applied gas price update");
                }
                _ = shutdown.cancelled() => {
                    debug!(upgrade = upgrade.label(), "gas price update cancelled");
                }
            }
        });
    }

    /// Scheduled updates still waiting
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every scheduled update ran or was cancelled
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Cancel pending updates and wait for their tasks to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.wait().await;
    }
}
