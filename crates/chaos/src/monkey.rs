use crate::FaultInjector;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq)]
pub enum ChaosError {
    #[error("{name} must be a probability between 0 and 1, got {value}")]
    InvalidChance { name: &'static str, value: f64 },
    #[error("link_speed_min ({min}) must be between 1 and link_speed_max ({max})")]
    InvalidLinkSpeed { min: u64, max: u64 },
}

/// Probabilities for each kind of fault. Every chance is in the
/// range `0.0..=1.0`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChaosConfig {
    /// Chance that an incoming connection is accepted
    #[serde(default = "ChaosConfig::default_accept_chance")]
    pub accept_chance: f64,

    /// Chance, after each read, that the connection is dropped
    #[serde(default = "ChaosConfig::default_disconnect_chance")]
    pub disconnect_chance: f64,

    /// Chance that a connection is throttled at all
    #[serde(default = "ChaosConfig::default_link_speed_affect")]
    pub link_speed_affect: f64,

    /// Bounds, in bytes per second, for the speed of a throttled link
    #[serde(default = "ChaosConfig::default_link_speed_min")]
    pub link_speed_min: u64,
    #[serde(default = "ChaosConfig::default_link_speed_max")]
    pub link_speed_max: u64,

    #[serde(default = "ChaosConfig::default_reject_chance")]
    pub reject_sender_chance: f64,
    #[serde(default = "ChaosConfig::default_reject_chance")]
    pub reject_recipient_chance: f64,
    #[serde(default = "ChaosConfig::default_reject_chance")]
    pub reject_auth_chance: f64,

    /// Seed for the random number generator. When set, a given
    /// sequence of decisions is reproducible.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            accept_chance: Self::default_accept_chance(),
            disconnect_chance: Self::default_disconnect_chance(),
            link_speed_affect: Self::default_link_speed_affect(),
            link_speed_min: Self::default_link_speed_min(),
            link_speed_max: Self::default_link_speed_max(),
            reject_sender_chance: Self::default_reject_chance(),
            reject_recipient_chance: Self::default_reject_chance(),
            reject_auth_chance: Self::default_reject_chance(),
            seed: None,
        }
    }
}

impl ChaosConfig {
    fn default_accept_chance() -> f64 {
        0.99
    }
    fn default_disconnect_chance() -> f64 {
        0.005
    }
    fn default_link_speed_affect() -> f64 {
        0.1
    }
    fn default_link_speed_min() -> u64 {
        1024
    }
    fn default_link_speed_max() -> u64 {
        10240
    }
    fn default_reject_chance() -> f64 {
        0.05
    }

    /// A configuration that never injects any fault
    pub fn benign() -> Self {
        Self {
            accept_chance: 1.0,
            disconnect_chance: 0.0,
            link_speed_affect: 0.0,
            reject_sender_chance: 0.0,
            reject_recipient_chance: 0.0,
            reject_auth_chance: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ChaosError> {
        for (name, value) in [
            ("accept_chance", self.accept_chance),
            ("disconnect_chance", self.disconnect_chance),
            ("link_speed_affect", self.link_speed_affect),
            ("reject_sender_chance", self.reject_sender_chance),
            ("reject_recipient_chance", self.reject_recipient_chance),
            ("reject_auth_chance", self.reject_auth_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ChaosError::InvalidChance { name, value });
            }
        }
        if self.link_speed_min == 0 || self.link_speed_min > self.link_speed_max {
            return Err(ChaosError::InvalidLinkSpeed {
                min: self.link_speed_min,
                max: self.link_speed_max,
            });
        }
        Ok(())
    }
}

/// Injects faults at random, at the rates given by its [ChaosConfig].
pub struct ChaosMonkey {
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for ChaosMonkey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("ChaosMonkey")
            .field("config", &self.config)
            .finish()
    }
}

impl ChaosMonkey {
    pub fn new(config: ChaosConfig) -> Result<Self, ChaosError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    fn chance(&self, probability: f64) -> bool {
        self.rng.lock().gen_bool(probability)
    }
}

impl FaultInjector for ChaosMonkey {
    fn accept(&self, peer: SocketAddr) -> bool {
        if self.chance(self.config.accept_chance) {
            return true;
        }
        info!("chaos: rejecting connection from {peer}");
        false
    }

    fn link_speed(&self) -> Option<u64> {
        if !self.chance(self.config.link_speed_affect) {
            return None;
        }
        let speed = self
            .rng
            .lock()
            .gen_range(self.config.link_speed_min..=self.config.link_speed_max);
        info!("chaos: limiting link speed to {speed} bytes/s");
        Some(speed)
    }

    fn disconnect(&self) -> bool {
        if self.chance(self.config.disconnect_chance) {
            info!("chaos: disconnecting");
            return true;
        }
        false
    }

    fn valid_mail(&self, address: &str) -> bool {
        if self.chance(self.config.reject_sender_chance) {
            info!("chaos: rejecting sender {address}");
            return false;
        }
        true
    }

    fn valid_rcpt(&self, address: &str) -> bool {
        if self.chance(self.config.reject_recipient_chance) {
            info!("chaos: rejecting recipient {address}");
            return false;
        }
        true
    }

    fn valid_auth(&self, mechanism: &str, _args: &[String]) -> bool {
        if self.chance(self.config.reject_auth_chance) {
            info!("chaos: rejecting {mechanism} authentication");
            return false;
        }
        true
    }
}
