use cu29::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Which estimate feeds the vertical velocity state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VzSource {
    /// Raw estimator vz.
    #[default]
    Raw,
    /// Blend of the position derivative and the raw vz, weighted by the commanded vertical speed
    /// over the landing speed.
    Blended,
}

/// Tunables of the position control orchestrator.
///
/// Loaded from RON, missing fields take their default value:
/// ```ron
/// (
///     takeoff_ramp_time: 2.0,
///     pos_mode: 1,
///     vz_source: Blended,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosControlParams {
    /// Seconds to reach the takeoff speed during a smooth takeoff.
    pub takeoff_ramp_time: f32,
    /// Maximum climb speed (m/s).
    pub vel_max_up: f32,
    /// Maximum descent speed (m/s).
    pub vel_max_down: f32,
    /// Landing descent speed, also used by the failsafe descent (m/s).
    pub land_speed: f32,
    /// Target climb speed of the smooth takeoff (m/s).
    pub takeoff_speed: f32,
    /// Altitude below which the descent speed is capped to the landing speed (m).
    pub land_alt2: f32,
    /// Manual position mode: 0 position, 1 smooth position, 2 sport.
    pub pos_mode: i32,
    /// Cutoff of the velocity derivative low pass (Hz).
    pub veld_lp: f32,
    /// Time the vehicle needs to be armed before it is allowed to take off (ms).
    pub idle_before_takeoff_ms: u64,
    pub vz_source: VzSource,
    /// Only publish attitude setpoints once the vehicle has been armed long enough.
    pub publish_requires_arm_hysteresis: bool,
}

impl Default for PosControlParams {
    fn default() -> Self {
        Self {
            takeoff_ramp_time: 3.0,
            vel_max_up: 3.0,
            vel_max_down: 1.0,
            land_speed: 0.7,
            takeoff_speed: 1.5,
            land_alt2: 5.0,
            pos_mode: 0,
            veld_lp: 5.0,
            idle_before_takeoff_ms: 2500,
            vz_source: VzSource::Raw,
            publish_requires_arm_hysteresis: false,
        }
    }
}

impl PosControlParams {
    pub fn from_ron_str(text: &str) -> CuResult<Self> {
        ron::from_str(text)
            .map_err(|e| CuError::new_with_cause("Could not parse the position control parameters", e))
    }

    /// The takeoff speed can't exceed the maximum climb speed, the landing speed the maximum
    /// descent speed.
    pub fn constrained(&self) -> Self {
        Self {
            takeoff_speed: self.takeoff_speed.min(self.vel_max_up),
            land_speed: self.land_speed.min(self.vel_max_down),
            ..self.clone()
        }
    }

    /// Reads the parameters from the task configuration of the copper config file, missing keys
    /// take their default value.
    ///
    /// ```ron
    /// (id: "mpc", type: "cu_mc_pos_control::McPosControlTask<Tasks, Pid>",
    ///  config: {"takeoff_ramp_time": 2.0, "pos_mode": 1, "vz_source": "blended"})
    /// ```
    pub fn from_component_config(config: Option<&ComponentConfig>) -> CuResult<Self> {
        let defaults = Self::default();
        let Some(config) = config else {
            return Ok(defaults);
        };
        debug!("mc_pos_control config: {}", config.to_string());

        let vz_source = match config.get::<String>("vz_source").as_deref() {
            None => defaults.vz_source,
            Some("raw") => VzSource::Raw,
            Some("blended") => VzSource::Blended,
            Some(other) => {
                return Err(format!("unknown vz_source '{other}', expected raw or blended").into())
            }
        };

        Ok(Self {
            takeoff_ramp_time: cfg_f32(config, "takeoff_ramp_time", defaults.takeoff_ramp_time),
            vel_max_up: cfg_f32(config, "vel_max_up", defaults.vel_max_up),
            vel_max_down: cfg_f32(config, "vel_max_down", defaults.vel_max_down),
            land_speed: cfg_f32(config, "land_speed", defaults.land_speed),
            takeoff_speed: cfg_f32(config, "takeoff_speed", defaults.takeoff_speed),
            land_alt2: cfg_f32(config, "land_alt2", defaults.land_alt2),
            pos_mode: config.get::<i32>("pos_mode").unwrap_or(defaults.pos_mode),
            veld_lp: cfg_f32(config, "veld_lp", defaults.veld_lp),
            idle_before_takeoff_ms: config
                .get::<u32>("idle_before_takeoff_ms")
                .map(u64::from)
                .unwrap_or(defaults.idle_before_takeoff_ms),
            vz_source,
            publish_requires_arm_hysteresis: config
                .get::<bool>("publish_requires_arm_hysteresis")
                .unwrap_or(defaults.publish_requires_arm_hysteresis),
        })
    }

    pub fn idle_before_takeoff(&self) -> CuDuration {
        std::time::Duration::from_millis(self.idle_before_takeoff_ms).into()
    }
}

fn cfg_f32(config: &ComponentConfig, key: &str, default: f32) -> f32 {
    config
        .get::<f64>(key)
        .map(|value| value as f32)
        .unwrap_or(default)
}

/// Parameter storage.
pub trait ParameterSource: Send {
    fn load(&self) -> CuResult<PosControlParams>;
}

/// Parameter storage living in memory, clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct InMemoryParameters {
    inner: Arc<Mutex<Stored>>,
}

#[derive(Debug, Default)]
struct Stored {
    params: PosControlParams,
    /// Bumped on every write.
    revision: u64,
}

impl InMemoryParameters {
    pub fn new(params: PosControlParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Stored {
                params,
                revision: 0,
            })),
        }
    }

    pub fn from_ron_str(text: &str) -> CuResult<Self> {
        Ok(Self::new(PosControlParams::from_ron_str(text)?))
    }

    fn lock(&self) -> CuResult<MutexGuard<'_, Stored>> {
        self.inner
            .lock()
            .map_err(|_| CuError::from("Parameter storage poisoned"))
    }

    pub fn set(&self, params: PosControlParams) -> CuResult<()> {
        self.modify(|current| *current = params)
    }

    pub fn modify(&self, f: impl FnOnce(&mut PosControlParams)) -> CuResult<()> {
        let mut stored = self.lock()?;
        f(&mut stored.params);
        stored.revision += 1;
        Ok(())
    }

    /// Number of writes so far, a change means the parameters need a reload.
    pub fn revision(&self) -> CuResult<u64> {
        Ok(self.lock()?.revision)
    }
}

impl ParameterSource for InMemoryParameters {
    fn load(&self) -> CuResult<PosControlParams> {
        Ok(self.lock()?.params.clone())
    }
}

/// Last constrained copy of the parameters, refreshed on demand.
pub struct ParameterCache<S: ParameterSource> {
    source: S,
    current: PosControlParams,
}

impl<S: ParameterSource> ParameterCache<S> {
    /// Loads the parameters once, a storage failure here is fatal.
    pub fn new(source: S) -> CuResult<Self> {
        let current = source.load()?.constrained();
        Ok(Self { source, current })
    }

    /// Reloads when forced or when the storage notified a change. Returns true if the values were
    /// reloaded.
    pub fn refresh(&mut self, force: bool, notified: bool) -> CuResult<bool> {
        if !(force || notified) {
            return Ok(false);
        }
        self.current = self.source.load()?.constrained();
        debug!(
            "params: takeoff_speed {} land_speed {} ramp {} pos_mode {}",
            self.current.takeoff_speed,
            self.current.land_speed,
            self.current.takeoff_ramp_time,
            self.current.pos_mode
        );
        Ok(true)
    }

    pub fn get(&self) -> &PosControlParams {
        &self.current
    }
}
