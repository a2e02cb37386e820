//! Ground truth oracle for simulation.
//!
//! The oracle maintains the "God's eye view" of the simulated airspace:
//! - True positions and identities of all drones
//! - Kinematics (constant velocity in degrees per second)
//! - Feed emission: noisy updates, transport handoffs, duplicate deliveries
//!   and anonymous position fixes

use dronewatch_core::geodesy::{lng_lat, Coordinate};
use dronewatch_core::DroneUpdate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Distance between neighbouring drones' starting cells (~5.5 km).
const GRID_SPACING_DEG: f64 = 0.05;

/// Maximum speed per axis (~11 m/s).
const MAX_SPEED_DEG_S: f64 = 0.0001;

const ORGANIZATIONS: &[&str] = &["Skyline Surveys", "Harbor Logistics", "Civic Air Patrol"];

/// A ground truth drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthDrone {
    /// Oracle-local index
    pub id: u64,

    /// Registration; `None` for drones that only send anonymous fixes
    pub registration: Option<String>,

    pub name: Option<String>,
    pub pilot: Option<String>,
    pub organization: Option<String>,

    /// Current transport identifier
    pub serial: Option<String>,

    /// True position [lng, lat]
    pub position: Coordinate,

    /// Velocity in degrees per second
    pub velocity: Coordinate,

    pub altitude: f64,
    pub yaw: f64,

    /// Transport handoffs performed so far
    pub handoffs: u32,

    /// Updates emitted (duplicates not counted)
    pub emitted: u64,

    /// Coordinate carried by the most recent update
    pub last_emitted: Option<Coordinate>,
}

impl GroundTruthDrone {
    pub fn is_anonymous(&self) -> bool {
        self.registration.is_none()
    }

    /// Segments a correct tracker must have built for this drone.
    pub fn expected_segments(&self) -> usize {
        self.handoffs as usize + 1
    }
}

/// The oracle: ground truth plus the feed it produces.
pub struct FleetOracle {
    /// RNG for kinematics, noise and feed events
    rng: ChaCha8Rng,

    drones: Vec<GroundTruthDrone>,

    /// Centre of the spawn grid [lng, lat]
    center: Coordinate,

    /// Position noise standard deviation (degrees)
    jitter_std_deg: f64,

    /// Chance per emission that a drone switches transport identifier
    handoff_probability: f64,

    /// Chance per emission that an update is delivered twice
    duplicate_probability: f64,

    /// Current simulation time (seconds)
    current_time: f64,

    duplicates_emitted: u64,
}

impl FleetOracle {
    /// Creates an empty oracle with the given physics seed.
    pub fn new(seed: u64) -> Self {
        Self::from_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            drones: Vec::new(),
            center: lng_lat(34.78, 32.08),
            jitter_std_deg: 0.000_005,
            handoff_probability: 0.0,
            duplicate_probability: 0.0,
            current_time: 0.0,
            duplicates_emitted: 0,
        }
    }

    pub fn set_jitter(&mut self, std_deg: f64) {
        self.jitter_std_deg = std_deg.abs();
    }

    pub fn set_handoff_probability(&mut self, p: f64) {
        self.handoff_probability = p.clamp(0.0, 1.0);
    }

    pub fn set_duplicate_probability(&mut self, p: f64) {
        self.duplicate_probability = p.clamp(0.0, 1.0);
    }

    /// Spawn `count` drones on a grid, the last `anonymous` of them without identity.
    pub fn spawn_fleet(&mut self, count: usize, anonymous: usize) {
        let cols = (count as f64).sqrt().ceil().max(1.0) as usize;
        for i in 0..count {
            let cell = lng_lat(
                self.center.x + (i % cols) as f64 * GRID_SPACING_DEG,
                self.center.y + (i / cols) as f64 * GRID_SPACING_DEG,
            );
            let is_anonymous = i >= count.saturating_sub(anonymous);
            self.spawn_drone(cell, is_anonymous);
        }
    }

    fn spawn_drone(&mut self, cell: Coordinate, anonymous: bool) -> u64 {
        let id = self.drones.len() as u64;
        let offset = GRID_SPACING_DEG / 10.0;
        let position = lng_lat(
            cell.x + self.rng.gen_range(-offset..offset),
            cell.y + self.rng.gen_range(-offset..offset),
        );
        let velocity = lng_lat(
            self.rng.gen_range(-MAX_SPEED_DEG_S..MAX_SPEED_DEG_S),
            self.rng.gen_range(-MAX_SPEED_DEG_S..MAX_SPEED_DEG_S),
        );
        let yaw = velocity.x.atan2(velocity.y).to_degrees().rem_euclid(360.0);
        let altitude = self.rng.gen_range(40.0..150.0);

        let drone = if anonymous {
            GroundTruthDrone {
                id,
                registration: None,
                name: None,
                pilot: None,
                organization: None,
                serial: None,
                position,
                velocity,
                altitude,
                yaw,
                handoffs: 0,
                emitted: 0,
                last_emitted: None,
            }
        } else {
            // even ids fly with an allowed registration, odd ids with a blocked one
            let registration = if id % 2 == 0 {
                format!("SG-BA{:03}", id)
            } else {
                format!("SD-CA{:03}", id)
            };
            GroundTruthDrone {
                id,
                registration: Some(registration),
                name: Some(format!("Scout {}", id)),
                pilot: Some(format!("pilot-{}", id)),
                organization: Some(ORGANIZATIONS[id as usize % ORGANIZATIONS.len()].to_string()),
                serial: Some(new_serial(&mut self.rng)),
                position,
                velocity,
                altitude,
                yaw,
                handoffs: 0,
                emitted: 0,
                last_emitted: None,
            }
        };

        self.drones.push(drone);
        id
    }

    /// Advances kinematics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        for drone in &mut self.drones {
            drone.position.x += drone.velocity.x * dt;
            drone.position.y += drone.velocity.y * dt;
        }
    }

    /// Produce one feed update per drone, in drone order.
    pub fn emit(&mut self) -> Vec<DroneUpdate> {
        let Self {
            rng,
            drones,
            jitter_std_deg,
            handoff_probability,
            duplicate_probability,
            duplicates_emitted,
            ..
        } = self;

        let mut updates = Vec::with_capacity(drones.len());
        for drone in drones.iter_mut() {
            if drone.serial.is_some() && drone.emitted > 0 && rng.gen_bool(*handoff_probability) {
                drone.serial = Some(new_serial(rng));
                drone.handoffs += 1;
            }

            let noise_x: f64 = rng.sample(StandardNormal);
            let noise_y: f64 = rng.sample(StandardNormal);
            let coord = lng_lat(
                drone.position.x + noise_x * *jitter_std_deg,
                drone.position.y + noise_y * *jitter_std_deg,
            );

            let update = feed_update(drone, coord);
            drone.last_emitted = Some(coord);
            drone.emitted += 1;

            if rng.gen_bool(*duplicate_probability) {
                updates.push(update.clone());
                *duplicates_emitted += 1;
            }
            updates.push(update);
        }

        updates
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn drones(&self) -> &[GroundTruthDrone] {
        &self.drones
    }

    pub fn total_handoffs(&self) -> u64 {
        self.drones.iter().map(|d| d.handoffs as u64).sum()
    }

    pub fn duplicates_emitted(&self) -> u64 {
        self.duplicates_emitted
    }

    pub fn anonymous_count(&self) -> usize {
        self.drones.iter().filter(|d| d.is_anonymous()).count()
    }
}

/// A UUID transport identifier drawn from the oracle's RNG.
fn new_serial(rng: &mut ChaCha8Rng) -> String {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string()
}

fn feed_update(drone: &GroundTruthDrone, coord: Coordinate) -> DroneUpdate {
    if drone.is_anonymous() {
        return DroneUpdate::fix(coord.x, coord.y, drone.altitude);
    }

    let mut update = DroneUpdate::at(coord.x, coord.y)
        .with_property("altitude", drone.altitude)
        .with_property("yaw", drone.yaw);
    let fields = [
        ("registration", &drone.registration),
        ("serial", &drone.serial),
        ("Name", &drone.name),
        ("pilot", &drone.pilot),
        ("organization", &drone.organization),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            update = update.with_property(key, value.as_str());
        }
    }
    update
}
