use crate::light::StoplightTiming;
use crate::math::Vector3d;
use crate::CAR_SIZE;

/// Tunable parameters of the traffic simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrafficParams {
    /// The number of moving cars replacements are spawned up to.
    pub num_cars: usize,
    /// The width of a two-lane road in world units. Car sizes are relative to it.
    pub road_width: f64,
    /// The probability that a car leaving the simulation is replaced.
    pub traffic_balance_val: f64,
    /// The probability that a new destination is in another city.
    pub new_city_prob: f64,
    /// The largest random scale applied to spawned cars.
    pub max_car_scale: f64,
    /// The number of car models to choose from.
    pub num_car_models: usize,
    /// Whether cars follow routes to destinations instead of turning at random.
    pub enable_car_path_finding: bool,
    /// The standard deviation of the per-car max speed around 1.
    pub speed_stddev: f64,
    /// The bounds of the fraction of parking spaces filled per lot.
    pub min_park_density: f64,
    pub max_park_density: f64,
    pub stoplight_timing: StoplightTiming,
}

impl Default for TrafficParams {
    fn default() -> Self {
        Self {
            num_cars: 100,
            road_width: 0.06,
            traffic_balance_val: 0.5,
            new_city_prob: 1.0,
            max_car_scale: 1.0,
            num_car_models: 1,
            enable_car_path_finding: false,
            speed_stddev: 0.1,
            min_park_density: 0.0,
            max_park_density: 0.75,
            stoplight_timing: Default::default(),
        }
    }
}

impl TrafficParams {
    /// Panics if any parameter is out of range.
    pub fn validate(&self) {
        assert!(self.road_width > 0.0, "Road width must be positive");
        assert!((0.0..=1.0).contains(&self.traffic_balance_val), "traffic_balance_val must be in [0, 1]");
        assert!((0.0..=1.0).contains(&self.new_city_prob), "new_city_prob must be in [0, 1]");
        assert!(self.max_car_scale >= 1.0, "max_car_scale must be at least 1");
        assert!(self.num_car_models > 0, "Need at least one car model");
        assert!(self.speed_stddev >= 0.0, "speed_stddev must not be negative");
        assert!(
            0.0 <= self.min_park_density
                && self.min_park_density <= self.max_park_density
                && self.max_park_density <= 1.0,
            "Parking densities must satisfy 0 <= min <= max <= 1"
        );
        self.stoplight_timing.validate();
    }

    /// The length, width and height of an unscaled car.
    pub fn nom_car_size(&self) -> Vector3d {
        Vector3d::from(CAR_SIZE) * self.road_width
    }

    /// The size of the largest car that can be spawned.
    pub fn max_car_size(&self) -> Vector3d {
        self.nom_car_size() * self.max_car_scale
    }
}
