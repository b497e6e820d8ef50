pub use car::{Car, SpeedAction, TurnDir, CAR_COLORS, NUM_CAR_COLORS};
pub use cgmath;
pub use color::Color;
pub use light::{CrosswalkState, LightState, Stoplight, StoplightTiming};
pub use manager::{CarBlock, CarManager, Surface};
pub use params::TrafficParams;
pub use road::{
    CityRoads, Intersection, IsecLink, ParkingLot, Plot, Road, RoadGeometry, RoadNetwork,
    RoadSeg, RoadType, SegLink,
};
pub use util::Interval;

mod car;
pub mod color;
mod debug;
pub mod light;
mod manager;
pub mod math;
mod params;
pub mod road;
mod util;

/// The city index of the connector network joining the cities.
pub const CONN_CITY_IX: usize = u16::MAX as usize;

/// Max speed multiplier on connector roads.
pub const CONN_ROAD_SPEED_MULT: f64 = 2.0;

/// How much the headlight switching threshold varies between cars.
pub const HEADLIGHT_ON_RAND: f64 = 0.1;

/// Nominal car length, width and height, relative to the road width.
pub const CAR_SIZE: [f64; 3] = [0.30, 0.13, 0.08];

/// The size of a parking space across and along a parked car, relative to the car.
pub const PARK_SPACE_WIDTH: f64 = 1.6;
pub const PARK_SPACE_LENGTH: f64 = 1.8;

/// The timing of one simulated frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// The time elapsed since the previous frame, in s.
    pub dt: f64,
    /// The simulation clock, in s.
    pub now: f64,
}

impl FrameTime {
    pub fn new(dt: f64, now: f64) -> Self {
        Self { dt, now }
    }
}
