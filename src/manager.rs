use self::update::Driver;
use crate::car::{Car, TurnDir, NUM_CAR_COLORS};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::math::Cube;
use crate::params::TrafficParams;
use crate::road::{RoadNetwork, RoadType};
use crate::util::Interval;
use crate::FrameTime;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use smallvec::SmallVec;
use std::ops::Range;

pub use query::Surface;

mod query;
mod update;

/// The number of places tried when spawning a car before giving up.
const MAX_SPAWN_TRIES: usize = 10;

/// A run of cars in the same city. Moving cars come first, then parked cars,
/// each sorted by the low x coordinate of their box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CarBlock {
    /// The index of the first car of the block.
    pub start: usize,
    pub cur_city: usize,
    /// The index of the first parked car, or the end of the block if there are none.
    pub first_parked: usize,
}

/// Owns every car and advances them one frame at a time.
pub struct CarManager {
    roads: RoadNetwork,
    params: TrafficParams,
    rng: StdRng,
    /// The cars, sorted by city, then parked, then low x.
    cars: Vec<Car>,
    car_blocks: Vec<CarBlock>,
    /// The bounds of the cars in each block.
    block_bcubes: Vec<Cube>,
    /// The length of the longest car, used to widen range queries.
    max_car_len: f64,
    /// Whether cars were added since the blocks were last built.
    unsorted: bool,
    /// The simulation clock at the latest frame, in s.
    now: f64,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl CarManager {
    /// Creates a manager with no cars.
    pub fn new(roads: RoadNetwork, params: TrafficParams, seed: u64) -> Self {
        params.validate();
        Self {
            roads,
            params,
            rng: StdRng::seed_from_u64(seed),
            cars: vec![],
            car_blocks: vec![],
            block_bcubes: vec![],
            max_car_len: 0.0,
            unsorted: false,
            now: 0.0,
            #[cfg(feature = "debug")]
            debug: Default::default(),
        }
    }

    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn car_blocks(&self) -> &[CarBlock] {
        &self.car_blocks
    }

    pub fn roads(&self) -> &RoadNetwork {
        &self.roads
    }

    pub fn params(&self) -> &TrafficParams {
        &self.params
    }

    pub fn num_moving(&self) -> usize {
        self.cars
            .iter()
            .filter(|c| !c.is_parked() && !c.destroyed)
            .count()
    }

    pub fn num_parked(&self) -> usize {
        self.cars
            .iter()
            .filter(|c| c.is_parked() && !c.destroyed)
            .count()
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Spawns up to `num` moving cars, returning how many were placed.
    pub fn init_cars(&mut self, num: usize) -> usize {
        let placed = (0..num).filter(|_| self.add_car()).count();
        if placed < num {
            log::warn!("only placed {} of {} cars", placed, num);
        }
        placed
    }

    /// Spawns one moving car on a random segment, clear of other cars.
    pub fn add_car(&mut self) -> bool {
        let total_segs: usize = self.roads.networks().map(|(_, r)| r.segs().len()).sum();
        if total_segs == 0 {
            log::warn!("no road segments to place cars on");
            return false;
        }
        let size = self.params.nom_car_size();
        let speed_distr = rand_distr::Normal::new(1.0, self.params.speed_stddev)
            .expect("Invalid standard deviation");

        for _ in 0..MAX_SPAWN_TRIES {
            let mut pick = self.rng.gen_range(0..total_segs);
            let Some((city, roads)) = self.roads.networks().find(|(_, r)| {
                let found = pick < r.segs().len();
                if !found {
                    pick -= r.segs().len();
                }
                found
            }) else {
                break;
            };
            let seg = roads.get_seg(pick);
            let road = &seg.road;
            let scale = self.rng.gen_range(1.0..=self.params.max_car_scale);
            let (len, wid, height) = (scale * size.x, scale * size.y, scale * size.z);
            if road.length() < 2.0 * len {
                continue;
            }
            let extent = road.bcube.d[road.dim];
            let pos = self.rng.gen_range((extent.min + len)..=(extent.max - len));
            let dir = self.rng.gen_bool(0.5);
            let z = road.z_at(pos);

            let mut bcube = Cube::all_zeros();
            bcube.d[road.dim] = Interval::disc(pos, 0.5 * len);
            bcube.d[1 - road.dim] = Interval::disc(road.lane_center(dir), 0.5 * wid);
            bcube.d[2] = Interval::new(z, z + height);
            let clear = bcube.expand_by(len);
            if self.cars.iter().any(|c| !c.destroyed && c.bcube.intersects(&clear)) {
                continue;
            }

            let max_speed = speed_distr.sample(&mut self.rng).clamp(0.75, 1.25);
            let mut car = Car::new(bcube, road.dim, dir, max_speed);
            car.cur_city = city;
            car.cur_road = seg.road_ix;
            car.cur_seg = pick;
            car.cur_road_type = RoadType::Seg;
            car.color_id = self.rng.gen_range(0..NUM_CAR_COLORS);
            car.model_id = self.rng.gen_range(0..self.params.num_car_models);

            let driver = Driver::new(&self.roads, &self.params, FrameTime::new(0.0, self.now), 0.0);
            driver.place_on_road(&mut car);
            car.start_waiting(self.now);
            if self.params.enable_car_path_finding {
                driver.choose_destination(&mut car, &mut self.rng);
            }
            log::debug!("spawned {}", car);
            self.cars.push(car);
            self.unsorted = true;
            return true;
        }
        log::warn!("failed to place a car after {} tries", MAX_SPAWN_TRIES);
        false
    }

    /// Adds a moving car placed by the caller on a road segment.
    pub fn add_moving_car(&mut self, mut car: Car) {
        assert!(car.is_valid() && !car.is_parked(), "Only valid moving cars can be added");
        assert_eq!(car.cur_road_type, RoadType::Seg, "Moving cars must start on a segment");
        Driver::new(&self.roads, &self.params, FrameTime::new(0.0, self.now), 0.0).place_on_road(&mut car);
        car.start_waiting(self.now);
        log::debug!("added {}", car);
        self.cars.push(car);
        self.unsorted = true;
    }

    /// Adds parked cars. Cars with a degenerate box are dropped.
    pub fn add_parked_cars(&mut self, cars: impl IntoIterator<Item = Car>) {
        for mut car in cars {
            if !car.is_valid() {
                log::warn!("dropping parked car with an invalid box");
                continue;
            }
            car.park();
            self.cars.push(car);
            self.unsorted = true;
        }
    }

    /// Fills the parking lots of every city with parked cars.
    pub fn gen_parked_cars(&mut self) {
        let size = self.params.nom_car_size();
        let (min, max) = (self.params.min_park_density, self.params.max_park_density);
        let mut cars = vec![];
        for city in 0..self.roads.num_cities() {
            let roads = self.roads.get_city(city);
            for (lot_ix, lot) in roads.parking_lots().iter().enumerate() {
                let has_parking = roads.plots().get(lot.plot_ix).map_or(true, |p| p.has_parking);
                if !has_parking {
                    continue;
                }
                let density = self.rng.gen_range(min..=max);
                cars.extend(lot.gen_parked_cars(city, lot_ix, size, density, &mut self.rng));
            }
        }
        self.add_parked_cars(cars);
    }

    /// Sorts the population into city blocks once it is in place.
    pub fn finalize_cars(&mut self) {
        self.sort_cars();
        log::info!(
            "{} moving and {} parked cars in {} blocks",
            self.num_moving(),
            self.num_parked(),
            self.car_blocks.len()
        );
    }

    /// Advances every stoplight and car by one frame.
    ///
    /// # Parameters
    /// * `time` - The frame timing
    /// * `car_speed` - The nominal car speed in world units per second
    pub fn next_frame(&mut self, time: FrameTime, car_speed: f64) {
        if time.dt <= 0.0 {
            return;
        }
        assert!(car_speed >= 0.0, "Car speed must not be negative");
        self.now = time.now;
        if self.unsorted {
            self.sort_cars();
        }

        let busy = self
            .car_blocks
            .iter()
            .filter(|b| b.first_parked > b.start)
            .map(|b| b.cur_city)
            .collect::<SmallVec<[usize; 8]>>();
        self.roads.next_frame(time.dt, |city| busy.contains(&city));

        let driver = Driver::new(&self.roads, &self.params, time, car_speed);
        driver.register_cars(&self.cars);
        let in_front = driver.find_cars_in_front(&self.cars, &self.car_blocks, &self.block_bcubes, self.max_car_len);
        for (car, front) in self.cars.iter_mut().zip(in_front) {
            car.car_in_front = front.map(|(ix, _)| ix);
            car.front_car_turn_dir = front.map_or(TurnDir::Straight, |(_, turn)| turn);
        }
        driver.update_cars(&mut self.cars, &mut self.rng);
        driver.resolve_collisions(&mut self.cars, &self.car_blocks, self.max_car_len);
        for car in self.cars.iter_mut().filter(|c| !c.is_parked() && !c.destroyed) {
            driver.update_location(car, &mut self.rng);
        }

        self.remove_destroyed_cars();
        self.sort_cars();

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Drops destroyed cars, replacing moving ones with some probability.
    fn remove_destroyed_cars(&mut self) {
        for car in &mut self.cars {
            car.car_in_front = None;
            car.front_car_turn_dir = TurnDir::Straight;
        }
        let lost = self
            .cars
            .iter()
            .filter(|c| c.destroyed && !c.is_parked())
            .count();
        self.cars.retain(|c| !c.destroyed);

        let mut num_moving = self.num_moving();
        for _ in 0..lost {
            if num_moving < self.params.num_cars
                && self.rng.gen_bool(self.params.traffic_balance_val)
                && self.add_car()
            {
                num_moving += 1;
            }
        }
    }

    /// Sorts the cars and rebuilds the city blocks.
    fn sort_cars(&mut self) {
        self.cars.sort_by(|a, b| {
            (a.cur_city, a.is_parked())
                .cmp(&(b.cur_city, b.is_parked()))
                .then(a.bcube.d[0].min.total_cmp(&b.bcube.d[0].min))
        });
        self.car_blocks.clear();
        self.block_bcubes.clear();

        let groups = self.cars.iter().enumerate().group_by(|(_, car)| car.cur_city);
        for (cur_city, group) in &groups {
            let mut start = None;
            let mut first_parked = None;
            let mut end = 0;
            let mut bcube: Option<Cube> = None;
            for (ix, car) in group {
                start.get_or_insert(ix);
                if car.is_parked() && first_parked.is_none() {
                    first_parked = Some(ix);
                }
                bcube = Some(bcube.map_or(car.bcube, |b| b.union(&car.bcube)));
                end = ix + 1;
            }
            let (Some(start), Some(bcube)) = (start, bcube) else {
                continue;
            };
            self.car_blocks.push(CarBlock {
                start,
                cur_city,
                first_parked: first_parked.unwrap_or(end),
            });
            self.block_bcubes.push(bcube);
        }
        self.max_car_len = self
            .cars
            .iter()
            .map(|c| c.get_length())
            .fold(0.0, f64::max);
        self.unsorted = false;
    }

    /// The indices of the cars in a block.
    fn block_range(&self, block: usize) -> Range<usize> {
        block_range(&self.car_blocks, self.cars.len(), block)
    }
}

/// The indices of the cars in a block.
fn block_range(blocks: &[CarBlock], num_cars: usize, block: usize) -> Range<usize> {
    let end = blocks.get(block + 1).map_or(num_cars, |b| b.start);
    blocks[block].start..end
}

/// Narrows a range of cars sorted by low x to those that may overlap `[x1, x2]`.
fn cars_in_x_range(cars: &[Car], range: Range<usize>, max_car_len: f64, x1: f64, x2: f64) -> Range<usize> {
    let slice = &cars[range.clone()];
    let lo = slice.partition_point(|c| c.bcube.d[0].min < x1 - max_car_len);
    let hi = slice.partition_point(|c| c.bcube.d[0].min <= x2);
    (range.start + lo)..(range.start + hi.max(lo))
}

/// Borrows two distinct cars mutably.
fn split_pair(cars: &mut [Car], a: usize, b: usize) -> (&mut Car, &mut Car) {
    assert_ne!(a, b, "Cannot borrow a car twice");
    if a < b {
        let (lo, hi) = cars.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = cars.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}
