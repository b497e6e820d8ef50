use super::{cars_in_x_range, split_pair, CarBlock};
use crate::car::{Car, SpeedAction, TurnDir};
use crate::debug::{debug_box, debug_line};
use crate::math::Cube;
use crate::params::TrafficParams;
use crate::road::{turn_for_exit, Intersection, RoadNetwork, RoadType, SegLink};
use crate::util::Interval;
use crate::{FrameTime, CONN_CITY_IX};
use rand::seq::SliceRandom;
use rand::Rng;
use smallvec::SmallVec;

/// How close to the stop line counts as being at it, in car lengths.
const STOP_LINE_EPS: f64 = 0.01;

/// The per-frame decision and movement logic for cars.
pub(super) struct Driver<'a> {
    roads: &'a RoadNetwork,
    params: &'a TrafficParams,
    time: FrameTime,
    /// The nominal car speed in world units per second.
    car_speed: f64,
}

impl<'a> Driver<'a> {
    pub fn new(roads: &'a RoadNetwork, params: &'a TrafficParams, time: FrameTime, car_speed: f64) -> Self {
        Self {
            roads,
            params,
            time,
            car_speed,
        }
    }

    /// Counts the cars on each segment and marks the intersections cars are crossing.
    pub fn register_cars(&self, cars: &[Car]) {
        for car in cars.iter().filter(|c| !c.is_parked() && !c.destroyed) {
            match car.cur_road_type {
                RoadType::Seg => {
                    self.roads.seg_for_car(car).register_car();
                    // A car whose front has crossed the stop line is already in the way
                    if let Some((_, _, isec)) = self.isec_ahead(car) {
                        let line = isec.stop_line(car.dim, car.dir);
                        if dist_to_line(car, line) < -STOP_LINE_EPS * car.get_length() {
                            isec.mark_crossing(car);
                        }
                    }
                }
                t if t.is_isect() => self.roads.isec_for_car(car).mark_crossing(car),
                _ => {}
            }
        }
    }

    /// Finds the nearest car ahead of each moving car, within its lookahead distance.
    /// A car about to turn also looks along the lane it is turning onto; such a car in front
    /// is returned with the turn it lies beyond.
    pub fn find_cars_in_front(
        &self,
        cars: &[Car],
        blocks: &[CarBlock],
        block_bcubes: &[Cube],
        max_car_len: f64,
    ) -> Vec<Option<(usize, TurnDir)>> {
        let mut in_front = vec![None; cars.len()];
        for (ix, car) in cars.iter().enumerate() {
            if car.is_parked() || car.destroyed {
                continue;
            }
            let (dim, front) = (car.dim, car.front_pos());
            let look = car.get_max_lookahead_dist(self.car_speed);
            let mut area = car.bcube;
            area.d[dim] = if car.dir {
                Interval::new(front, front + look)
            } else {
                Interval::new(front - look, front)
            };
            area.d[1 - dim] = area.d[1 - dim].expand(-0.1 * car.get_width());

            let mut best: Option<(usize, f64, TurnDir)> = None;
            for other_ix in moving_cars_in(cars, blocks, block_bcubes, max_car_len, area) {
                let other = &cars[other_ix];
                if other_ix == ix || !car.same_level(other) {
                    continue;
                }
                if other.dim == dim && other.dir != car.dir {
                    continue;
                }
                let gap = car.gap_to(other);
                if best.map_or(true, |(_, g, _)| gap < g) {
                    best = Some((other_ix, gap, TurnDir::Straight));
                }
            }
            if let Some((other_ix, gap)) = self.find_car_after_turn(car, ix, cars, blocks, block_bcubes, max_car_len) {
                if best.map_or(true, |(_, g, _)| gap < g) {
                    best = Some((other_ix, gap, car.turn_dir));
                }
            }
            if let Some((other_ix, _, _)) = best {
                debug_line("car_in_front", car.get_center(), cars[other_ix].get_center());
            }
            in_front[ix] = best.map(|(other_ix, _, turn)| (other_ix, turn));
        }
        in_front
    }

    /// Finds the nearest car on the lane a turning car is about to turn onto, with the
    /// distance the car can travel before reaching it.
    fn find_car_after_turn(
        &self,
        car: &Car,
        ix: usize,
        cars: &[Car],
        blocks: &[CarBlock],
        block_bcubes: &[Cube],
        max_car_len: f64,
    ) -> Option<(usize, f64)> {
        if !matches!(car.turn_dir, TurnDir::Left | TurnDir::Right) {
            return None;
        }
        let isec = match car.cur_road_type {
            RoadType::Seg => self.isec_ahead(car)?.2,
            t if t.is_isect() => self.roads.isec_for_car(car),
            _ => return None,
        };
        let exit = isec.get_dest_orient_for_car_in_isec(car);
        let (exit_dim, exit_dir) = (exit >> 1, exit & 1 == 1);
        let turn_at = isec.lane_coord(exit);
        let to_turn = (turn_at - car.get_center()[car.dim]).abs();
        let lookahead = car.get_max_lookahead_dist(self.car_speed);
        if to_turn > lookahead {
            return None;
        }
        // Far enough to see whether the car will fit past the intersection
        let look = f64::max(lookahead - to_turn, 2.0 * car.get_length());

        let c = car.get_center()[exit_dim];
        let half_len = 0.5 * car.get_length();
        let mut area = car.bcube;
        area.d[exit_dim] = if exit_dir {
            Interval::new(c + half_len, c + half_len + look)
        } else {
            Interval::new(c - half_len - look, c - half_len)
        };
        area.d[car.dim] = Interval::disc(turn_at, 0.4 * car.get_width());

        moving_cars_in(cars, blocks, block_bcubes, max_car_len, area)
            .filter(|other_ix| {
                let other = &cars[*other_ix];
                *other_ix != ix && other.dim == exit_dim && other.dir == exit_dir && car.same_level(other)
            })
            .map(|other_ix| (other_ix, car.gap_after_turn(&cars[other_ix])))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Decides the speed of every moving car and moves it.
    pub fn update_cars<R: Rng>(&self, cars: &mut [Car], rng: &mut R) {
        for ix in 0..cars.len() {
            if cars[ix].is_parked() || cars[ix].destroyed {
                continue;
            }
            let (car, front) = match cars[ix].car_in_front {
                Some(front_ix) => {
                    let (car, front) = split_pair(cars, ix, front_ix);
                    (car, Some(&*front))
                }
                None => (&mut cars[ix], None),
            };
            self.drive_car(car, front, rng);
        }
    }

    fn drive_car<R: Rng>(&self, car: &mut Car, front: Option<&Car>, rng: &mut R) {
        car.prev_bcube = car.bcube;
        car.stop_pos = None;
        car.reset_action();
        if car.cur_road_type == RoadType::Seg {
            self.approach_isec(car, front, rng);
        }
        if let Some(front) = front {
            car.follow(front);
        }
        car.apply_action(self.time.dt);
        car.move_car(car.cur_speed * self.car_speed * self.time.dt, self.time.now);
        self.place_on_road(car);
    }

    /// Holds the car at the stop line of the intersection ahead until it may enter.
    fn approach_isec<R: Rng>(&self, car: &mut Car, front: Option<&Car>, rng: &mut R) {
        let Some((city, isec_ix, isec)) = self.isec_ahead(car) else {
            car.stopped_at_light = false;
            return;
        };
        if car.turn_dir == TurnDir::Unspec {
            self.choose_turn_dir(car, city, isec_ix, rng);
        }
        let line = isec.stop_line(car.dim, car.dir);
        let dist = dist_to_line(car, line);
        let len = car.get_length();
        if dist > car.get_max_lookahead_dist(self.car_speed) || dist < -STOP_LINE_EPS * len {
            return;
        }

        let mut go = isec.can_go_now(car)
            && self.exit_has_room(car, city, isec_ix)
            && exit_lane_clear(car, front, isec);
        // Run a yellow only when the car can't stop before the line
        if go
            && !car.stopped_at_light
            && isec.yellow_light(car)
            && car.get_stopping_dist(self.car_speed) < dist
        {
            go = false;
        }
        if go {
            car.stopped_at_light = false;
            return;
        }

        car.stop_pos = Some(line);
        let action = if dist <= STOP_LINE_EPS * len {
            if dist > 0.0 {
                car.bcube.translate_dim(car.dim, if car.dir { dist } else { -dist });
            }
            car.stopped_at_light = true;
            SpeedAction::Stop
        } else if car.is_almost_stopped() {
            // Creep up to the line; the move stops at it
            SpeedAction::Accelerate
        } else if dist < car.get_stopping_dist(self.car_speed) + 0.25 * len {
            if dist < 0.5 * len {
                SpeedAction::DecelerateFast
            } else {
                SpeedAction::Decelerate
            }
        } else {
            SpeedAction::Cruise
        };
        car.request(action);
        if car.is_almost_stopped() {
            isec.notify_waiting_car(car);
        }
    }

    /// Whether the segment the car will turn onto has room for it.
    fn exit_has_room(&self, car: &Car, city: usize, isec_ix: usize) -> bool {
        let exit = self.roads.get_city(city).get_isec(isec_ix).get_dest_orient_for_car_in_isec(car);
        match self.roads.exit_seg(city, isec_ix, exit) {
            Some((exit_city, _, seg)) => self
                .roads
                .get_city(exit_city)
                .get_seg(seg)
                .has_room_for(car.get_length()),
            None => true,
        }
    }

    /// The intersection at the end of the segment the car is on, with its city and index.
    fn isec_ahead(&self, car: &Car) -> Option<(usize, usize, &'a Intersection)> {
        let seg = self.roads.seg_for_car(car);
        let (city, ix) = match seg.ends[car.dir as usize] {
            SegLink::Isec(ix) => (car.cur_city, ix),
            SegLink::CityIsec { city, isec } => (city, isec),
            SegLink::None | SegLink::Seg(_) => return None,
        };
        Some((city, ix, self.roads.get_city(city).get_isec(ix)))
    }

    /// Resolves the turn at the intersection ahead, following the car's route when it has one.
    fn choose_turn_dir<R: Rng>(&self, car: &mut Car, city: usize, isec_ix: usize, rng: &mut R) {
        let isec = self.roads.get_city(city).get_isec(isec_ix);
        if self.params.enable_car_path_finding {
            if !car.dest_valid {
                self.choose_destination(car, rng);
            }
            if let Some(turn) = self.preferred_turn(car, city, isec_ix, rng) {
                if isec.is_orient_currently_valid(car.get_orient(), turn) {
                    log::trace!("car routed {:?} at {}:{}", turn, city, isec_ix);
                    car.turn_dir = turn;
                    return;
                }
            }
        }
        car.on_alternate_turn_dir(isec, rng);
    }

    /// The turn at intersection `isec_ix` of `city` leading towards the car's destination.
    fn preferred_turn<R: Rng>(&self, car: &mut Car, city: usize, isec_ix: usize, rng: &mut R) -> Option<TurnDir> {
        if !car.dest_valid || city == CONN_CITY_IX {
            return None;
        }
        let roads = self.roads.get_city(city);
        let exit = if car.dest_city == city {
            if car.dest_isec == isec_ix {
                log::debug!("car reached destination {}:{}", city, isec_ix);
                car.dest_valid = false;
                self.choose_destination(car, rng);
                return None;
            }
            roads.next_exit_towards(isec_ix, car.dest_isec)?
        } else {
            let conn_isec = roads.find_conn_isec(car.dest_city)?;
            if conn_isec == isec_ix {
                roads.get_isec(isec_ix).global_side()?
            } else {
                roads.next_exit_towards(isec_ix, conn_isec)?
            }
        };
        turn_for_exit(car.get_orient(), exit)
    }

    /// Picks a new destination intersection, in another city with probability `new_city_prob`.
    pub fn choose_destination<R: Rng>(&self, car: &mut Car, rng: &mut R) {
        let num_cities = self.roads.num_cities();
        if num_cities == 0 {
            return;
        }
        let on_conn = car.cur_city == CONN_CITY_IX;
        let home = if on_conn {
            rng.gen_range(0..num_cities)
        } else {
            car.cur_city
        };
        let mut dest_city = home;
        if num_cities > 1 && rng.gen_bool(self.params.new_city_prob) {
            let reachable = (0..num_cities)
                .filter(|c| *c != home)
                .filter(|c| on_conn || self.roads.get_city(home).find_conn_isec(*c).is_some())
                .collect::<SmallVec<[usize; 8]>>();
            dest_city = reachable.choose(rng).copied().unwrap_or(home);
        }
        let num_isecs = self.roads.get_city(dest_city).isecs().len();
        if num_isecs == 0 {
            car.dest_valid = false;
            return;
        }
        car.dest_city = dest_city;
        car.dest_isec = rng.gen_range(0..num_isecs);
        car.dest_valid = true;
        log::debug!("car heading to {}:{}", car.dest_city, car.dest_isec);
    }

    /// Resolves collisions between nearby moving cars.
    pub fn resolve_collisions(&self, cars: &mut [Car], blocks: &[CarBlock], max_car_len: f64) {
        let margin = 4.0 * max_car_len;
        for block in blocks {
            let moving = block.start..block.first_parked;
            for i in moving.clone() {
                for j in (i + 1)..moving.end {
                    if cars[j].bcube.d[0].min > cars[i].bcube.d[0].max + margin {
                        break;
                    }
                    self.check_pair(cars, i, j);
                }
            }
        }

        // Cars arriving from a connector road may still overlap cars behind them on it
        let Some(conn) = blocks.iter().position(|b| b.cur_city == CONN_CITY_IX) else {
            return;
        };
        let conn_moving = blocks[conn].start..blocks[conn].first_parked;
        for i in 0..cars.len() {
            if !cars[i].entering_city || cars[i].destroyed || cars[i].cur_city == CONN_CITY_IX {
                continue;
            }
            let x = cars[i].bcube.d[0].expand(margin);
            for j in cars_in_x_range(cars, conn_moving.clone(), max_car_len, x.min, x.max) {
                self.check_pair(cars, i, j);
            }
        }
    }

    fn check_pair(&self, cars: &mut [Car], i: usize, j: usize) {
        let (a, b) = split_pair(cars, i, j);
        if a.is_parked() || b.is_parked() {
            return;
        }
        if a.check_collision(b, self.roads) {
            debug_box("collision", &a.bcube.union(&b.bcube));
        }
    }

    /// Moves the car onto the next segment or intersection once its centre has crossed over.
    pub fn update_location<R: Rng>(&self, car: &mut Car, rng: &mut R) {
        match car.cur_road_type {
            RoadType::Seg => self.update_seg_location(car, rng),
            t if t.is_isect() => self.update_isec_location(car),
            _ => {}
        }
        if !car.destroyed {
            self.place_on_road(car);
        }
    }

    fn update_seg_location<R: Rng>(&self, car: &mut Car, rng: &mut R) {
        let seg = self.roads.seg_for_car(car);
        let end = seg.road.bcube.d[car.dim].end(car.dir);
        if !passed(car, end) {
            return;
        }
        match seg.ends[car.dir as usize] {
            SegLink::None => {
                log::debug!("{} reached a dead end", car);
                car.destroy();
            }
            SegLink::Seg(next) => {
                car.cur_road = self.roads.get_city(car.cur_city).get_seg(next).road_ix;
                car.cur_seg = next;
            }
            SegLink::Isec(ix) => self.enter_isec(car, car.cur_city, ix, rng),
            SegLink::CityIsec { city, isec } => {
                log::debug!("car entering city {}", city);
                car.cur_city = city;
                car.entering_city = true;
                self.enter_isec(car, city, isec, rng);
            }
        }
    }

    fn enter_isec<R: Rng>(&self, car: &mut Car, city: usize, ix: usize, rng: &mut R) {
        let isec = self.roads.get_city(city).get_isec(ix);
        if car.turn_dir == TurnDir::Unspec {
            car.on_alternate_turn_dir(isec, rng);
        }
        car.cur_road = ix;
        car.cur_seg = ix;
        car.cur_road_type = isec.road_type();
        car.stopped_at_light = false;
    }

    fn update_isec_location(&self, car: &mut Car) {
        let isec = self.roads.isec_for_car(car);
        if matches!(car.turn_dir, TurnDir::Left | TurnDir::Right) {
            let dest = isec.get_dest_orient_for_car_in_isec(car);
            let lane = isec.lane_coord(dest);
            if passed(car, lane) {
                car.set_travel(dest >> 1, dest & 1 == 1, lane);
                car.turn_dir = TurnDir::Straight;
            }
            return;
        }
        let face = isec.bcube.d[car.dim].end(car.dir);
        if !passed(car, face) {
            return;
        }
        match self.roads.exit_seg(car.cur_city, car.cur_seg, car.get_orient()) {
            None => {
                log::debug!("{} left through a missing side", car);
                car.destroy();
            }
            Some((city, road, seg)) => {
                if city != car.cur_city {
                    log::debug!("car leaving city {} for the connector network", car.cur_city);
                }
                car.cur_city = city;
                car.cur_road = road;
                car.cur_seg = seg;
                car.cur_road_type = RoadType::Seg;
                car.turn_dir = TurnDir::Unspec;
                car.entering_city = false;
                car.stopped_at_light = false;
            }
        }
    }

    /// Sets the car's elevation, grade and tunnel flag from the road under it.
    pub fn place_on_road(&self, car: &mut Car) {
        match car.cur_road_type {
            RoadType::Seg => {
                let road = &self.roads.seg_for_car(car).road;
                let z = road.z_at(car.get_center()[road.dim]);
                car.bcube.d[2] = Interval::new(z, z + car.height);
                let sign = if car.dir { 1.0 } else { -1.0 };
                car.dz = sign * road.grade() * car.get_length();
            }
            t if t.is_isect() => {
                let z = self.roads.isec_for_car(car).bcube.z1();
                car.bcube.d[2] = Interval::new(z, z + car.height);
                car.dz = 0.0;
            }
            _ => {}
        }
        car.in_tunnel =
            car.cur_city == CONN_CITY_IX && self.roads.conn_roads().in_tunnel(car.get_center());
    }
}

/// The live moving cars whose boxes overlap `area` in x and y.
fn moving_cars_in<'c>(
    cars: &'c [Car],
    blocks: &'c [CarBlock],
    block_bcubes: &'c [Cube],
    max_car_len: f64,
    area: Cube,
) -> impl Iterator<Item = usize> + 'c {
    block_bcubes
        .iter()
        .enumerate()
        .filter(move |(_, bcube)| bcube.intersects_xy(&area))
        .flat_map(move |(b, _)| {
            let moving = blocks[b].start..blocks[b].first_parked;
            cars_in_x_range(cars, moving, max_car_len, area.d[0].min, area.d[0].max)
        })
        .filter(move |ix| !cars[*ix].destroyed && cars[*ix].bcube.intersects_xy(&area))
}

/// Whether a turning car would fit on its exit lane ahead of the car found there.
fn exit_lane_clear(car: &Car, front: Option<&Car>, isec: &Intersection) -> bool {
    let Some(front) = front else {
        return true;
    };
    if !matches!(car.front_car_turn_dir, TurnDir::Left | TurnDir::Right) {
        return true;
    }
    let face = isec.bcube.d[front.dim].end(front.dir);
    let room = if front.dir {
        front.rear_pos() - face
    } else {
        face - front.rear_pos()
    };
    room >= car.get_length() + car.get_min_sep_dist_to_car(front, false)
}

/// The distance from the car's front bumper to a line across its path; negative once past it.
fn dist_to_line(car: &Car, line: f64) -> f64 {
    if car.dir {
        line - car.front_pos()
    } else {
        car.front_pos() - line
    }
}

/// Whether the car's centre has crossed the coordinate `pos` along its path.
fn passed(car: &Car, pos: f64) -> bool {
    let c = car.get_center()[car.dim];
    if car.dir {
        c > pos
    } else {
        c < pos
    }
}
