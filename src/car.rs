use crate::color::{self, Color};
use crate::light;
use crate::math::{axis_vector, Cube, Point3d, Vector3d};
use crate::road::{RoadGeometry, RoadType};
use crate::util::{signed_rand_hash, Interval};
use crate::{CONN_CITY_IX, CONN_ROAD_SPEED_MULT, HEADLIGHT_ON_RAND};
use std::cell::Cell;
use std::fmt;

pub use kinematics::SpeedAction;

mod kinematics;
mod turn;

/// The number of distinct car colours.
pub const NUM_CAR_COLORS: usize = 10;

/// The car body colours, indexed by `color_id`.
pub const CAR_COLORS: [Color; NUM_CAR_COLORS] = [
    color::WHITE,
    color::GRAY_BLACK,
    color::GRAY,
    color::ORANGE,
    color::RED,
    color::DK_RED,
    color::DK_BLUE,
    color::DK_GREEN,
    color::YELLOW,
    color::BROWN,
];

/// The manoeuvre a car will make at the next intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TurnDir {
    Straight,
    Left,
    Right,
    /// Not yet decided.
    Unspec,
}

/// A car, parked or driving.
#[derive(Clone, Debug)]
pub struct Car {
    pub bcube: Cube,
    /// The box at the start of the current frame.
    pub prev_bcube: Cube,
    /// The travel dimension: 0 = x, 1 = y.
    pub dim: usize,
    /// The travel direction along `dim`; true is positive.
    pub dir: bool,
    /// The current speed as a fraction of the nominal car speed.
    pub cur_speed: f64,
    /// The speed cap as a fraction of the nominal car speed; zero when parked.
    pub max_speed: f64,
    pub height: f64,
    /// The rise of the road over the car's length, in its travel direction.
    pub dz: f64,
    pub cur_city: usize,
    pub cur_road: usize,
    /// The segment, intersection or parking lot index, depending on `cur_road_type`.
    pub cur_seg: usize,
    pub cur_road_type: RoadType,
    pub dest_city: usize,
    pub dest_isec: usize,
    pub dest_valid: bool,
    pub turn_dir: TurnDir,
    pub stopped_at_light: bool,
    /// Whether the car arrived in its city from a connector road and has not left the
    /// intersection it arrived at yet.
    pub entering_city: bool,
    pub in_tunnel: bool,
    pub destroyed: bool,
    pub color_id: usize,
    pub model_id: usize,
    /// The coordinate along `dim` where the car started waiting.
    pub waiting_pos: f64,
    /// The time the car started waiting, in s.
    pub waiting_start: f64,
    /// The index of the car ahead, valid for the current frame only.
    pub(crate) car_in_front: Option<usize>,
    /// The turn after which the car ahead was found; `Straight` if it is on the current path.
    pub(crate) front_car_turn_dir: TurnDir,
    /// The coordinate the front of the car must not pass this frame.
    pub(crate) stop_pos: Option<f64>,
    /// The most severe speed action requested this frame.
    action: Cell<SpeedAction>,
}

impl Car {
    /// Creates a car with the given box and direction of travel.
    /// A `max_speed` of zero creates a parked car.
    pub fn new(bcube: Cube, dim: usize, dir: bool, max_speed: f64) -> Self {
        assert!(dim < 2, "Car dimension out of range: {}", dim);
        assert!(max_speed >= 0.0, "Max speed must not be negative");
        Self {
            bcube,
            prev_bcube: bcube,
            dim,
            dir,
            cur_speed: 0.0,
            max_speed,
            height: bcube.size(2),
            dz: 0.0,
            cur_city: 0,
            cur_road: 0,
            cur_seg: 0,
            cur_road_type: RoadType::Seg,
            dest_city: 0,
            dest_isec: 0,
            dest_valid: false,
            turn_dir: TurnDir::Unspec,
            stopped_at_light: false,
            entering_city: false,
            in_tunnel: false,
            destroyed: false,
            color_id: 0,
            model_id: 0,
            waiting_pos: bcube.d[dim].midpoint(),
            waiting_start: 0.0,
            car_in_front: None,
            front_car_turn_dir: TurnDir::Straight,
            stop_pos: None,
            action: Cell::new(SpeedAction::Accelerate),
        }
    }

    /// A car with a degenerate box must never be updated or drawn.
    pub fn is_valid(&self) -> bool {
        !self.bcube.is_all_zeros()
    }

    pub fn get_center(&self) -> Point3d {
        self.bcube.center()
    }

    /// The travel orientation: `2 * dim + dir`.
    pub fn get_orient(&self) -> usize {
        light::orient(self.dim, self.dir)
    }

    /// The side of the current intersection the car entered through.
    pub fn get_orient_in_isec(&self) -> usize {
        assert!(self.in_isect(), "Car is not in an intersection");
        self.get_orient() ^ 1
    }

    /// The speed cap, raised on the connector network.
    pub fn get_max_speed(&self) -> f64 {
        if self.cur_city == CONN_CITY_IX {
            CONN_ROAD_SPEED_MULT * self.max_speed
        } else {
            self.max_speed
        }
    }

    pub fn get_length(&self) -> f64 {
        self.bcube.size(self.dim)
    }

    pub fn get_width(&self) -> f64 {
        self.bcube.size(1 - self.dim)
    }

    /// The coordinate of the front bumper along `dim`.
    pub fn front_pos(&self) -> f64 {
        self.bcube.d[self.dim].end(self.dir)
    }

    /// The coordinate of the rear bumper along `dim`.
    pub fn rear_pos(&self) -> f64 {
        self.bcube.d[self.dim].end(!self.dir)
    }

    /// The centre of the front bumper.
    pub fn get_front(&self) -> Point3d {
        let mut p = self.get_center();
        p[self.dim] = self.front_pos();
        p
    }

    pub fn is_almost_stopped(&self) -> bool {
        self.cur_speed < 0.1 * self.max_speed
    }

    pub fn is_stopped(&self) -> bool {
        self.cur_speed == 0.0
    }

    pub fn is_parked(&self) -> bool {
        self.max_speed == 0.0
    }

    pub fn in_isect(&self) -> bool {
        self.cur_road_type.is_isect()
    }

    /// The intersection degree class: 0 for a bend, 1 for a T, 2 for a crossroads.
    pub fn get_isec_type(&self) -> usize {
        match self.cur_road_type {
            RoadType::Isec2 => 0,
            RoadType::Isec3 => 1,
            RoadType::Isec4 => 2,
            _ => panic!("Car is not in an intersection"),
        }
    }

    /// How long the car has been waiting, in s.
    pub fn get_wait_time_secs(&self, now: f64) -> f64 {
        if self.is_almost_stopped() {
            (now - self.waiting_start).max(0.0)
        } else {
            0.0
        }
    }

    pub fn get_color(&self) -> Color {
        assert!(self.color_id < NUM_CAR_COLORS, "Car colour out of range: {}", self.color_id);
        CAR_COLORS[self.color_id]
    }

    /// Whether the car's headlights are on at the given daylight level in `[0, 1]`.
    /// The threshold is jittered per car so cars don't all switch at once.
    pub fn headlights_on(&self, daylight: f64) -> bool {
        if self.is_parked() {
            return false;
        }
        self.in_tunnel
            || daylight < 0.5 + HEADLIGHT_ON_RAND * signed_rand_hash(self.height + self.max_speed)
    }

    /// Scales the car about the centre of its base.
    pub fn apply_scale(&mut self, scale: f64) {
        assert!(scale > 0.0, "Car scale must be positive");
        let c = self.get_center();
        for dim in 0..2 {
            let half = 0.5 * scale * self.bcube.size(dim);
            self.bcube.d[dim] = Interval::disc(c[dim], half);
        }
        self.height *= scale;
        self.bcube.d[2] = Interval::new(self.bcube.z1(), self.bcube.z1() + self.height);
        self.prev_bcube = self.bcube;
    }

    /// Marks the car for removal at the end of the frame.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            log::debug!("destroying {}", self);
        }
        self.destroyed = true;
    }

    /// Whether the front bumper is inside the other car.
    pub fn front_intersects_car(&self, other: &Car) -> bool {
        let mut front = self.bcube;
        let len = self.get_length();
        front.d[self.dim] = if self.dir {
            Interval::new(front.d[self.dim].max - 0.25 * len, front.d[self.dim].max)
        } else {
            Interval::new(front.d[self.dim].min, front.d[self.dim].min + 0.25 * len)
        };
        front.intersects_xy(&other.bcube)
    }

    /// Pushes a sphere out of the car; returns the collision normal if they touched.
    pub fn proc_sphere_coll(&self, pos: &mut Point3d, p_last: Point3d, radius: f64) -> Option<Vector3d> {
        self.bcube.sphere_push_out(pos, p_last, radius)
    }

    /// Resolves a collision between two moving cars. Returns true if they were in conflict.
    ///
    /// Cars in the same lane are kept apart by pushing the rear car back and matching its
    /// speed to the car ahead. Cars on crossing paths are resolved by sending the car that
    /// drove into the other back to where it was at the start of the frame.
    pub fn check_collision(&mut self, other: &mut Car, road_gen: &dyn RoadGeometry) -> bool {
        if self.destroyed || other.destroyed || !self.same_level(other) {
            return false;
        }
        if self.dim != other.dim {
            if !self.bcube.intersects_xy(&other.bcube) {
                return false;
            }
            if self.front_intersects_car(other) {
                self.bcube = self.prev_bcube;
                self.stop();
            } else if other.front_intersects_car(self) {
                other.bcube = other.prev_bcube;
                other.stop();
            }
            return true;
        }
        // Opposite lanes never collide
        if self.dir != other.dir {
            return false;
        }
        let dim = self.dim;
        if !self.bcube.d[1 - dim].overlaps(&other.bcube.d[1 - dim]) {
            return false;
        }
        let self_ahead = (self.get_center()[dim] > other.get_center()[dim]) == self.dir;
        let (front, rear): (&Car, &mut Car) = if self_ahead {
            (&*self, &mut *other)
        } else {
            (&*other, &mut *self)
        };
        let sep = 0.999 * rear.get_min_sep_dist_to_car(front, false);
        let gap = rear.gap_to(front);
        if gap >= sep {
            return false;
        }
        rear.cur_speed = front.cur_speed.min(rear.get_max_speed());

        let moved = (rear.bcube.d[dim].min - rear.prev_bcube.d[dim].min).abs();
        let push = (sep - gap).min(moved).max(-gap);
        if push > 0.0 {
            rear.bcube.translate_dim(dim, if rear.dir { -push } else { push });
            let bound = road_gen.get_bcube_for_car(rear);
            if !bound.is_all_zeros() {
                let c = rear.get_center()[dim];
                rear.bcube.translate_dim(dim, bound.d[dim].clamp(c) - c);
            }
        }
        true
    }

    /// Whether the other car is on the same level as this one, rather than on a road above or below.
    /// Cars on a graded road sit at the height of the road under their centres, so the allowed
    /// height difference grows with the grade and the distance between them.
    pub fn same_level(&self, other: &Car) -> bool {
        let grade = f64::max(self.dz.abs() / self.get_length(), other.dz.abs() / other.get_length());
        let d = self.get_center() - other.get_center();
        let slack = grade * d.x.hypot(d.y);
        self.bcube.d[2].expand(slack).overlaps(&other.bcube.d[2])
    }

    /// Starts the wait timer at `now`, from the current position.
    pub(crate) fn start_waiting(&mut self, now: f64) {
        self.waiting_pos = self.get_center()[self.dim];
        self.waiting_start = now;
    }

    /// The distance this car can travel before reaching the car ahead.
    pub(crate) fn gap_to_car_in_front(&self, front: &Car) -> f64 {
        match self.front_car_turn_dir {
            TurnDir::Left | TurnDir::Right => self.gap_after_turn(front),
            _ => self.gap_to(front),
        }
    }

    /// The distance to the rear of a car on the lane this car is about to turn onto.
    /// The car turns when its centre reaches the centre of that lane.
    pub fn gap_after_turn(&self, front: &Car) -> f64 {
        let to_turn = (front.get_center()[self.dim] - self.get_center()[self.dim]).abs();
        let half_len = 0.5 * self.get_length();
        let c = self.get_center()[front.dim];
        let front_after = if front.dir { c + half_len } else { c - half_len };
        let ahead = if front.dir {
            front.rear_pos() - front_after
        } else {
            front_after - front.rear_pos()
        };
        to_turn + ahead
    }

    /// The bumper-to-bumper distance to a car ahead, along this car's travel dimension.
    pub fn gap_to(&self, front: &Car) -> f64 {
        let their = front.bcube.d[self.dim];
        if self.dir {
            their.min - self.bcube.d[self.dim].max
        } else {
            self.bcube.d[self.dim].min - their.max
        }
    }

    /// Moves the car onto a new travel dimension and direction, keeping its centre.
    pub(crate) fn set_travel(&mut self, dim: usize, dir: bool, lane_coord: f64) {
        let (len, wid) = (self.get_length(), self.get_width());
        let c = self.get_center();
        self.bcube.d[dim] = Interval::disc(c[dim], 0.5 * len);
        self.bcube.d[1 - dim] = Interval::disc(lane_coord, 0.5 * wid);
        self.dim = dim;
        self.dir = dir;
        self.prev_bcube = self.bcube;
    }

    /// The unit vector of the direction of travel.
    pub fn travel_vector(&self) -> Vector3d {
        axis_vector(self.dim, self.dir)
    }
}

impl fmt::Display for Car {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let city = if self.cur_city == CONN_CITY_IX {
            "conn".to_string()
        } else {
            self.cur_city.to_string()
        };
        write!(
            f,
            "car at {:?} city {} road {} seg {} {:?} orient {} speed {:.3}/{:.3} turn {:?}",
            self.get_center(),
            city,
            self.cur_road,
            self.cur_seg,
            self.cur_road_type,
            self.get_orient(),
            self.cur_speed,
            self.get_max_speed(),
            self.turn_dir,
        )?;
        if self.stopped_at_light {
            write!(f, " stopped at light")?;
        }
        if self.dest_valid {
            write!(f, " dest {}:{}", self.dest_city, self.dest_isec)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// A car of length 1 and width 0.5 in the eastbound lane, with its rear at `x`.
    pub fn car_at(x: f64, max_speed: f64) -> Car {
        let bcube = Cube::from_points(Point3d::new(x, -0.5, 0.0), Point3d::new(x + 1.0, 0.0, 0.4));
        Car::new(bcube, 0, true, max_speed)
    }

    struct OpenRoad;

    impl RoadGeometry for OpenRoad {
        fn get_bcube_for_car(&self, _car: &Car) -> Cube {
            Cube::from_points(Point3d::new(-100.0, -1.0, 0.0), Point3d::new(100.0, 1.0, 1.0))
        }
    }

    #[test]
    fn parked_car_invariants() {
        let car = car_at(0.0, 0.0);
        assert!(car.is_parked());
        assert!(car.is_stopped());
        assert!(!car.headlights_on(0.0));
        assert!(!Car::new(Cube::all_zeros(), 0, true, 1.0).is_valid());
    }

    #[test]
    fn connector_doubles_max_speed() {
        let mut car = car_at(0.0, 1.0);
        assert_eq!(car.get_max_speed(), 1.0);
        car.cur_city = CONN_CITY_IX;
        assert_eq!(car.get_max_speed(), 2.0);
    }

    #[test]
    fn headlights_are_stable() {
        let mut car = car_at(0.0, 1.0);
        assert!(car.headlights_on(0.0));
        assert!(!car.headlights_on(1.0));
        let on = car.headlights_on(0.5);
        for _ in 0..10 {
            assert_eq!(car.headlights_on(0.5), on);
        }
        car.in_tunnel = true;
        assert!(car.headlights_on(1.0));
    }

    #[test]
    fn scale_keeps_base() {
        let mut car = car_at(0.0, 1.0);
        car.apply_scale(1.2);
        assert_approx_eq!(car.get_length(), 1.2);
        assert_approx_eq!(car.get_width(), 0.6);
        assert_approx_eq!(car.bcube.z1(), 0.0);
        assert_approx_eq!(car.height, 0.48);
        assert_approx_eq!(car.get_center().x, 0.5);
    }

    #[test]
    fn rear_car_is_pushed_back_and_slowed() {
        let mut front = car_at(1.1, 1.0);
        let mut rear = car_at(0.0, 1.0);
        rear.prev_bcube.translate_dim(0, -0.2);
        rear.cur_speed = 1.0;
        front.cur_speed = 0.0;

        assert!(rear.check_collision(&mut front, &OpenRoad));
        assert_eq!(rear.cur_speed, 0.0);
        // Pushed back by at most the distance moved this frame
        assert_approx_eq!(rear.bcube.d[0].min, -0.2);
        assert_approx_eq!(front.bcube.d[0].min, 1.1);
    }

    #[test]
    fn overlapping_rear_car_leaves_overlap() {
        let mut front = car_at(0.5, 1.0);
        let mut rear = car_at(0.0, 1.0);
        rear.prev_bcube = rear.bcube;
        // The front car is passed first; the rear car is still found
        assert!(front.check_collision(&mut rear, &OpenRoad));
        assert!(rear.gap_to(&front) >= -1e-9);
    }

    #[test]
    fn opposite_lanes_never_collide() {
        let mut a = car_at(0.0, 1.0);
        let mut b = car_at(0.2, 1.0);
        b.dir = false;
        assert!(!a.check_collision(&mut b, &OpenRoad));
    }

    #[test]
    fn crossing_car_that_hit_is_sent_back() {
        let mut eastbound = car_at(0.0, 1.0);
        eastbound.prev_bcube.translate_dim(0, -0.3);
        eastbound.cur_speed = 1.0;
        let nb = Cube::from_points(Point3d::new(0.9, -1.0, 0.0), Point3d::new(1.4, 0.5, 0.4));
        let mut northbound = Car::new(nb, 1, true, 1.0);
        northbound.cur_speed = 1.0;

        assert!(eastbound.check_collision(&mut northbound, &OpenRoad));
        assert_eq!(eastbound.bcube, eastbound.prev_bcube);
        assert!(eastbound.is_stopped());
        assert_eq!(northbound.cur_speed, 1.0);
    }

    #[test]
    fn turning_swaps_extents() {
        let mut car = car_at(0.0, 1.0);
        car.set_travel(1, false, 0.25);
        assert_eq!(car.get_orient(), 2);
        assert_approx_eq!(car.get_length(), 1.0);
        assert_approx_eq!(car.get_width(), 0.5);
        assert_approx_eq!(car.get_center().x, 0.25);
        assert_approx_eq!(car.get_center().y, -0.25);
        assert_approx_eq!(car.front_pos(), -0.75);
    }

    /// A car of length 1 on a road rising by `grade` per unit length to the east, with its rear at `x`.
    fn car_on_grade(x: f64, grade: f64) -> Car {
        let mut car = car_at(x, 1.0);
        let z = grade * car.get_center().x;
        car.bcube.d[2] = Interval::new(z, z + car.height);
        car.dz = grade * car.get_length();
        car
    }

    #[test]
    fn cars_on_a_grade_share_a_level() {
        let (rear, front) = (car_on_grade(0.0, 0.4), car_on_grade(1.5, 0.4));
        assert!(!rear.bcube.d[2].overlaps(&front.bcube.d[2]));
        assert!(rear.same_level(&front));
        assert!(front.same_level(&rear));

        // A flat road passing over another
        let mut above = car_at(1.5, 1.0);
        above.bcube.translate_dim(2, 0.6);
        assert!(!car_at(0.0, 1.0).same_level(&above));
    }

    #[test]
    fn rear_car_on_a_grade_is_pushed_back() {
        let mut front = car_on_grade(1.1, 0.4);
        let mut rear = car_on_grade(0.0, 0.4);
        rear.prev_bcube.translate_dim(0, -0.2);
        rear.cur_speed = 1.0;
        front.cur_speed = 0.5;

        assert!(rear.check_collision(&mut front, &OpenRoad));
        assert_eq!(rear.cur_speed, 0.5);
        assert_approx_eq!(rear.bcube.d[0].min, -0.2);
    }

    #[test]
    fn gap_after_turn_follows_path() {
        // Eastbound, turning right onto a southbound lane centred on x = 3
        let car = car_at(0.0, 1.0);
        let sb = Cube::from_points(Point3d::new(2.75, -3.0, 0.0), Point3d::new(3.25, -2.0, 0.4));
        let front = Car::new(sb, 1, false, 1.0);
        // 2.5 to the turn, then from y = -0.75 down to the rear bumper at y = -2
        assert_approx_eq!(car.gap_after_turn(&front), 3.75);

        let mut car = car;
        car.front_car_turn_dir = TurnDir::Right;
        assert_approx_eq!(car.gap_to_car_in_front(&front), 3.75);
        car.front_car_turn_dir = TurnDir::Straight;
        assert_approx_eq!(car.gap_to_car_in_front(&front), car.gap_to(&front));
    }
}
