use super::{lane_offset_sign, RoadType};
use crate::car::{Car, TurnDir};
use crate::light::{self, LightState, Stoplight, StoplightTiming, OTHER_LANE, TO_LEFT, TO_RIGHT};
use crate::math::Cube;
use arrayvec::ArrayVec;

/// What one side of an intersection connects to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsecLink {
    None,
    /// A segment of the same network.
    Local { road: usize, seg: usize },
    /// A segment of the connector network.
    Global { road: usize, seg: usize },
}

impl IsecLink {
    pub fn is_none(&self) -> bool {
        *self == IsecLink::None
    }
}

/// Gets the travel orientation after taking `turn` from entry side `orient_in`.
///
/// A car entering from side `orient_in` travels with orientation `orient_in ^ 1`,
/// so going straight exits through the opposite side.
pub fn dest_orient_for_turn(orient_in: usize, turn: TurnDir) -> usize {
    assert!(orient_in < 4, "Orientation out of range: {}", orient_in);
    let orient = orient_in ^ 1;
    match turn {
        TurnDir::Straight => OTHER_LANE[orient_in],
        TurnDir::Right => TO_RIGHT[orient],
        TurnDir::Left => TO_LEFT[orient],
        TurnDir::Unspec => panic!("Turn direction must be resolved before entering an intersection"),
    }
}

/// A junction of two to four road segments, controlled by a stoplight.
#[derive(Clone, Debug)]
pub struct Intersection {
    pub bcube: Cube,
    /// The segment attached to each side, indexed W, E, S, N.
    pub links: [IsecLink; 4],
    /// The city reached through this intersection's connector road, if it has one.
    pub conn_to_city: Option<usize>,
    conn: u8,
    num_conn: u8,
    stoplight: Stoplight,
}

impl Intersection {
    /// Creates an intersection. Panics unless at least two sides are connected.
    pub fn new(bcube: Cube, links: [IsecLink; 4]) -> Self {
        let conn = (0..4)
            .filter(|side| !links[*side].is_none())
            .fold(0u8, |conn, side| conn | (1 << side));
        let num_conn = conn.count_ones() as u8;
        assert!(num_conn >= 2, "Intersection needs at least two connections");
        let mut isec = Self {
            bcube,
            links,
            conn_to_city: None,
            conn,
            num_conn,
            stoplight: Stoplight::new(false),
        };
        isec.init_stoplight(false, Default::default());
        isec
    }

    /// Recreates the stoplight, choosing longer phases for connector intersections.
    pub(crate) fn init_stoplight(&mut self, at_conn_road: bool, timing: StoplightTiming) {
        let mut stoplight = Stoplight::new(at_conn_road);
        stoplight.set_timing(timing);
        stoplight.init(self.num_conn, self.conn);
        self.stoplight = stoplight;
    }

    pub fn conn(&self) -> u8 {
        self.conn
    }

    pub fn num_conn(&self) -> u8 {
        self.num_conn
    }

    pub fn has_side(&self, side: usize) -> bool {
        self.conn & (1 << side) != 0
    }

    pub fn road_type(&self) -> RoadType {
        RoadType::for_isec_degree(self.num_conn)
    }

    pub fn stoplight(&self) -> &Stoplight {
        &self.stoplight
    }

    pub(crate) fn stoplight_mut(&mut self) -> &mut Stoplight {
        &mut self.stoplight
    }

    /// Whether any side leads onto a connector road.
    pub fn is_global_conn_int(&self) -> bool {
        self.links
            .iter()
            .any(|link| matches!(link, IsecLink::Global { .. }))
    }

    /// The side leading onto the connector road, if there is one.
    pub fn global_side(&self) -> Option<usize> {
        self.links
            .iter()
            .position(|link| matches!(link, IsecLink::Global { .. }))
    }

    /// Gets the travel orientation of the car once it has made its turn.
    pub fn get_dest_orient_for_car_in_isec(&self, car: &Car) -> usize {
        dest_orient_for_turn(car.get_orient() ^ 1, car.turn_dir)
    }

    /// Whether a car travelling with orientation `orient` can currently make `turn` here.
    pub fn is_orient_currently_valid(&self, orient: usize, turn: TurnDir) -> bool {
        if turn == TurnDir::Unspec || !self.has_side(orient ^ 1) {
            return false;
        }
        self.has_side(dest_orient_for_turn(orient ^ 1, turn))
    }

    /// The turns open to a car travelling with orientation `orient`.
    pub fn legal_turns(&self, orient: usize) -> ArrayVec<TurnDir, 3> {
        [TurnDir::Straight, TurnDir::Left, TurnDir::Right]
            .into_iter()
            .filter(|turn| self.is_orient_currently_valid(orient, *turn))
            .collect()
    }

    /// The coordinate, across the exit road, of the lane for travel with orientation `orient`.
    pub fn lane_coord(&self, orient: usize) -> f64 {
        let (dim, dir) = (orient >> 1, orient & 1 == 1);
        let lat = self.bcube.d[1 - dim];
        lat.midpoint() + lane_offset_sign(dim, dir) * 0.25 * lat.length()
    }

    /// The coordinate of the stop line for a car approaching along (`dim`, `dir`).
    pub fn stop_line(&self, dim: usize, dir: bool) -> f64 {
        self.bcube.d[dim].end(!dir)
    }

    pub fn get_light_state(&self, car: &Car) -> LightState {
        self.stoplight.get_light_state(car.dim, car.dir, car.turn_dir)
    }

    pub fn red_light(&self, car: &Car) -> bool {
        self.stoplight.red_light(car.dim, car.dir, car.turn_dir)
    }

    pub fn yellow_light(&self, car: &Car) -> bool {
        self.get_light_state(car) == LightState::Yellow
    }

    pub fn red_or_yellow_light(&self, car: &Car) -> bool {
        self.get_light_state(car) != LightState::Green
    }

    /// Whether the signal alone lets the car enter.
    pub fn can_go_based_on_light(&self, car: &Car) -> bool {
        !self.red_light(car)
    }

    /// Whether crossing traffic blocks the car's path through the intersection.
    pub fn is_blocked(&self, car: &Car) -> bool {
        !self.stoplight.check_int_clear(car.get_orient(), car.turn_dir)
    }

    /// Whether the car may enter the intersection right now.
    pub fn can_go_now(&self, car: &Car) -> bool {
        (self.can_go_based_on_light(car) && !self.is_blocked(car))
            || self.stoplight.can_turn_right_on_red(car)
    }

    pub fn notify_waiting_car(&self, car: &Car) {
        self.stoplight.notify_waiting_car(car.dim, car.dir, car.turn_dir);
    }

    /// Records a car inside the intersection so crossing traffic waits for it.
    pub fn mark_crossing(&self, car: &Car) {
        self.stoplight.mark_blocked(car.dim, car.dir);
    }
}

/// Gets the turn taking a car travelling with orientation `orient` out through side `exit`.
pub(crate) fn turn_for_exit(orient: usize, exit: usize) -> Option<TurnDir> {
    if exit == orient {
        Some(TurnDir::Straight)
    } else if exit == light::TO_RIGHT[orient] {
        Some(TurnDir::Right)
    } else if exit == light::TO_LEFT[orient] {
        Some(TurnDir::Left)
    } else {
        None
    }
}
