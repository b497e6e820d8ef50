use crate::car::{Car, TurnDir};
use crate::color::{self, Color};
use crate::util::rotated_range;
use std::cell::Cell;
use std::fmt;

/// The number of signal phases.
pub const NUM_STATE: usize = 6;

/// Phase names. E/W/N/S is the direction of travel, G is straight or right, L is a protected left.
pub const STATE_NAMES: [&str; NUM_STATE] = ["EGL", "EGWG", "WGL", "NGL", "NGSG", "SGL"];

/// Orientations given a straight/right green in each phase, as bits over {W=1, E=2, S=4, N=8}.
pub const ST_R_ORIENT_MASKS: [u8; NUM_STATE] = [2, 3, 1, 8, 12, 4];

/// Orientations given a protected left in each phase.
pub const LEFT_ORIENT_MASKS: [u8; NUM_STATE] = [2, 0, 1, 8, 0, 4];

/// Travel orientation after a right turn.
pub const TO_RIGHT: [usize; 4] = [3, 2, 0, 1];
/// Travel orientation after a left turn.
pub const TO_LEFT: [usize; 4] = [2, 3, 1, 0];
/// The opposing orientation.
pub const OTHER_LANE: [usize; 4] = [1, 0, 3, 2];
/// Orientation of the crossing traffic approaching from the left.
pub const CONN_LEFT: [usize; 4] = [3, 2, 0, 1];
/// Orientation of the crossing traffic approaching from the right.
pub const CONN_RIGHT: [usize; 4] = [2, 3, 1, 0];

/// Gets the orientation index of travel along `dim` in direction `dir`.
pub fn orient(dim: usize, dir: bool) -> usize {
    assert!(dim < 2, "Travel dimension out of range: {}", dim);
    2 * dim + dir as usize
}

/// The colour shown to a movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightState {
    Green,
    Yellow,
    Red,
}

impl LightState {
    pub fn color(self) -> Color {
        match self {
            LightState::Green => color::GREEN,
            LightState::Yellow => color::YELLOW,
            LightState::Red => color::RED,
        }
    }
}

/// The state of a crosswalk signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrosswalkState {
    Walk,
    Warn,
    Stop,
}

impl CrosswalkState {
    pub fn color(self) -> Color {
        match self {
            CrosswalkState::Walk => color::WHITE,
            CrosswalkState::Warn | CrosswalkState::Stop => color::ORANGE,
        }
    }
}

/// Signal timing parameters shared by all stoplights.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoplightTiming {
    /// Nominal duration of each phase in s.
    pub state_times: [f64; NUM_STATE],
    /// Length of the yellow window at the end of a phase in s.
    pub yellow_secs: f64,
    /// How many serving phases may be jumped over to reach one with a waiting car.
    pub max_skipped_phases: usize,
    /// Duration multiplier for intersections on connector roads.
    pub conn_road_mult: f64,
}

impl Default for StoplightTiming {
    fn default() -> Self {
        Self {
            state_times: [5.0, 6.0, 5.0, 5.0, 6.0, 5.0],
            yellow_secs: 1.5,
            max_skipped_phases: 2,
            conn_road_mult: 2.0,
        }
    }
}

impl StoplightTiming {
    /// Panics if the timing would make the state machine degenerate.
    pub fn validate(&self) {
        assert!(
            self.state_times.iter().all(|t| *t > 0.0),
            "Stoplight phase times must be positive"
        );
        assert!(self.yellow_secs >= 0.0, "Yellow window must not be negative");
        assert!(self.conn_road_mult >= 1.0, "Connector multiplier must be at least 1");
    }
}

/// Observations written by cars during the update pass, while the rest of the road is read-only.
#[derive(Clone, Debug, Default)]
struct Observations {
    /// Orientations with a car waiting to go straight or right.
    car_waiting_sr: Cell<u8>,
    /// Orientations with a car waiting to turn left.
    car_waiting_left: Cell<u8>,
    /// Orientations of cars currently crossing the intersection.
    blocked: Cell<u8>,
}

/// The signal controller of one intersection.
#[derive(Clone, Debug)]
pub struct Stoplight {
    /// The number of connected sides.
    num_conn: u8,
    /// The connected sides, as bits over {W, E, S, N}.
    conn: u8,
    /// The current phase.
    cur_state: usize,
    /// Whether this intersection is on a connector road; doubles the phase times.
    at_conn_road: bool,
    /// The time spent in the current phase in s.
    cur_state_secs: f64,
    timing: StoplightTiming,
    obs: Observations,
}

impl Stoplight {
    /// Creates a stoplight with no connections.
    pub fn new(at_conn_road: bool) -> Self {
        Self {
            num_conn: 0,
            conn: 0,
            cur_state: 0,
            at_conn_road,
            cur_state_secs: 0.0,
            timing: Default::default(),
            obs: Default::default(),
        }
    }

    /// Takes a snapshot of the intersection's connectivity.
    pub fn init(&mut self, num_conn: u8, conn: u8) {
        assert!(conn < 16, "Connection mask out of range: {}", conn);
        assert_eq!(conn.count_ones() as u8, num_conn, "Connection count does not match mask");
        assert!(num_conn >= 2, "Intersections need at least two connections");
        self.num_conn = num_conn;
        self.conn = conn;
        self.cur_state_secs = 0.0;
        self.cur_state = 0;
        if self.has_signal() && !self.serves(0) {
            self.cur_state = self.next_serving_state(0);
        }
    }

    /// Replaces the timing parameters.
    pub fn set_timing(&mut self, timing: StoplightTiming) {
        timing.validate();
        self.timing = timing;
    }

    pub fn timing(&self) -> &StoplightTiming {
        &self.timing
    }

    pub fn num_conn(&self) -> u8 {
        self.num_conn
    }

    pub fn conn(&self) -> u8 {
        self.conn
    }

    pub fn at_conn_road(&self) -> bool {
        self.at_conn_road
    }

    /// The current phase index.
    pub fn cur_state(&self) -> usize {
        self.cur_state
    }

    /// The time spent in the current phase in s.
    pub fn cur_state_secs(&self) -> f64 {
        self.cur_state_secs
    }

    /// Pass-through bends have no signal and are always green.
    pub fn has_signal(&self) -> bool {
        self.num_conn > 2
    }

    /// The duration of a phase in s.
    pub fn get_state_time_secs(&self, state: usize) -> f64 {
        let mult = if self.at_conn_road {
            self.timing.conn_road_mult
        } else {
            1.0
        };
        mult * self.timing.state_times[state]
    }

    pub fn get_cur_state_time_secs(&self) -> f64 {
        self.get_state_time_secs(self.cur_state)
    }

    /// The duration of one full cycle through every serving phase in s.
    pub fn cycle_secs(&self) -> f64 {
        (0..NUM_STATE)
            .filter(|s| self.serves(*s))
            .map(|s| self.get_state_time_secs(s))
            .sum()
    }

    /// Advances the phase clock by `dt` seconds and forgets last frame's crossing cars.
    pub fn next_frame(&mut self, dt: f64) {
        assert!(dt >= 0.0, "Frame time must not be negative");
        self.reset_blocked();
        if !self.has_signal() {
            return;
        }
        self.cur_state_secs += dt;
        self.run_update_logic();
    }

    /// Jumps the phase clock `time_secs` into the future without per-frame stepping.
    /// Used for cities that are not being simulated in real time.
    pub fn ffwd_to_future(&mut self, time_secs: f64) {
        assert!(time_secs >= 0.0, "Cannot fast-forward into the past");
        if !self.has_signal() {
            return;
        }
        self.clear_waiting();
        self.cur_state_secs = (self.cur_state_secs + time_secs) % self.cycle_secs();
        self.run_update_logic();
    }

    /// Records that a car is held at this intersection.
    pub fn notify_waiting_car(&self, dim: usize, dir: bool, turn: TurnDir) {
        let bit = 1 << orient(dim, dir);
        let mask = match turn {
            TurnDir::Left => &self.obs.car_waiting_left,
            TurnDir::Straight | TurnDir::Right => &self.obs.car_waiting_sr,
            TurnDir::Unspec => panic!("Waiting car has no turn direction"),
        };
        mask.set(mask.get() | bit);
    }

    /// Whether any car has reported waiting since the last phase change.
    pub fn any_car_waiting(&self) -> bool {
        (self.obs.car_waiting_sr.get() | self.obs.car_waiting_left.get()) != 0
    }

    /// Records that a car travelling along (`dim`, `dir`) is inside the intersection.
    pub fn mark_blocked(&self, dim: usize, dir: bool) {
        let blocked = &self.obs.blocked;
        blocked.set(blocked.get() | (1 << orient(dim, dir)));
    }

    pub fn is_blocked(&self, dim: usize, dir: bool) -> bool {
        self.is_orient_blocked(orient(dim, dir))
    }

    pub fn any_blocked(&self) -> bool {
        self.obs.blocked.get() != 0
    }

    pub fn reset_blocked(&self) {
        self.obs.blocked.set(0);
    }

    /// Whether the movement is red in the current phase.
    pub fn red_light(&self, dim: usize, dir: bool, turn: TurnDir) -> bool {
        if !self.has_signal() {
            return false;
        }
        !self.is_green_in(self.cur_state, orient(dim, dir), turn)
    }

    /// Gets the colour shown to the movement.
    pub fn get_light_state(&self, dim: usize, dir: bool, turn: TurnDir) -> LightState {
        if self.red_light(dim, dir, turn) {
            return LightState::Red;
        }
        if self.has_signal()
            && self.in_final_window()
            && !self.is_green_in(self.peek_next_state(), orient(dim, dir), turn)
        {
            return LightState::Yellow;
        }
        LightState::Green
    }

    pub fn get_stoplight_color(&self, dim: usize, dir: bool, turn: TurnDir) -> Color {
        self.get_light_state(dim, dir, turn).color()
    }

    /// Whether pedestrians may walk along (`dim`, `dir`).
    pub fn can_walk(&self, dim: usize, dir: bool) -> bool {
        !self.has_signal() || self.walk_in(self.cur_state, orient(dim, dir))
    }

    pub fn get_crosswalk_state(&self, dim: usize, dir: bool) -> CrosswalkState {
        if !self.can_walk(dim, dir) {
            CrosswalkState::Stop
        } else if self.has_signal()
            && self.in_final_window()
            && !self.walk_in(self.peek_next_state(), orient(dim, dir))
        {
            CrosswalkState::Warn
        } else {
            CrosswalkState::Walk
        }
    }

    /// Checks that no crossing car blocks the path of a car with orientation `orient`
    /// making the turn `turn_dir`.
    pub fn check_int_clear(&self, orient: usize, turn_dir: TurnDir) -> bool {
        assert!(orient < 4, "Orientation out of range: {}", orient);
        let left = self.is_orient_blocked(CONN_LEFT[orient]);
        let right = self.is_orient_blocked(CONN_RIGHT[orient]);
        match turn_dir {
            TurnDir::Straight => !left && !right,
            TurnDir::Left => !left && !right && !self.is_orient_blocked(OTHER_LANE[orient]),
            TurnDir::Right => !left,
            TurnDir::Unspec => panic!("Cannot check a path with no turn direction"),
        }
    }

    /// Whether the car may turn right against a red light right now.
    pub fn can_turn_right_on_red(&self, car: &Car) -> bool {
        if car.turn_dir != TurnDir::Right || !self.has_signal() {
            return false;
        }
        let orient = car.get_orient();
        let cross_green = ST_R_ORIENT_MASKS[self.cur_state] & (1 << CONN_LEFT[orient]) != 0;
        let oncoming_left = LEFT_ORIENT_MASKS[self.cur_state] & (1 << OTHER_LANE[orient]) != 0;
        !cross_green && !oncoming_left && self.check_int_clear(orient, TurnDir::Right)
    }

    /// Gets the phase that would be entered if the current one ended now.
    pub fn peek_next_state(&self) -> usize {
        let first = self.next_serving_state(self.cur_state);
        if !self.any_car_waiting() || self.is_any_car_waiting_at_state(first) {
            return first;
        }
        self.find_state_with_waiting_car(first).unwrap_or(first)
    }

    /// Whether a car is waiting for a movement that is green in the current phase.
    pub fn is_any_car_waiting_at_this_state(&self) -> bool {
        self.is_any_car_waiting_at_state(self.cur_state)
    }

    /// Looks at most `max_skipped_phases` serving phases past `first` for one with a waiting car.
    fn find_state_with_waiting_car(&self, first: usize) -> Option<usize> {
        rotated_range(NUM_STATE, first + 1)
            .filter(|s| self.serves(*s))
            .take_while(|s| *s != self.cur_state && *s != first)
            .take(self.timing.max_skipped_phases)
            .find(|s| self.is_any_car_waiting_at_state(*s))
    }

    fn is_any_car_waiting_at_state(&self, state: usize) -> bool {
        (self.obs.car_waiting_sr.get() & ST_R_ORIENT_MASKS[state]) != 0
            || (self.obs.car_waiting_left.get() & LEFT_ORIENT_MASKS[state]) != 0
    }

    fn run_update_logic(&mut self) {
        loop {
            let duration = self.get_cur_state_time_secs();
            if self.cur_state_secs <= duration {
                break;
            }
            self.cur_state_secs -= duration;
            self.advance_state();
        }
    }

    fn advance_state(&mut self) {
        let next = self.peek_next_state();
        log::trace!(
            "stoplight {} -> {}",
            STATE_NAMES[self.cur_state],
            STATE_NAMES[next]
        );
        self.cur_state = next;
        self.clear_waiting();
    }

    fn clear_waiting(&self) {
        self.obs.car_waiting_sr.set(0);
        self.obs.car_waiting_left.set(0);
    }

    /// The first phase after `state` that serves an existing approach.
    fn next_serving_state(&self, state: usize) -> usize {
        rotated_range(NUM_STATE, state + 1)
            .find(|s| self.serves(*s))
            .unwrap_or(state)
    }

    /// Orientations that can enter the intersection. A car travelling with
    /// orientation `o` enters through side `o ^ 1`.
    fn approach_mask(&self) -> u8 {
        (0..4)
            .filter(|o| self.conn & (1 << (o ^ 1)) != 0)
            .fold(0, |mask, o| mask | (1 << o))
    }

    fn serves(&self, state: usize) -> bool {
        (ST_R_ORIENT_MASKS[state] | LEFT_ORIENT_MASKS[state]) & self.approach_mask() != 0
    }

    fn is_green_in(&self, state: usize, orient: usize, turn: TurnDir) -> bool {
        let bit = 1 << orient;
        match turn {
            TurnDir::Left => LEFT_ORIENT_MASKS[state] & bit != 0,
            TurnDir::Straight | TurnDir::Right => ST_R_ORIENT_MASKS[state] & bit != 0,
            TurnDir::Unspec => panic!("Light queried with no turn direction"),
        }
    }

    fn walk_in(&self, state: usize, orient: usize) -> bool {
        let along = (1 << orient) | (1 << OTHER_LANE[orient]);
        LEFT_ORIENT_MASKS[state] == 0 && ST_R_ORIENT_MASKS[state] & along != 0
    }

    fn in_final_window(&self) -> bool {
        self.get_cur_state_time_secs() - self.cur_state_secs <= self.timing.yellow_secs
    }

    fn is_orient_blocked(&self, orient: usize) -> bool {
        self.obs.blocked.get() & (1 << orient) != 0
    }
}

impl fmt::Display for Stoplight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_signal() {
            return write!(f, "no signal ({} conn)", self.num_conn);
        }
        write!(
            f,
            "state: {} {:.1}/{:.1}s, blocked: {:04b}, waiting s/r: {:04b}, left: {:04b}",
            STATE_NAMES[self.cur_state],
            self.cur_state_secs,
            self.get_cur_state_time_secs(),
            self.obs.blocked.get(),
            self.obs.car_waiting_sr.get(),
            self.obs.car_waiting_left.get(),
        )
    }
}
