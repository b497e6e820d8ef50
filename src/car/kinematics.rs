use super::Car;

/// Speed gained per second at full acceleration, as a fraction of max speed.
const ACCEL_RATE: f64 = 0.8;

/// Speed lost per second when braking, as a fraction of max speed.
const DECEL_RATE: f64 = 2.0;

/// Speed lost per second when braking hard, as a fraction of max speed.
const DECEL_FAST_RATE: f64 = 400.0;

/// The minimum bumper-to-bumper gap between stopped cars, in car lengths.
const MIN_CAR_STOP_SEP: f64 = 0.25;

/// A speed adjustment requested by one of the constraints on a car.
/// Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpeedAction {
    Accelerate,
    Cruise,
    Decelerate,
    DecelerateFast,
    Stop,
}

impl Car {
    pub fn accelerate(&mut self, mult: f64, dt: f64) {
        self.cur_speed = f64::min(self.get_max_speed(), self.cur_speed + mult * dt * self.max_speed);
    }

    pub fn decelerate(&mut self, mult: f64, dt: f64) {
        self.cur_speed = f64::max(0.0, self.cur_speed - mult * dt * self.max_speed);
    }

    pub fn decelerate_fast(&mut self, dt: f64) {
        self.decelerate(DECEL_FAST_RATE, dt);
    }

    pub fn stop(&mut self) {
        self.cur_speed = 0.0;
    }

    /// Parks the car: it never moves again.
    pub fn park(&mut self) {
        self.cur_speed = 0.0;
        self.max_speed = 0.0;
    }

    /// Forgets the speed actions of the previous frame. Use at the start of an update.
    pub(crate) fn reset_action(&self) {
        self.action.set(SpeedAction::Accelerate);
    }

    /// Requests a speed action; the most severe request of the frame wins.
    pub(crate) fn request(&self, action: SpeedAction) {
        self.action.set(self.action.get().max(action));
    }

    /// The most severe speed action requested this frame.
    pub fn action(&self) -> SpeedAction {
        self.action.get()
    }

    /// Applies this frame's speed action, keeping the speed within the current cap.
    pub(crate) fn apply_action(&mut self, dt: f64) {
        match self.action.get() {
            SpeedAction::Accelerate => self.accelerate(ACCEL_RATE, dt),
            SpeedAction::Cruise => {}
            SpeedAction::Decelerate => self.decelerate(DECEL_RATE, dt),
            SpeedAction::DecelerateFast => self.decelerate_fast(dt),
            SpeedAction::Stop => self.stop(),
        }
        self.cur_speed = self.cur_speed.clamp(0.0, self.get_max_speed());
    }

    /// The gap to keep to the car ahead, growing with this car's speed.
    ///
    /// # Parameters
    /// * `other` - The car ahead
    /// * `add_one_car_len` - Whether to add one more average car length of slack
    pub fn get_min_sep_dist_to_car(&self, other: &Car, add_one_car_len: bool) -> f64 {
        let avg_len = 0.5 * (self.get_length() + other.get_length());
        let moving = f64::max(0.0, self.cur_speed - 0.1 * self.max_speed);
        let extra = if add_one_car_len { 1.0 } else { 0.0 };
        avg_len * (MIN_CAR_STOP_SEP + 1.11 * moving + extra)
    }

    /// The distance needed to stop when braking normally, in world units.
    ///
    /// # Parameters
    /// * `car_speed` - The nominal car speed in world units per second
    pub fn get_stopping_dist(&self, car_speed: f64) -> f64 {
        if self.max_speed == 0.0 {
            return 0.0;
        }
        let v = self.cur_speed * car_speed;
        let decel = DECEL_RATE * self.max_speed * car_speed;
        0.5 * v * v / decel
    }

    /// How far ahead of its front bumper the car looks for obstacles and intersections.
    pub fn get_max_lookahead_dist(&self, car_speed: f64) -> f64 {
        self.get_stopping_dist(car_speed) + self.get_length() * (2.5 + 1.11 * self.cur_speed)
    }

    /// Requests the speed action needed to keep a safe gap to the car ahead.
    pub(crate) fn follow(&self, front: &Car) {
        let gap = self.gap_to_car_in_front(front);
        let sep = self.get_min_sep_dist_to_car(front, false);
        let action = if gap < sep {
            if gap < 0.25 * sep {
                SpeedAction::DecelerateFast
            } else {
                SpeedAction::Decelerate
            }
        } else if gap < self.get_min_sep_dist_to_car(front, true) {
            if self.cur_speed > front.cur_speed {
                SpeedAction::Decelerate
            } else {
                SpeedAction::Cruise
            }
        } else {
            SpeedAction::Accelerate
        };
        self.request(action);
    }

    /// Moves the car `dist` forward, adjusting for the road grade and stopping at the stop line.
    ///
    /// # Parameters
    /// * `dist` - The nominal distance to move in world units
    /// * `now` - The current time in s, used to track waiting
    pub fn move_car(&mut self, dist: f64, now: f64) {
        assert!(self.is_valid(), "Cannot move an invalid car");
        assert!(dist >= 0.0, "Cars only move forward");
        let len = self.get_length();
        let grade_mult = (1.0 - 0.5 * self.dz / len).clamp(0.75, 1.25);
        let mut dist = f64::min(grade_mult * dist, 0.5 * len);

        if let Some(stop) = self.stop_pos {
            let room = if self.dir {
                stop - self.front_pos()
            } else {
                self.front_pos() - stop
            };
            if room <= dist {
                dist = room.max(0.0);
                self.stop();
                self.stopped_at_light = true;
            }
        }
        self.bcube.translate_dim(self.dim, if self.dir { dist } else { -dist });

        let pos = self.get_center()[self.dim];
        if !self.is_almost_stopped() || (pos - self.waiting_pos).abs() > len {
            self.waiting_pos = pos;
            self.waiting_start = now;
        }
    }
}

#[cfg(test)]
mod test {
    use crate::car::test::car_at;
    use crate::car::SpeedAction;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn speed_stays_within_bounds() {
        let mut car = car_at(0.0, 1.0);
        for _ in 0..100 {
            car.accelerate(0.8, 0.1);
            assert!(car.cur_speed <= car.get_max_speed());
        }
        assert_eq!(car.cur_speed, 1.0);
        for _ in 0..100 {
            car.decelerate(2.0, 0.1);
            assert!(car.cur_speed >= 0.0);
        }
        assert_eq!(car.cur_speed, 0.0);
    }

    #[test]
    fn most_severe_action_wins() {
        let mut car = car_at(0.0, 1.0);
        car.cur_speed = 0.5;
        car.reset_action();
        car.request(SpeedAction::Decelerate);
        car.request(SpeedAction::Accelerate);
        car.request(SpeedAction::Cruise);
        assert_eq!(car.action(), SpeedAction::Decelerate);
        car.apply_action(0.1);
        assert_approx_eq!(car.cur_speed, 0.3);

        car.reset_action();
        car.request(SpeedAction::Stop);
        car.apply_action(0.1);
        assert!(car.is_stopped());
    }

    #[test]
    fn leaving_connector_caps_speed() {
        let mut car = car_at(0.0, 1.0);
        car.cur_city = crate::CONN_CITY_IX;
        car.cur_speed = 2.0;
        car.cur_city = 0;
        car.reset_action();
        car.apply_action(0.1);
        assert_eq!(car.cur_speed, 1.0);
    }

    #[test]
    fn min_sep_grows_with_speed() {
        let mut car = car_at(0.0, 1.0);
        let front = car_at(5.0, 1.0);
        assert_approx_eq!(car.get_min_sep_dist_to_car(&front, false), 0.25);
        assert_approx_eq!(car.get_min_sep_dist_to_car(&front, true), 1.25);
        car.cur_speed = 1.0;
        assert_approx_eq!(car.get_min_sep_dist_to_car(&front, false), 0.25 + 1.11 * 0.9);
    }

    #[test]
    fn follower_brakes_behind_stopped_car() {
        let mut rear = car_at(0.0, 1.0);
        rear.cur_speed = 1.0;
        let front = car_at(1.5, 1.0);
        rear.reset_action();
        rear.follow(&front);
        assert_eq!(rear.action(), SpeedAction::Decelerate);

        let close = car_at(1.1, 1.0);
        rear.reset_action();
        rear.follow(&close);
        assert_eq!(rear.action(), SpeedAction::DecelerateFast);

        let far = car_at(10.0, 1.0);
        rear.reset_action();
        rear.follow(&far);
        assert_eq!(rear.action(), SpeedAction::Accelerate);
    }

    #[test]
    fn move_stops_at_line() {
        let mut car = car_at(0.0, 1.0);
        car.cur_speed = 1.0;
        car.stop_pos = Some(1.2);
        car.move_car(0.1, 0.0);
        assert_approx_eq!(car.front_pos(), 1.1);
        car.move_car(0.3, 0.1);
        assert_approx_eq!(car.front_pos(), 1.2);
        assert!(car.is_stopped());
        assert!(car.stopped_at_light);
    }

    #[test]
    fn move_is_capped_and_graded() {
        let mut car = car_at(0.0, 1.0);
        car.cur_speed = 1.0;
        car.move_car(5.0, 0.0);
        assert_approx_eq!(car.rear_pos(), 0.5);

        let mut uphill = car_at(0.0, 1.0);
        uphill.cur_speed = 1.0;
        uphill.dz = 0.2;
        uphill.move_car(0.1, 0.0);
        assert_approx_eq!(uphill.rear_pos(), 0.09);
    }

    #[test]
    fn wait_time_tracks_stop() {
        let mut car = car_at(0.0, 1.0);
        car.cur_speed = 1.0;
        car.move_car(0.1, 1.0);
        assert_eq!(car.get_wait_time_secs(1.0), 0.0);
        car.stop();
        car.move_car(0.0, 2.0);
        car.move_car(0.0, 5.0);
        assert_approx_eq!(car.get_wait_time_secs(5.0), 4.0);
    }
}
