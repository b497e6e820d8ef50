use super::{Car, TurnDir};
use crate::road::Intersection;
use rand::seq::SliceRandom;
use rand::Rng;

impl Car {
    /// Picks a random legal turn at the intersection ahead, for when no route is known or the
    /// route's turn isn't possible. Sometimes gives up on the destination so a car that keeps
    /// missing its route eventually picks a new one.
    pub fn on_alternate_turn_dir<R: Rng>(&mut self, isec: &Intersection, rng: &mut R) {
        let turns = isec.legal_turns(self.get_orient());
        // A dead end; the car leaves the simulation when it reaches the missing side
        self.turn_dir = turns.choose(rng).copied().unwrap_or(TurnDir::Straight);
        if self.dest_valid && rng.gen_bool(0.25) {
            log::debug!("car dropping destination {}:{}", self.dest_city, self.dest_isec);
            self.dest_valid = false;
        }
        log::trace!("car chose {:?} at orient {}", self.turn_dir, self.get_orient());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::car::test::car_at;
    use crate::math::{Cube, Point3d};
    use crate::road::IsecLink;
    use rand::SeedableRng;

    #[test]
    fn alternate_turn_is_always_legal() {
        let mut links = [IsecLink::None; 4];
        for side in [0, 1, 2] {
            links[side] = IsecLink::Local { road: 0, seg: side };
        }
        let isec = Intersection::new(Cube::from_points(Point3d::new(1.0, -1.0, 0.0), Point3d::new(2.0, 0.0, 0.0)), links);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut car = car_at(0.0, 1.0);
        let mut seen = vec![];
        for _ in 0..100 {
            car.on_alternate_turn_dir(&isec, &mut rng);
            assert!(isec.is_orient_currently_valid(car.get_orient(), car.turn_dir));
            if !seen.contains(&car.turn_dir) {
                seen.push(car.turn_dir);
            }
        }
        assert_eq!(seen.len(), 2);
    }
}
