use super::{cars_in_x_range, CarManager};
use crate::car::Car;
use crate::color::Color;
use crate::math::{Cube, Point3d, Vector3d};
use itertools::Either;

/// Which cars a surface query considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    Any,
    /// Only cars parked off the road.
    OffRoad,
}

impl CarManager {
    /// The indices of the live cars that may overlap `area` in x and y.
    fn cars_near(&self, area: Cube) -> impl Iterator<Item = usize> + '_ {
        let candidates = if self.unsorted {
            Either::Left(0..self.cars.len())
        } else {
            Either::Right(
                (0..self.car_blocks.len())
                    .filter(move |b| self.block_bcubes[*b].intersects_xy(&area))
                    .flat_map(move |b| {
                        let range = self.block_range(b);
                        let parked = self.car_blocks[b].first_parked;
                        [range.start..parked, parked..range.end]
                    })
                    .flat_map(move |range| {
                        cars_in_x_range(&self.cars, range, self.max_car_len, area.d[0].min, area.d[0].max)
                    }),
            )
        };
        candidates.filter(move |ix| {
            let car = &self.cars[*ix];
            !car.destroyed && car.bcube.intersects_xy(&area)
        })
    }

    /// Pushes a sphere out of any car it hits.
    /// Returns the collision normal of the first car hit.
    ///
    /// # Parameters
    /// * `pos` - The sphere centre, updated in place
    /// * `p_last` - The sphere centre on the previous frame
    /// * `radius` - The sphere radius
    pub fn proc_sphere_coll(&self, pos: &mut Point3d, p_last: Point3d, radius: f64) -> Option<Vector3d> {
        let area = Cube::from_centre(*pos, Vector3d::new(radius, radius, radius));
        self.cars_near(area)
            .find_map(|ix| self.cars[ix].proc_sphere_coll(pos, p_last, radius))
    }

    /// The parametric position along `p1 -> p2` of the nearest car hit by the segment.
    pub fn line_intersect_cars(&self, p1: Point3d, p2: Point3d) -> Option<f64> {
        self.nearest_on_line(p1, p2).map(|(_, t)| t)
    }

    /// The nearest car hit by the segment `p1 -> p2`.
    pub fn get_car_at(&self, p1: Point3d, p2: Point3d) -> Option<&Car> {
        self.nearest_on_line(p1, p2).map(|(ix, _)| &self.cars[ix])
    }

    fn nearest_on_line(&self, p1: Point3d, p2: Point3d) -> Option<(usize, f64)> {
        self.cars_near(Cube::from_points(p1, p2))
            .filter_map(|ix| Some((ix, self.cars[ix].bcube.line_intersect(p1, p2)?)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Destroys every car touching the sphere. The cars are removed on the next frame.
    /// Returns how many cars were destroyed.
    pub fn destroy_cars_in_radius(&mut self, pos: Point3d, radius: f64) -> usize {
        let area = Cube::from_centre(pos, Vector3d::new(radius, radius, radius));
        let hit = self
            .cars_near(area)
            .filter(|ix| self.cars[*ix].bcube.closest_dist_sq(pos) <= radius * radius)
            .collect::<Vec<_>>();
        for ix in &hit {
            self.cars[*ix].destroy();
        }
        if !hit.is_empty() {
            log::debug!("destroyed {} cars near {:?}", hit.len(), pos);
        }
        hit.len()
    }

    /// The colour of the topmost car under the point, if any.
    pub fn get_color_at_xy(&self, pos: Point3d, surface: Surface) -> Option<Color> {
        self.cars_near(Cube::from_points(pos, pos))
            .map(|ix| &self.cars[ix])
            .filter(|car| surface == Surface::Any || car.is_parked())
            .filter(|car| car.bcube.contains_pt_xy(pos))
            .max_by(|a, b| a.bcube.z2().total_cmp(&b.bcube.z2()))
            .map(Car::get_color)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::car::test::car_at;
    use crate::car::CAR_COLORS;
    use crate::light::StoplightTiming;
    use crate::params::TrafficParams;
    use crate::road::{CityRoads, RoadNetwork};
    use assert_approx_eq::assert_approx_eq;

    /// Three moving cars along y = -0.25 with rears at x = 0, 5 and 10, plus a parked car at x = 20.
    fn manager() -> CarManager {
        let roads = RoadNetwork::new(vec![CityRoads::new()], CityRoads::new(), StoplightTiming::default());
        let mut manager = CarManager::new(roads, TrafficParams::default(), 1);
        for (i, x) in [0.0, 5.0, 10.0].into_iter().enumerate() {
            let mut car = car_at(x, 1.0);
            car.color_id = i;
            manager.cars.push(car);
        }
        let mut parked = car_at(20.0, 1.0);
        parked.color_id = 7;
        manager.add_parked_cars([parked]);
        manager.finalize_cars();
        manager
    }

    #[test]
    fn blocks_split_moving_and_parked() {
        let m = manager();
        assert_eq!(m.car_blocks().len(), 1);
        assert_eq!(m.car_blocks()[0].first_parked, 3);
        assert_eq!(m.num_moving(), 3);
        assert_eq!(m.num_parked(), 1);
    }

    #[test]
    fn segment_finds_nearest_car() {
        let m = manager();
        let (p1, p2) = (Point3d::new(12.0, -0.25, 0.2), Point3d::new(-2.0, -0.25, 0.2));
        let car = m.get_car_at(p1, p2).expect("Segment should hit a car");
        assert_approx_eq!(car.get_center().x, 10.5);
        // Enters the car at x = 11, 1 unit into a 14 unit segment
        assert_approx_eq!(m.line_intersect_cars(p1, p2).unwrap(), 1.0 / 14.0);

        let miss = (Point3d::new(12.0, 2.0, 0.2), Point3d::new(-2.0, 2.0, 0.2));
        assert!(m.get_car_at(miss.0, miss.1).is_none());
    }

    #[test]
    fn sphere_is_pushed_out_of_car() {
        let m = manager();
        let mut pos = Point3d::new(5.5, 0.1, 0.2);
        let normal = m
            .proc_sphere_coll(&mut pos, Point3d::new(5.5, 1.0, 0.2), 0.2)
            .expect("Sphere should touch the car");
        assert_approx_eq!(normal.y, 1.0);
        assert_approx_eq!(pos.y, 0.2);

        let far = Point3d::new(5.0, 3.0, 0.2);
        let mut pos = far;
        assert!(m.proc_sphere_coll(&mut pos, far, 0.2).is_none());
        assert_eq!(pos, far);
    }

    #[test]
    fn color_query_respects_surface() {
        let m = manager();
        let on_road = Point3d::new(5.5, -0.25, 0.0);
        assert_eq!(m.get_color_at_xy(on_road, Surface::Any), Some(CAR_COLORS[1]));
        assert_eq!(m.get_color_at_xy(on_road, Surface::OffRoad), None);
        let lot = Point3d::new(20.5, -0.25, 0.0);
        assert_eq!(m.get_color_at_xy(lot, Surface::OffRoad), Some(CAR_COLORS[7]));
    }

    #[test]
    fn destroyed_cars_are_ignored() {
        let mut m = manager();
        assert_eq!(m.destroy_cars_in_radius(Point3d::new(5.5, -0.25, 0.2), 0.1), 1);
        assert_eq!(m.num_moving(), 2);
        assert!(m.get_color_at_xy(Point3d::new(5.5, -0.25, 0.0), Surface::Any).is_none());
        assert_eq!(m.destroy_cars_in_radius(Point3d::new(5.5, -0.25, 0.2), 0.1), 0);
        // A wide blast reaches the two remaining moving cars
        assert_eq!(m.destroy_cars_in_radius(Point3d::new(5.5, -0.25, 0.2), 5.0), 2);
    }
}
