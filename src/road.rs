//! The static road model: roads, segments, intersections, plots and parking lots.

use crate::car::Car;
use crate::math::{Cube, Point3d, Vector3d};
use crate::util::Interval;
use crate::{PARK_SPACE_LENGTH, PARK_SPACE_WIDTH};
use rand::Rng;
use std::cell::Cell;

pub use isec::{dest_orient_for_turn, Intersection, IsecLink};
pub(crate) use isec::turn_for_exit;
pub use network::{CityRoads, RoadGeometry, RoadNetwork};

mod isec;
mod network;
mod pathfinding;

/// What a car or box is located on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoadType {
    Plot,
    Seg,
    Isec2,
    Isec3,
    Isec4,
    ParkLot,
    Tracks,
}

impl RoadType {
    /// Whether this is one of the intersection types.
    pub fn is_isect(self) -> bool {
        matches!(self, RoadType::Isec2 | RoadType::Isec3 | RoadType::Isec4)
    }

    /// The intersection type with `num_conn` connected sides.
    pub fn for_isec_degree(num_conn: u8) -> Self {
        match num_conn {
            2 => RoadType::Isec2,
            3 => RoadType::Isec3,
            4 => RoadType::Isec4,
            _ => panic!("Invalid intersection degree: {}", num_conn),
        }
    }
}

/// The sign of the lateral lane offset for travel along (`dim`, `dir`). Cars keep right.
pub fn lane_offset_sign(dim: usize, dir: bool) -> f64 {
    if dir == (dim == 1) {
        1.0
    } else {
        -1.0
    }
}

/// An axis-aligned road box with a travel dimension.
/// The z extent spans the elevations of the two ends, so a flat road has no height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Road {
    pub bcube: Cube,
    /// The travel dimension: 0 = x, 1 = y.
    pub dim: usize,
    /// False if the low end of the road is at `z1`, true if the low end is at `z2`.
    pub slope: bool,
}

impl Road {
    pub fn new(bcube: Cube, dim: usize, slope: bool) -> Self {
        assert!(dim < 2, "Road dimension out of range: {}", dim);
        Self { bcube, dim, slope }
    }

    pub fn length(&self) -> f64 {
        self.bcube.size(self.dim)
    }

    pub fn width(&self) -> f64 {
        self.bcube.size(1 - self.dim)
    }

    /// The magnitude of the road's gradient.
    pub fn slope_val(&self) -> f64 {
        self.bcube.size(2) / self.length()
    }

    /// The surface elevation at the low end of the travel dimension.
    pub fn start_z(&self) -> f64 {
        self.bcube.d[2].end(self.slope)
    }

    /// The surface elevation at the high end of the travel dimension.
    pub fn end_z(&self) -> f64 {
        self.bcube.d[2].end(!self.slope)
    }

    /// The signed rise per unit length in the positive travel direction.
    pub fn grade(&self) -> f64 {
        (self.end_z() - self.start_z()) / self.length()
    }

    /// The surface elevation at coordinate `pos` along the travel dimension.
    pub fn z_at(&self, pos: f64) -> f64 {
        let extent = self.bcube.d[self.dim];
        self.start_z() + self.grade() * (extent.clamp(pos) - extent.min)
    }

    /// The lateral coordinate of the centre of the lane for travel in `dir`.
    pub fn lane_center(&self, dir: bool) -> f64 {
        let lat = self.bcube.d[1 - self.dim];
        lat.midpoint() + lane_offset_sign(self.dim, dir) * 0.25 * lat.length()
    }
}

/// What the end of a road segment leads to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegLink {
    /// A dead end, where cars leave the simulation.
    None,
    /// Another segment of the same network.
    Seg(usize),
    /// An intersection of the same network.
    Isec(usize),
    /// An intersection of a city, at the end of a connector road.
    CityIsec { city: usize, isec: usize },
}

/// A drivable span of a road between two intersections.
#[derive(Clone, Debug)]
pub struct RoadSeg {
    pub road: Road,
    /// The road this segment belongs to.
    pub road_ix: usize,
    /// What the low and high ends of the segment lead to.
    pub ends: [SegLink; 2],
    /// The number of cars on this segment this frame.
    car_count: Cell<u32>,
}

impl RoadSeg {
    pub fn new(road: Road, road_ix: usize, ends: [SegLink; 2]) -> Self {
        Self {
            road,
            road_ix,
            ends,
            car_count: Cell::new(0),
        }
    }

    /// The number of cars counted on this segment this frame.
    pub fn car_count(&self) -> u32 {
        self.car_count.get()
    }

    pub(crate) fn register_car(&self) {
        self.car_count.set(self.car_count.get() + 1);
    }

    /// Resets the per-frame car count.
    pub fn next_frame(&self) {
        self.car_count.set(0);
    }

    /// Whether a car of the given length still fits behind the cars already on this segment.
    pub fn has_room_for(&self, car_len: f64) -> bool {
        let spacing = 1.25 * car_len;
        self.road.length() - self.car_count() as f64 * spacing >= spacing
    }
}

/// A city block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plot {
    pub bcube: Cube,
    pub has_parking: bool,
}

/// A parking lot inside a plot, with rows of spaces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParkingLot {
    pub bcube: Cube,
    /// The dimension parked cars face along.
    pub dim: usize,
    /// The direction parked cars face.
    pub dir: bool,
    /// The number of spaces in each row.
    pub row_sz: u16,
    pub num_rows: u16,
    /// The plot containing this lot.
    pub plot_ix: usize,
}

impl ParkingLot {
    /// Fills the spaces of this lot with parked cars.
    ///
    /// # Parameters
    /// * `city` - The city owning the lot
    /// * `lot_ix` - The index of this lot in its city
    /// * `car_size` - The nominal car length, width and height
    /// * `density` - The probability of each space being taken
    pub fn gen_parked_cars<R: Rng>(
        &self,
        city: usize,
        lot_ix: usize,
        car_size: Vector3d,
        density: f64,
        rng: &mut R,
    ) -> Vec<Car> {
        let (len, wid) = (car_size.x, car_size.y);
        let (space_len, space_wid) = (PARK_SPACE_LENGTH * len, PARK_SPACE_WIDTH * wid);
        let (dim, lat) = (self.dim, 1 - self.dim);
        let mut cars = vec![];

        for row in 0..self.num_rows {
            let row_start = self.bcube.d[dim].min + row as f64 * space_len;
            if row_start + space_len > self.bcube.d[dim].max + 1e-9 {
                break;
            }
            for col in 0..self.row_sz {
                let col_start = self.bcube.d[lat].min + col as f64 * space_wid;
                if col_start + space_wid > self.bcube.d[lat].max + 1e-9 {
                    break;
                }
                if !rng.gen_bool(density) {
                    continue;
                }
                let mut bcube = Cube::all_zeros();
                bcube.d[dim] = Interval::disc(row_start + 0.5 * space_len, 0.5 * len);
                bcube.d[lat] = Interval::disc(col_start + 0.5 * space_wid, 0.5 * wid);
                bcube.d[2] = Interval::new(self.bcube.z2(), self.bcube.z2() + car_size.z);

                let mut car = Car::new(bcube, dim, self.dir, 0.0);
                car.cur_city = city;
                car.cur_road = self.plot_ix;
                car.cur_seg = lot_ix;
                car.cur_road_type = RoadType::ParkLot;
                cars.push(car);
            }
        }
        cars
    }

    /// The centre of the lot's surface.
    pub fn surface_center(&self) -> Point3d {
        let c = self.bcube.center();
        Point3d::new(c.x, c.y, self.bcube.z2())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;

    fn road(slope: bool) -> Road {
        let bcube = Cube::from_points(Point3d::new(0.0, -0.5, 1.0), Point3d::new(10.0, 0.5, 2.0));
        Road::new(bcube, 0, slope)
    }

    #[test]
    fn road_grade_follows_slope_flag() {
        let up = road(false);
        assert_approx_eq!(up.length(), 10.0);
        assert_approx_eq!(up.width(), 1.0);
        assert_approx_eq!(up.slope_val(), 0.1);
        assert_approx_eq!(up.grade(), 0.1);
        assert_approx_eq!(up.z_at(5.0), 1.5);
        assert_approx_eq!(up.z_at(20.0), 2.0);

        let down = road(true);
        assert_approx_eq!(down.start_z(), 2.0);
        assert_approx_eq!(down.grade(), -0.1);
        assert_approx_eq!(down.z_at(2.5), 1.75);
    }

    #[test]
    fn lanes_keep_right() {
        let r = road(false);
        // Eastbound traffic drives on the south side
        assert_approx_eq!(r.lane_center(true), -0.25);
        assert_approx_eq!(r.lane_center(false), 0.25);
        assert_eq!(lane_offset_sign(1, true), 1.0);
        assert_eq!(lane_offset_sign(1, false), -1.0);
    }

    #[test]
    fn segment_count_resets() {
        let seg = RoadSeg::new(road(false), 0, [SegLink::None; 2]);
        seg.register_car();
        seg.register_car();
        assert_eq!(seg.car_count(), 2);
        assert!(seg.has_room_for(1.0));
        assert!(!seg.has_room_for(3.0));
        seg.next_frame();
        assert_eq!(seg.car_count(), 0);
    }

    #[test]
    fn parking_lot_fills_spaces() {
        let lot = ParkingLot {
            bcube: Cube::from_points(Point3d::new(0.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 0.01)),
            dim: 1,
            dir: false,
            row_sz: 20,
            num_rows: 20,
            plot_ix: 3,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let size = Vector3d::new(0.3, 0.13, 0.08);
        let cars = lot.gen_parked_cars(2, 5, size, 1.0, &mut rng);
        // 9 spaces of 0.208 across x, 1 row of 0.54 along y
        assert_eq!(cars.len(), 9);
        for car in &cars {
            assert!(car.is_parked());
            assert!(car.is_valid());
            assert_eq!(car.cur_road_type, RoadType::ParkLot);
            assert_eq!((car.cur_city, car.cur_road, car.cur_seg), (2, 3, 5));
            assert_approx_eq!(car.get_length(), 0.3);
            assert_approx_eq!(car.bcube.z1(), 0.01);
        }
        assert!(lot.gen_parked_cars(2, 5, size, 0.0, &mut rng).is_empty());
    }
}
