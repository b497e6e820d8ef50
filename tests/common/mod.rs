//! Road layouts shared by the integration tests.

#![allow(dead_code)]

use city_traffic::{
    math::{Cube, Point3d},
    Car, CityRoads, IsecLink, ParkingLot, RoadNetwork, RoadType, SegLink, StoplightTiming,
    TrafficParams,
};

/// Car length, width and height with a road width of 1.
pub const CAR_LEN: f64 = 0.30;
pub const CAR_WIDTH: f64 = 0.13;
pub const CAR_HEIGHT: f64 = 0.08;

/// Parameters sized for roads of width 1.
pub fn params() -> TrafficParams {
    TrafficParams {
        road_width: 1.0,
        speed_stddev: 0.0,
        ..Default::default()
    }
}

/// A flat square grid of `n` by `n` intersections, `spacing` apart, joined by roads of width 1.
///
/// Intersection `(i, j)` is centred on `(origin_x + i * spacing, j * spacing)`.
pub struct Grid {
    pub n: usize,
    pub spacing: f64,
    pub origin_x: f64,
}

impl Grid {
    pub fn new(n: usize, spacing: f64) -> Self {
        assert!(n >= 2, "A grid needs at least two intersections per side");
        Self {
            n,
            spacing,
            origin_x: 0.0,
        }
    }

    pub fn at(mut self, origin_x: f64) -> Self {
        self.origin_x = origin_x;
        self
    }

    pub fn isec(&self, i: usize, j: usize) -> usize {
        j * self.n + i
    }

    /// The segment running east from intersection `(i, j)`.
    pub fn h_seg(&self, i: usize, j: usize) -> usize {
        j * (self.n - 1) + i
    }

    /// The segment running north from intersection `(i, j)`.
    pub fn v_seg(&self, i: usize, j: usize) -> usize {
        self.n * (self.n - 1) + i * (self.n - 1) + j
    }

    pub fn center(&self, i: usize, j: usize) -> (f64, f64) {
        (self.origin_x + i as f64 * self.spacing, j as f64 * self.spacing)
    }

    /// Builds the city. `extra` attaches more links, as `(isec, side, link)`, to sides the grid leaves open.
    pub fn build(&self, extra: &[(usize, usize, IsecLink)]) -> CityRoads {
        let (n, s) = (self.n, self.spacing);
        let far = (n - 1) as f64 * s;
        let mut roads = CityRoads::new();

        for j in 0..n {
            let (_, y) = self.center(0, j);
            let x0 = self.origin_x;
            roads.add_road(flat(x0, x0 + far, y - 0.5, y + 0.5), 0, false);
        }
        for i in 0..n {
            let (x, _) = self.center(i, 0);
            roads.add_road(flat(x - 0.5, x + 0.5, 0.0, far), 1, false);
        }

        for j in 0..n {
            for i in 0..n - 1 {
                let ((x1, y), (x2, _)) = (self.center(i, j), self.center(i + 1, j));
                let ends = [SegLink::Isec(self.isec(i, j)), SegLink::Isec(self.isec(i + 1, j))];
                roads.add_seg(j, flat(x1 + 0.5, x2 - 0.5, y - 0.5, y + 0.5), ends);
            }
        }
        for i in 0..n {
            for j in 0..n - 1 {
                let ((x, y1), (_, y2)) = (self.center(i, j), self.center(i, j + 1));
                let ends = [SegLink::Isec(self.isec(i, j)), SegLink::Isec(self.isec(i, j + 1))];
                roads.add_seg(n + i, flat(x - 0.5, x + 0.5, y1 + 0.5, y2 - 0.5), ends);
            }
        }

        for j in 0..n {
            for i in 0..n {
                let mut links = [IsecLink::None; 4];
                if i > 0 {
                    links[0] = IsecLink::Local { road: j, seg: self.h_seg(i - 1, j) };
                }
                if i < n - 1 {
                    links[1] = IsecLink::Local { road: j, seg: self.h_seg(i, j) };
                }
                if j > 0 {
                    links[2] = IsecLink::Local { road: n + i, seg: self.v_seg(i, j - 1) };
                }
                if j < n - 1 {
                    links[3] = IsecLink::Local { road: n + i, seg: self.v_seg(i, j) };
                }
                for (isec, side, link) in extra {
                    if *isec == self.isec(i, j) {
                        assert!(links[*side].is_none(), "Side {} of intersection {} is taken", side, isec);
                        links[*side] = *link;
                    }
                }
                let (x, y) = self.center(i, j);
                roads.add_isec(flat(x - 0.5, x + 0.5, y - 0.5, y + 0.5), links);
            }
        }
        roads
    }
}

/// A flat box at ground level.
pub fn flat(x1: f64, x2: f64, y1: f64, y2: f64) -> Cube {
    Cube::from_points(Point3d::new(x1, y1, 0.0), Point3d::new(x2, y2, 0.0))
}

/// A single city built from the grid, with an empty connector network.
pub fn grid_network(grid: &Grid) -> RoadNetwork {
    RoadNetwork::new(vec![grid.build(&[])], CityRoads::new(), StoplightTiming::default())
}

/// Two 2 by 2 cities, 6 apart, joined by a connector road from the east side of
/// intersection 1 of city 0 to the west side of intersection 0 of city 1.
pub fn two_cities() -> RoadNetwork {
    let (west, east) = (Grid::new(2, 6.0), Grid::new(2, 6.0).at(20.0));
    let conn_link = IsecLink::Global { road: 0, seg: 0 };
    let city0 = west.build(&[(west.isec(1, 0), 1, conn_link)]);
    let city1 = east.build(&[(east.isec(0, 0), 0, conn_link)]);

    let mut conn = CityRoads::new();
    let road = conn.add_road(flat(6.5, 19.5, -0.5, 0.5), 0, false);
    let ends = [
        SegLink::CityIsec { city: 0, isec: west.isec(1, 0) },
        SegLink::CityIsec { city: 1, isec: east.isec(0, 0) },
    ];
    conn.add_seg(road, flat(6.5, 19.5, -0.5, 0.5), ends);
    RoadNetwork::new(vec![city0, city1], conn, StoplightTiming::default())
}

/// A 2 by 2 city whose intersection 1 has a connector road leading east to a dead end.
pub fn dead_end() -> RoadNetwork {
    let grid = Grid::new(2, 6.0);
    let city = grid.build(&[(grid.isec(1, 0), 1, IsecLink::Global { road: 0, seg: 0 })]);
    let mut conn = CityRoads::new();
    let road = conn.add_road(flat(6.5, 16.5, -0.5, 0.5), 0, false);
    conn.add_seg(road, flat(6.5, 16.5, -0.5, 0.5), [SegLink::CityIsec { city: 0, isec: 1 }, SegLink::None]);
    RoadNetwork::new(vec![city], conn, StoplightTiming::default())
}

/// A 2 by 2 city whose intersection 1 has a connector road leading east, rising by `grade`
/// per unit length over 30 units, to a dead end.
pub fn ramp(grade: f64) -> RoadNetwork {
    let grid = Grid::new(2, 6.0);
    let city = grid.build(&[(grid.isec(1, 0), 1, IsecLink::Global { road: 0, seg: 0 })]);
    let mut conn = CityRoads::new();
    let bcube = Cube::from_points(Point3d::new(6.5, -0.5, 0.0), Point3d::new(36.5, 0.5, 30.0 * grade));
    let road = conn.add_road(bcube, 0, false);
    conn.add_seg(road, bcube, [SegLink::CityIsec { city: 0, isec: 1 }, SegLink::None]);
    RoadNetwork::new(vec![city], conn, StoplightTiming::default())
}

/// Adds a plot with a parking lot of 4 rows of 10 spaces, south of the grid.
pub fn add_parking(roads: &mut CityRoads) {
    let bcube = flat(1.0, 5.0, -5.0, -1.0);
    let plot_ix = roads.add_plot(bcube, true);
    roads.add_parking_lot(ParkingLot {
        bcube: Cube::from_points(Point3d::new(1.0, -5.0, 0.0), Point3d::new(5.0, -1.0, 0.01)),
        dim: 1,
        dir: true,
        row_sz: 10,
        num_rows: 4,
        plot_ix,
    });
}

/// A moving car in the lane of segment `seg`, travelling along `dir` with its rear bumper at `rear`.
pub fn car_on_seg(roads: &RoadNetwork, city: usize, seg: usize, rear: f64, dir: bool, max_speed: f64) -> Car {
    let road = roads.get_city(city).get_seg(seg).road;
    let dim = road.dim;
    let mut lo = Point3d::new(0.0, 0.0, 0.0);
    let mut hi = Point3d::new(0.0, 0.0, CAR_HEIGHT);
    let front = if dir { rear + CAR_LEN } else { rear - CAR_LEN };
    lo[dim] = rear.min(front);
    hi[dim] = rear.max(front);
    let lane = road.lane_center(dir);
    lo[1 - dim] = lane - 0.5 * CAR_WIDTH;
    hi[1 - dim] = lane + 0.5 * CAR_WIDTH;

    let mut car = Car::new(Cube::from_points(lo, hi), dim, dir, max_speed);
    car.cur_city = city;
    car.cur_road = roads.get_city(city).get_seg(seg).road_ix;
    car.cur_seg = seg;
    car.cur_road_type = RoadType::Seg;
    car
}
