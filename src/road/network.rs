use super::{Intersection, IsecLink, ParkingLot, Plot, Road, RoadSeg, RoadType, SegLink};
use crate::car::Car;
use crate::light::StoplightTiming;
use crate::math::Cube;
use crate::CONN_CITY_IX;

/// The drivable bound lookup used to keep cars on the road when resolving collisions.
pub trait RoadGeometry {
    /// Gets the box of the road, intersection or lot the car is currently on.
    fn get_bcube_for_car(&self, car: &Car) -> Cube;
}

/// The roads of one city, or of the connector network between cities.
#[derive(Clone, Debug, Default)]
pub struct CityRoads {
    pub(crate) roads: Vec<Road>,
    pub(crate) segs: Vec<RoadSeg>,
    pub(crate) isecs: Vec<Intersection>,
    pub(crate) plots: Vec<Plot>,
    pub(crate) parking_lots: Vec<ParkingLot>,
    pub(crate) tracks: Vec<Road>,
    pub(crate) tunnels: Vec<Cube>,
}

impl CityRoads {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a road, returning its index.
    pub fn add_road(&mut self, bcube: Cube, dim: usize, slope: bool) -> usize {
        self.roads.push(Road::new(bcube, dim, slope));
        self.roads.len() - 1
    }

    /// Adds a segment of road `road_ix`, returning its index.
    pub fn add_seg(&mut self, road_ix: usize, bcube: Cube, ends: [SegLink; 2]) -> usize {
        let road = self.roads.get(road_ix).expect("Segment added to a missing road");
        let seg = RoadSeg::new(Road::new(bcube, road.dim, road.slope), road_ix, ends);
        self.segs.push(seg);
        self.segs.len() - 1
    }

    /// Adds an intersection, returning its index.
    pub fn add_isec(&mut self, bcube: Cube, links: [IsecLink; 4]) -> usize {
        self.isecs.push(Intersection::new(bcube, links));
        self.isecs.len() - 1
    }

    /// Records which city the connector road of an intersection leads to.
    pub fn set_conn_to_city(&mut self, isec: usize, city: usize) {
        self.isecs[isec].conn_to_city = Some(city);
    }

    pub fn add_plot(&mut self, bcube: Cube, has_parking: bool) -> usize {
        self.plots.push(Plot { bcube, has_parking });
        self.plots.len() - 1
    }

    pub fn add_parking_lot(&mut self, lot: ParkingLot) -> usize {
        self.parking_lots.push(lot);
        self.parking_lots.len() - 1
    }

    /// Adds a stretch of rail track.
    pub fn add_tracks(&mut self, bcube: Cube, dim: usize) -> usize {
        self.tracks.push(Road::new(bcube, dim, false));
        self.tracks.len() - 1
    }

    pub fn add_tunnel(&mut self, bcube: Cube) {
        self.tunnels.push(bcube);
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn segs(&self) -> &[RoadSeg] {
        &self.segs
    }

    pub fn isecs(&self) -> &[Intersection] {
        &self.isecs
    }

    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    pub fn parking_lots(&self) -> &[ParkingLot] {
        &self.parking_lots
    }

    pub fn tracks(&self) -> &[Road] {
        &self.tracks
    }

    pub fn tunnels(&self) -> &[Cube] {
        &self.tunnels
    }

    pub fn get_seg(&self, ix: usize) -> &RoadSeg {
        self.segs.get(ix).expect("Segment index out of range")
    }

    pub fn get_isec(&self, ix: usize) -> &Intersection {
        self.isecs.get(ix).expect("Intersection index out of range")
    }

    /// Whether the point lies inside one of this network's tunnels.
    pub fn in_tunnel(&self, pos: crate::math::Point3d) -> bool {
        self.tunnels.iter().any(|t| t.contains_pt_xy(pos))
    }

    /// The intersection whose connector road leads to `city`.
    pub fn find_conn_isec(&self, city: usize) -> Option<usize> {
        self.isecs
            .iter()
            .position(|isec| isec.conn_to_city == Some(city))
    }

    fn reset_seg_counts(&self) {
        for seg in &self.segs {
            seg.next_frame();
        }
    }

    fn validate(&self, city: usize, num_cities: usize, conn: Option<&CityRoads>) {
        let is_conn = conn.is_none();
        for (ix, seg) in self.segs.iter().enumerate() {
            assert!(seg.road_ix < self.roads.len(), "Segment {} of city {} has no road", ix, city);
            for end in seg.ends {
                match end {
                    SegLink::None => {}
                    SegLink::Seg(s) => assert!(s < self.segs.len(), "Segment {} links to missing segment {}", ix, s),
                    SegLink::Isec(i) => assert!(i < self.isecs.len(), "Segment {} links to missing intersection {}", ix, i),
                    SegLink::CityIsec { city: c, .. } => {
                        assert!(is_conn, "Only connector roads may lead into a city");
                        assert!(c < num_cities, "Connector segment {} leads to missing city {}", ix, c);
                    }
                }
            }
        }
        for (ix, isec) in self.isecs.iter().enumerate() {
            for link in isec.links {
                match link {
                    IsecLink::None => {}
                    IsecLink::Local { road, seg } => {
                        assert!(road < self.roads.len() && seg < self.segs.len(), "Intersection {} of city {} has a dangling link", ix, city);
                    }
                    IsecLink::Global { road, seg } => {
                        let conn = conn.expect("Connector intersections cannot link to the connector network");
                        assert!(road < conn.roads.len() && seg < conn.segs.len(), "Intersection {} of city {} has a dangling connector link", ix, city);
                    }
                }
            }
            if let Some(c) = isec.conn_to_city {
                assert!(c < num_cities, "Intersection {} connects to missing city {}", ix, c);
            }
        }
    }
}

/// All cities plus the connector network joining them.
#[derive(Clone, Debug)]
pub struct RoadNetwork {
    cities: Vec<CityRoads>,
    conn: CityRoads,
    /// Time not yet applied to the stoplights of idle networks, indexed like `cities` with the connector last.
    lag_secs: Vec<f64>,
}

impl RoadNetwork {
    /// Takes over finished road geometry. Panics if any cross reference dangles.
    pub fn new(cities: Vec<CityRoads>, conn: CityRoads, timing: StoplightTiming) -> Self {
        timing.validate();
        let num_cities = cities.len();
        assert!(num_cities < CONN_CITY_IX, "Too many cities");
        for (ix, city) in cities.iter().enumerate() {
            city.validate(ix, num_cities, Some(&conn));
        }
        conn.validate(CONN_CITY_IX, num_cities, None);

        for seg in &conn.segs {
            for end in seg.ends {
                if let SegLink::CityIsec { city, isec } = end {
                    assert!(isec < cities[city].isecs.len(), "Connector leads to missing intersection {} of city {}", isec, city);
                }
            }
        }

        let mut network = Self {
            lag_secs: vec![0.0; num_cities + 1],
            cities,
            conn,
        };
        for isec in &mut network.conn.isecs {
            isec.init_stoplight(true, timing);
        }
        for city in 0..num_cities {
            for ix in 0..network.cities[city].isecs.len() {
                let conn_to_city = network.trace_conn_to_city(city, ix);
                let isec = &mut network.cities[city].isecs[ix];
                let at_conn_road = isec.is_global_conn_int();
                isec.init_stoplight(at_conn_road, timing);
                if isec.conn_to_city.is_none() {
                    isec.conn_to_city = conn_to_city;
                }
            }
        }
        network
    }

    pub fn num_cities(&self) -> usize {
        self.cities.len()
    }

    /// Gets a city, or the connector network for [CONN_CITY_IX].
    pub fn city(&self, ix: usize) -> Option<&CityRoads> {
        if ix == CONN_CITY_IX {
            Some(&self.conn)
        } else {
            self.cities.get(ix)
        }
    }

    /// Like [Self::city], but panics on a bad index.
    pub fn get_city(&self, ix: usize) -> &CityRoads {
        self.city(ix).expect("City index out of range")
    }

    pub fn conn_roads(&self) -> &CityRoads {
        &self.conn
    }

    /// Iterates over every network with its city index; the connector network comes last.
    pub fn networks(&self) -> impl Iterator<Item = (usize, &CityRoads)> {
        self.cities
            .iter()
            .enumerate()
            .chain(std::iter::once((CONN_CITY_IX, &self.conn)))
    }

    /// Starts a frame: resets segment counts and advances the stoplights of busy networks.
    /// Idle networks accumulate the elapsed time and are fast-forwarded once they are busy again.
    pub fn next_frame(&mut self, dt: f64, is_busy: impl Fn(usize) -> bool) {
        let num_cities = self.cities.len();
        for slot in 0..=num_cities {
            let city = if slot == num_cities { CONN_CITY_IX } else { slot };
            let busy = is_busy(city);
            let lag = std::mem::take(&mut self.lag_secs[slot]);
            let roads = self.network_mut(city);
            roads.reset_seg_counts();
            for isec in &mut roads.isecs {
                let light = isec.stoplight_mut();
                if busy {
                    if lag > 0.0 {
                        light.ffwd_to_future(lag);
                    }
                    light.next_frame(dt);
                } else {
                    light.reset_blocked();
                }
            }
            if !busy {
                self.lag_secs[slot] = lag + dt;
            }
        }
    }

    /// Brings the stoplights of every idle network up to the present.
    pub fn catch_up_lights(&mut self) {
        let num_cities = self.cities.len();
        for slot in 0..=num_cities {
            let lag = std::mem::take(&mut self.lag_secs[slot]);
            if lag <= 0.0 {
                continue;
            }
            let city = if slot == num_cities { CONN_CITY_IX } else { slot };
            log::trace!("fast-forwarding stoplights of city {} by {:.2}s", city, lag);
            for isec in &mut self.network_mut(city).isecs {
                isec.stoplight_mut().ffwd_to_future(lag);
            }
        }
    }

    /// The time the stoplights of a network are behind.
    pub fn lag_secs(&self, city: usize) -> f64 {
        let slot = if city == CONN_CITY_IX { self.cities.len() } else { city };
        self.lag_secs[slot]
    }

    /// Gets the segment a car on a segment is driving on.
    pub fn seg_for_car(&self, car: &Car) -> &RoadSeg {
        assert_eq!(car.cur_road_type, RoadType::Seg, "Car is not on a segment");
        self.get_city(car.cur_city).get_seg(car.cur_seg)
    }

    /// Gets the intersection a car is crossing.
    pub fn isec_for_car(&self, car: &Car) -> &Intersection {
        assert!(car.in_isect(), "Car is not in an intersection");
        self.get_city(car.cur_city).get_isec(car.cur_seg)
    }

    /// Gets the segment entered by leaving intersection `isec` of `city` through `side`.
    /// Returns the city of the segment, its road and its index.
    pub fn exit_seg(&self, city: usize, isec: usize, side: usize) -> Option<(usize, usize, usize)> {
        match self.get_city(city).get_isec(isec).links[side] {
            IsecLink::None => None,
            IsecLink::Local { road, seg } => Some((city, road, seg)),
            IsecLink::Global { road, seg } => Some((CONN_CITY_IX, road, seg)),
        }
    }

    fn network_mut(&mut self, city: usize) -> &mut CityRoads {
        if city == CONN_CITY_IX {
            &mut self.conn
        } else {
            &mut self.cities[city]
        }
    }

    /// Follows the connector road leaving a city intersection to the city at its far end.
    fn trace_conn_to_city(&self, city: usize, isec: usize) -> Option<usize> {
        let isec = &self.cities[city].isecs[isec];
        let side = isec.global_side()?;
        let IsecLink::Global { seg, .. } = isec.links[side] else {
            return None;
        };
        let dir = side & 1 == 1;
        let mut seg_ix = seg;
        for _ in 0..self.conn.segs.len() {
            match self.conn.segs[seg_ix].ends[dir as usize] {
                SegLink::Seg(next) => seg_ix = next,
                SegLink::CityIsec { city, .. } => return Some(city),
                SegLink::None | SegLink::Isec(_) => return None,
            }
        }
        None
    }
}

impl RoadGeometry for RoadNetwork {
    fn get_bcube_for_car(&self, car: &Car) -> Cube {
        let Some(city) = self.city(car.cur_city) else {
            return Cube::all_zeros();
        };
        let bcube = match car.cur_road_type {
            RoadType::Seg => city.segs.get(car.cur_seg).map(|s| s.road.bcube),
            RoadType::Isec2 | RoadType::Isec3 | RoadType::Isec4 => {
                city.isecs.get(car.cur_seg).map(|i| i.bcube)
            }
            RoadType::ParkLot => city.parking_lots.get(car.cur_seg).map(|p| p.bcube),
            RoadType::Plot => city.plots.get(car.cur_road).map(|p| p.bcube),
            RoadType::Tracks => city.tracks.get(car.cur_road).map(|t| t.bcube),
        };
        bcube.unwrap_or_else(Cube::all_zeros)
    }
}
