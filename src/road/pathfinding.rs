use super::{CityRoads, IsecLink, SegLink};
use pathfinding::directed::dijkstra::dijkstra;
use smallvec::SmallVec;

impl CityRoads {
    /// Finds the cheapest route between two intersections of this network,
    /// including both ends, if one exists.
    pub fn find_route(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let (route, _) = dijkstra(&from, |ix| self.successors(*ix), |ix| *ix == to)?;
        Some(route)
    }

    /// Gets the side through which a car at intersection `from` should leave to reach `to`.
    pub fn next_exit_towards(&self, from: usize, to: usize) -> Option<usize> {
        if from == to {
            return None;
        }
        let route = self.find_route(from, to)?;
        let next = *route.get(1)?;
        (0..4).find(|side| matches!(self.follow_exit(from, *side), Some((ix, _)) if ix == next))
    }

    /// Follows the segments leaving intersection `isec` through `side` to the next intersection.
    /// Returns the intersection reached and the distance travelled.
    pub(crate) fn follow_exit(&self, isec: usize, side: usize) -> Option<(usize, f64)> {
        let isec_box = &self.isecs[isec].bcube;
        let IsecLink::Local { seg, .. } = self.isecs[isec].links[side] else {
            return None;
        };
        let dir = side & 1 == 1;
        let mut seg_ix = seg;
        let mut dist = isec_box.size(side >> 1);
        // Bounded by the number of segments so a malformed loop cannot hang us
        for _ in 0..self.segs.len() {
            let seg = &self.segs[seg_ix];
            dist += seg.road.length();
            match seg.ends[dir as usize] {
                SegLink::Isec(next) => return Some((next, dist)),
                SegLink::Seg(next) => seg_ix = next,
                SegLink::None | SegLink::CityIsec { .. } => return None,
            }
        }
        None
    }

    fn successors(&self, isec: usize) -> SmallVec<[(usize, u32); 4]> {
        (0..4)
            .filter_map(|side| self.follow_exit(isec, side))
            .map(|(next, dist)| (next, (100.0 * dist).round() as u32))
            .collect()
    }
}
