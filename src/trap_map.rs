use anyhow::{bail, Result};
use itertools::Itertools;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashSet, VecDeque};

use crate::dag::Dag;
use crate::geometry::{Point, Segment, EPS};
use crate::point_locator::PointLocator;

/// Trapezoidal map data structure.
///
/// This is essentially a directed acyclic graph (a.k.a. a DAG)
/// where the nodes can be one of three kinds:
/// - an x-node (a decision on a segment endpoint)
/// - a y-node (a decision on a segment)
/// - a trapezoid-node (a leaf holding a face of the subdivision)
///
/// The inner nodes of the DAG can only be x- and y-nodes, while
/// the leaf nodes can only be trapezoid-nodes.
///
/// Segments are inserted one at a time. Each insertion first locates the
/// trapezoids crossed by the segment (a DAG walk for the left endpoint, then a
/// left-to-right walk along trapezoid adjacency), replaces each of them with
/// its successors, and rewrites the leaves so that every former access path
/// reaches the correct new subtree. When the segment crosses several
/// trapezoids, the faces directly above and below it are extended across the
/// crossing instead of being reallocated, which is what makes the search
/// structure a DAG: a single leaf can end up reachable through several
/// decision nodes.
///
/// With segments inserted in random order the expected depth of the search
/// structure is *O*(log(*n*)) and construction takes expected
/// *O*(*n* \* log(*n*)) time (see [De Berg et al.]). Adversarial orders can
/// degrade the depth to linear, which is why [`TrapMap::from_segments`]
/// shuffles its input.
///
/// [De Berg et al.]: https://doi.org/10.1007/978-3-540-77974-2
#[derive(Debug)]
pub struct TrapMap {
    pub(crate) dag: Dag<Node>,
    pub(crate) bbox: BoundingBox,
}

#[derive(Clone, Debug)]
pub(crate) enum Node {
    X(Point),
    Y(Segment),
    Trap(Trapezoid),
}

impl Node {
    pub(crate) fn get_trap(&self) -> &Trapezoid {
        let Self::Trap(trap) = self else {
            panic!("This is not a Trapezoid")
        };
        trap
    }

    pub(crate) fn get_trap_mut(&mut self) -> &mut Trapezoid {
        let Self::Trap(trap) = self else {
            panic!("This is not a Trapezoid")
        };
        trap
    }
}

/// A face of the subdivision.
///
/// It is bounded above and below by (parts of) two segments, and on the left
/// and right by the vertical extents through two points. The neighbor slots
/// hold the indices of the up to four adjacent faces; a slot is [`None`] at
/// the boundary of the subdivision.
#[derive(Clone, Debug)]
pub struct Trapezoid {
    pub(crate) top: Segment,
    pub(crate) bottom: Segment,
    pub(crate) leftp: Point,
    pub(crate) rightp: Point,
    pub(crate) lower_left: Option<usize>,
    pub(crate) upper_left: Option<usize>,
    pub(crate) lower_right: Option<usize>,
    pub(crate) upper_right: Option<usize>,
}

impl Trapezoid {
    pub(crate) fn new(top: Segment, bottom: Segment, leftp: Point, rightp: Point) -> Self {
        Self {
            top,
            bottom,
            leftp,
            rightp,
            lower_left: None,
            upper_left: None,
            lower_right: None,
            upper_right: None,
        }
    }

    /// The segment bounding the face from above.
    pub fn top(&self) -> Segment {
        self.top
    }

    /// The segment bounding the face from below.
    pub fn bottom(&self) -> Segment {
        self.bottom
    }

    /// The point whose vertical extent bounds the face on the left.
    pub fn leftp(&self) -> Point {
        self.leftp
    }

    /// The point whose vertical extent bounds the face on the right.
    pub fn rightp(&self) -> Point {
        self.rightp
    }

    /// Returns `true` if `pt` lies below the top, above the bottom, right of
    /// the left point and left of the right point.
    pub fn is_inside(&self, pt: Point) -> bool {
        self.top.is_upper(pt)
            && !self.bottom.is_upper(pt)
            && self.leftp.is_left(pt)
            && !self.rightp.is_left(pt)
    }

    /// Replaces any left neighbor slot equal to `prv` with `cur`.
    fn relink_left(&mut self, prv: Option<usize>, cur: Option<usize>) {
        if self.lower_left == prv {
            self.lower_left = cur;
        }
        if self.upper_left == prv {
            self.upper_left = cur;
        }
    }

    /// Replaces any right neighbor slot equal to `prv` with `cur`.
    fn relink_right(&mut self, prv: Option<usize>, cur: Option<usize>) {
        if self.lower_right == prv {
            self.lower_right = cur;
        }
        if self.upper_right == prv {
            self.upper_right = cur;
        }
    }
}

#[derive(Debug)]
pub(crate) struct BoundingBox {
    pub(crate) xmin: f64,
    pub(crate) xmax: f64,
    pub(crate) ymin: f64,
    pub(crate) ymax: f64,
}

impl BoundingBox {
    fn from_segments(segments: &[Segment]) -> Self {
        let (xmin, xmax) = segments
            .iter()
            .flat_map(|s| [s.pl.x, s.pr.x])
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()
            .expect("There should be at least one segment");
        let (ymin, ymax) = segments
            .iter()
            .flat_map(|s| [s.pl.y, s.pr.y])
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()
            .expect("There should be at least one segment");
        Self {
            xmin: xmin - 0.1,
            xmax: xmax + 0.1,
            ymin: ymin - 0.1,
            ymax: ymax + 0.1,
        }
    }

    fn contains(&self, p: Point) -> bool {
        self.xmin < p.x && p.x < self.xmax && self.ymin < p.y && p.y < self.ymax
    }
}

impl TrapMap {
    /// Creates a trapezoidal map covering the box spanned by two opposite
    /// corners.
    ///
    /// All segments inserted afterwards and all query points must lie inside
    /// the box; this is not checked.
    pub fn new(bottom_left: Point, top_right: Point) -> Self {
        let top_left = Point::new(bottom_left.x, top_right.y);
        let bottom_right = Point::new(top_right.x, bottom_left.y);
        let top = Segment::new(top_left, top_right);
        let bottom = Segment::new(bottom_left, bottom_right);

        let mut dag = Dag::new();
        dag.add(Node::Trap(Trapezoid::new(top, bottom, bottom_left, top_right)));

        Self {
            dag,
            bbox: BoundingBox {
                xmin: bottom_left.x,
                xmax: top_right.x,
                ymin: bottom_left.y,
                ymax: top_right.y,
            },
        }
    }

    /// Builds a trapezoidal map from a batch of segments.
    ///
    /// The bounding box is derived from the segment extents, and the segments
    /// are shuffled with a fixed seed before insertion to get good expected
    /// depth (this is a randomized incremental algorithm after all!).
    ///
    /// # Errors
    ///
    /// Fails if the batch is empty or contains a vertical segment. The other
    /// input assumptions (segments don't cross except at shared endpoints, no
    /// endpoint on another segment's interior) are *not* checked and violating
    /// them leaves the map in an unspecified state.
    pub fn from_segments(mut segments: Vec<Segment>) -> Result<Self> {
        if segments.is_empty() {
            bail!("Cannot build a trapezoidal map from zero segments");
        }
        for s in &segments {
            if s.pr.x - s.pl.x < EPS {
                bail!("Vertical segments are not supported: {s:?}");
            }
        }

        let bbox = BoundingBox::from_segments(&segments);
        let mut trap_map = Self::new(
            Point::new(bbox.xmin, bbox.ymin),
            Point::new(bbox.xmax, bbox.ymax),
        );

        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        segments.shuffle(&mut rng);

        for s in segments {
            trap_map.insert(s);
        }

        Ok(trap_map)
    }

    /// Inserts a segment.
    ///
    /// The segment may share endpoints with previously inserted segments but
    /// must not cross any of them, and its interior must not pass through an
    /// existing vertex. Violations are not detected.
    pub fn insert(&mut self, s: Segment) {
        let pr = s.pr;

        let mut cur = self.find_leaf(s.pl);
        if self.trap(cur).is_inside(pr) {
            self.split_single(cur, s);
            return;
        }

        // The segment leaves the first trapezoid; walk the crossed trapezoids
        // from left to right, splitting each one as we go. The successor has
        // to be looked up before the split tears the current one down.
        let mut next = self.next_trapezoid(cur, s);
        let (mut above, mut below) = self.split_left_end(cur, s);
        cur = next;

        while !self.trap(cur).is_inside(pr) {
            next = self.next_trapezoid(cur, s);
            (above, below) = self.split_interior(cur, s, above, below);
            cur = next;
        }

        self.split_right_end(cur, s, above, below);
    }

    /// Returns the face containing the query point.
    ///
    /// The point is assumed to lie inside the bounding box. For a point within
    /// the tolerance of a segment or an inserted endpoint the answer is
    /// unspecified.
    pub fn locate(&self, point: Point) -> &Trapezoid {
        self.dag.get(self.find_leaf(point)).unwrap().data.get_trap()
    }

    /// Walks the DAG from the root down to a leaf.
    pub(crate) fn find_leaf(&self, point: Point) -> usize {
        let mut node_id = 0;
        loop {
            let node = self.dag.get(node_id).unwrap();
            node_id = match &node.data {
                Node::Trap(..) => break,
                // A point to the right of the split point goes right; ties go left.
                Node::X(p) => {
                    if p.is_left(point) {
                        node.children[1]
                    } else {
                        node.children[0]
                    }
                }
                // children[0] is the face above the segment, children[1] the one below.
                Node::Y(s) => {
                    if s.is_upper(point) {
                        node.children[1]
                    } else {
                        node.children[0]
                    }
                }
            };
        }
        node_id
    }

    fn trap(&self, idx: usize) -> &Trapezoid {
        self.dag.get(idx).unwrap().data.get_trap()
    }

    /// The trapezoid the segment continues into on the right.
    ///
    /// Since the segment does not pass through any vertex, it exits either
    /// above or below the current right point, which picks one of the two
    /// right neighbors.
    fn next_trapezoid(&self, idx: usize, s: Segment) -> usize {
        let trap = self.trap(idx);
        if s.is_upper(trap.rightp) {
            trap.upper_right
                .expect("There should be an upper right trap")
        } else {
            trap.lower_right
                .expect("There should be a lower right trap")
        }
    }

    /// Both endpoints fall inside a single trapezoid, which is replaced by
    /// four new ones: the remainders left of `pl` and right of `pr`, and the
    /// faces above and below the segment.
    fn split_single(&mut self, a_idx: usize, s: Segment) {
        let a = self.trap(a_idx).clone();
        let Segment { pl: p, pr: q } = s;

        let u_idx = self
            .dag
            .add(Node::Trap(Trapezoid::new(a.top, a.bottom, a.leftp, p)));
        let y_idx = self.dag.add(Node::Trap(Trapezoid::new(a.top, s, p, q)));
        let z_idx = self.dag.add(Node::Trap(Trapezoid::new(s, a.bottom, p, q)));
        let x_idx = self
            .dag
            .add(Node::Trap(Trapezoid::new(a.top, a.bottom, q, a.rightp)));

        self.dag.entry(u_idx).and_modify(|node| {
            let u = node.get_trap_mut();
            u.upper_left = a.upper_left;
            u.lower_left = a.lower_left;
            u.upper_right = Some(y_idx);
            u.lower_right = Some(z_idx);
        });
        self.dag.entry(y_idx).and_modify(|node| {
            let y = node.get_trap_mut();
            y.upper_left = Some(u_idx);
            y.lower_left = Some(u_idx);
            y.upper_right = Some(x_idx);
            y.lower_right = Some(x_idx);
        });
        self.dag.entry(z_idx).and_modify(|node| {
            let z = node.get_trap_mut();
            z.upper_left = Some(u_idx);
            z.lower_left = Some(u_idx);
            z.upper_right = Some(x_idx);
            z.lower_right = Some(x_idx);
        });
        self.dag.entry(x_idx).and_modify(|node| {
            let x = node.get_trap_mut();
            x.upper_left = Some(y_idx);
            x.lower_left = Some(z_idx);
            x.upper_right = a.upper_right;
            x.lower_right = a.lower_right;
        });

        self.relink_left_of(a.lower_right, Some(a_idx), Some(x_idx));
        self.relink_left_of(a.upper_right, Some(a_idx), Some(x_idx));
        self.relink_right_of(a.lower_left, Some(a_idx), Some(u_idx));
        self.relink_right_of(a.upper_left, Some(a_idx), Some(u_idx));

        self.replace_leaf(a_idx, Some(u_idx), Some(x_idx), y_idx, z_idx, s);
    }

    /// First trapezoid crossed by a segment that spans several: split off the
    /// remainder left of `pl` and start the two running faces above and below
    /// the segment. Returns their indices for the following steps.
    fn split_left_end(&mut self, a_idx: usize, s: Segment) -> (usize, usize) {
        let a = self.trap(a_idx).clone();
        let p = s.pl;

        let x_idx = self
            .dag
            .add(Node::Trap(Trapezoid::new(a.top, a.bottom, a.leftp, p)));
        // The right point of a running face is provisional until the face is
        // closed off, here or in a later step.
        let y_idx = self.dag.add(Node::Trap(Trapezoid::new(a.top, s, p, p)));
        let z_idx = self.dag.add(Node::Trap(Trapezoid::new(s, a.bottom, p, p)));

        self.dag.entry(x_idx).and_modify(|node| {
            let x = node.get_trap_mut();
            x.upper_left = a.upper_left;
            x.lower_left = a.lower_left;
            x.upper_right = Some(y_idx);
            x.lower_right = Some(z_idx);
        });
        self.relink_right_of(a.lower_left, Some(a_idx), Some(x_idx));
        self.relink_right_of(a.upper_left, Some(a_idx), Some(x_idx));

        self.dag.entry(y_idx).and_modify(|node| {
            let y = node.get_trap_mut();
            y.upper_left = Some(x_idx);
            y.lower_left = Some(x_idx);
        });
        self.dag.entry(z_idx).and_modify(|node| {
            let z = node.get_trap_mut();
            z.upper_left = Some(x_idx);
            z.lower_left = Some(x_idx);
        });

        self.close_right_side(a_idx, &a, s, y_idx, z_idx);

        self.replace_leaf(a_idx, Some(x_idx), None, y_idx, z_idx, s);

        (y_idx, z_idx)
    }

    /// Trapezoid crossed in the middle: the segment only splits it
    /// horizontally. The running face on the side the walk entered from
    /// extends through unchanged (keeping its leaf, which gains one more path
    /// leading to it), while the other side gets a fresh face hooked up to the
    /// previous step's piece.
    fn split_interior(
        &mut self,
        a_idx: usize,
        s: Segment,
        p_above: usize,
        p_below: usize,
    ) -> (usize, usize) {
        let a = self.trap(a_idx).clone();

        let (y_idx, z_idx);
        if s.is_upper(a.leftp) {
            // The left point is below the segment: the upper face continues.
            y_idx = p_above;
            z_idx = self
                .dag
                .add(Node::Trap(Trapezoid::new(s, a.bottom, a.leftp, a.leftp)));
            self.dag.entry(z_idx).and_modify(|node| {
                let z = node.get_trap_mut();
                z.upper_left = Some(p_below);
                z.lower_left = Some(p_below);
            });
            if self.trap(p_below).lower_right.is_none() {
                self.dag
                    .entry(z_idx)
                    .and_modify(|node| node.get_trap_mut().lower_left = a.lower_left);
                self.relink_right_of(a.lower_left, Some(a_idx), Some(z_idx));
            }
            self.dag
                .entry(p_below)
                .and_modify(|node| node.get_trap_mut().relink_right(None, Some(z_idx)));
        } else {
            z_idx = p_below;
            y_idx = self
                .dag
                .add(Node::Trap(Trapezoid::new(a.top, s, a.leftp, a.leftp)));
            self.dag.entry(y_idx).and_modify(|node| {
                let y = node.get_trap_mut();
                y.upper_left = Some(p_above);
                y.lower_left = Some(p_above);
            });
            if self.trap(p_above).upper_right.is_none() {
                self.dag
                    .entry(y_idx)
                    .and_modify(|node| node.get_trap_mut().upper_left = a.upper_left);
                self.relink_right_of(a.upper_left, Some(a_idx), Some(y_idx));
            }
            self.dag
                .entry(p_above)
                .and_modify(|node| node.get_trap_mut().relink_right(None, Some(y_idx)));
        }

        self.close_right_side(a_idx, &a, s, y_idx, z_idx);

        self.replace_leaf(a_idx, None, None, y_idx, z_idx, s);

        (y_idx, z_idx)
    }

    /// Last trapezoid crossed: both running faces are closed off at `pr` and
    /// the remainder right of `pr` is split off.
    fn split_right_end(&mut self, a_idx: usize, s: Segment, p_above: usize, p_below: usize) {
        let a = self.trap(a_idx).clone();
        let q = s.pr;

        let merge_above = s.is_upper(a.leftp);
        let (y_idx, z_idx);
        if merge_above {
            y_idx = p_above;
            z_idx = self
                .dag
                .add(Node::Trap(Trapezoid::new(s, a.bottom, a.leftp, q)));
        } else {
            z_idx = p_below;
            y_idx = self
                .dag
                .add(Node::Trap(Trapezoid::new(a.top, s, a.leftp, q)));
        }
        let x_idx = self
            .dag
            .add(Node::Trap(Trapezoid::new(a.top, a.bottom, q, a.rightp)));

        self.dag.entry(x_idx).and_modify(|node| {
            let x = node.get_trap_mut();
            x.upper_left = Some(y_idx);
            x.lower_left = Some(z_idx);
            x.upper_right = a.upper_right;
            x.lower_right = a.lower_right;
        });
        self.dag.entry(y_idx).and_modify(|node| {
            let y = node.get_trap_mut();
            y.upper_right = Some(x_idx);
            y.lower_right = Some(x_idx);
            y.rightp = q;
        });
        self.dag.entry(z_idx).and_modify(|node| {
            let z = node.get_trap_mut();
            z.upper_right = Some(x_idx);
            z.lower_right = Some(x_idx);
            z.rightp = q;
        });

        if merge_above {
            self.dag.entry(z_idx).and_modify(|node| {
                let z = node.get_trap_mut();
                z.upper_left = Some(p_below);
                z.lower_left = Some(p_below);
            });
            if self.trap(p_below).lower_right.is_none() {
                self.dag
                    .entry(z_idx)
                    .and_modify(|node| node.get_trap_mut().lower_left = a.lower_left);
                self.relink_right_of(a.lower_left, Some(a_idx), Some(z_idx));
            }
            self.dag
                .entry(p_below)
                .and_modify(|node| node.get_trap_mut().relink_right(None, Some(z_idx)));
        } else {
            self.dag.entry(y_idx).and_modify(|node| {
                let y = node.get_trap_mut();
                y.upper_left = Some(p_above);
                y.lower_left = Some(p_above);
            });
            if self.trap(p_above).upper_right.is_none() {
                self.dag
                    .entry(y_idx)
                    .and_modify(|node| node.get_trap_mut().upper_left = a.upper_left);
                self.relink_right_of(a.upper_left, Some(a_idx), Some(y_idx));
            }
            self.dag
                .entry(p_above)
                .and_modify(|node| node.get_trap_mut().relink_right(None, Some(y_idx)));
        }

        self.relink_left_of(a.lower_right, Some(a_idx), Some(x_idx));
        self.relink_left_of(a.upper_right, Some(a_idx), Some(x_idx));

        self.replace_leaf(a_idx, None, Some(x_idx), y_idx, z_idx, s);
    }

    /// Closes off whichever running face reaches the old right point; the
    /// other keeps its provisional right side for a later step to finish.
    fn close_right_side(
        &mut self,
        a_idx: usize,
        a: &Trapezoid,
        s: Segment,
        y_idx: usize,
        z_idx: usize,
    ) {
        if s.is_upper(a.rightp) {
            // The old right point sits below the segment, so it terminates the
            // lower face; the walk continues through the upper right neighbor.
            self.dag
                .entry(z_idx)
                .and_modify(|node| node.get_trap_mut().rightp = a.rightp);
            if !a.rightp.is_same(a.bottom.pr) {
                self.dag
                    .entry(z_idx)
                    .and_modify(|node| node.get_trap_mut().lower_right = a.lower_right);
                self.relink_left_of(a.lower_right, Some(a_idx), Some(z_idx));
            }
        } else {
            self.dag
                .entry(y_idx)
                .and_modify(|node| node.get_trap_mut().rightp = a.rightp);
            if !a.rightp.is_same(a.top.pr) {
                self.dag
                    .entry(y_idx)
                    .and_modify(|node| node.get_trap_mut().upper_right = a.upper_right);
                self.relink_left_of(a.upper_right, Some(a_idx), Some(y_idx));
            }
        }
    }

    /// Rewrites the leaf at `old_idx` into the root of the subtree replacing
    /// it, so that every path that used to reach the leaf now reaches the
    /// subtree. Depending on which endpoints fall inside the old trapezoid,
    /// the subtree needs zero, one or two x-nodes above the y-node.
    fn replace_leaf(
        &mut self,
        old_idx: usize,
        left_idx: Option<usize>,
        right_idx: Option<usize>,
        above_idx: usize,
        below_idx: usize,
        s: Segment,
    ) {
        let Segment { pl: p, pr: q } = s;

        let si = match (left_idx, right_idx) {
            (None, None) => {
                // No x-node to add => the leaf itself becomes the y-node
                self.dag.entry(old_idx).and_modify(|node| *node = Node::Y(s));
                old_idx
            }
            (None, Some(right_idx)) => {
                // One x-node on the q endpoint, then the y-node
                self.dag.entry(old_idx).and_modify(|node| *node = Node::X(q));
                let si = self
                    .dag
                    .entry(old_idx)
                    .append_new(Node::Y(s))
                    .expect("This should be a valid node");
                self.dag.entry(old_idx).append(right_idx);
                si
            }
            (Some(left_idx), None) => {
                // One x-node on the p endpoint, then the y-node
                self.dag.entry(old_idx).and_modify(|node| *node = Node::X(p));
                self.dag.entry(old_idx).append(left_idx);
                self.dag
                    .entry(old_idx)
                    .append_new(Node::Y(s))
                    .expect("This should be a valid node")
            }
            (Some(left_idx), Some(right_idx)) => {
                // Two x-nodes (one per endpoint), then the y-node
                self.dag.entry(old_idx).and_modify(|node| *node = Node::X(p));
                self.dag.entry(old_idx).append(left_idx);
                let qi = self
                    .dag
                    .entry(old_idx)
                    .append_new(Node::X(q))
                    .expect("This should be a valid node");
                let si = self
                    .dag
                    .entry(qi)
                    .append_new(Node::Y(s))
                    .expect("This should be a valid node");
                self.dag.entry(qi).append(right_idx);
                si
            }
        };

        self.dag.entry(si).append(above_idx);
        self.dag.entry(si).append(below_idx);
    }

    fn relink_left_of(&mut self, neighbor: Option<usize>, prv: Option<usize>, cur: Option<usize>) {
        if let Some(idx) = neighbor {
            self.dag
                .entry(idx)
                .and_modify(|node| node.get_trap_mut().relink_left(prv, cur));
        }
    }

    fn relink_right_of(&mut self, neighbor: Option<usize>, prv: Option<usize>, cur: Option<usize>) {
        if let Some(idx) = neighbor {
            self.dag
                .entry(idx)
                .and_modify(|node| node.get_trap_mut().relink_right(prv, cur));
        }
    }

    /// Length of the longest search path from the root to a leaf.
    ///
    /// Exposed for performance observation; with random insertion order this
    /// stays logarithmic in the number of segments with high probability.
    pub fn max_depth(&self) -> usize {
        self.dag.max_depth()
    }

    /// Checks some invariants of the DAG.
    ///
    /// This is meant for debugging purposes.
    ///
    /// # Panics
    ///
    /// Panics if a node is unreachable from the root, if an inner node is not
    /// binary, if a leaf is not a trapezoid, or if a neighbor slot refers to a
    /// node that is no longer a trapezoid.
    pub fn check(&self) {
        let mut seen = HashSet::from([0]);
        let mut queue = VecDeque::from([0]);
        while let Some(idx) = queue.pop_front() {
            for &child in &self.dag.get(idx).unwrap().children {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        for (idx, node) in self.dag.iter().enumerate() {
            assert!(
                seen.contains(&idx),
                "All nodes should be reachable from the root"
            );
            match &node.data {
                Node::Trap(trap) => {
                    assert!(node.children.is_empty(), "Trapezoid nodes should be leaves");
                    for neighbor in [
                        trap.lower_left,
                        trap.upper_left,
                        trap.lower_right,
                        trap.upper_right,
                    ]
                    .into_iter()
                    .flatten()
                    {
                        assert!(
                            matches!(self.dag.get(neighbor).unwrap().data, Node::Trap(..)),
                            "Neighbor slots should only refer to live trapezoids"
                        );
                    }
                }
                _ => assert_eq!(
                    node.children.len(),
                    2,
                    "Inner nodes should have two children"
                ),
            }
        }
    }

    /// Returns the number of x-nodes in the DAG.
    pub fn x_node_count(&self) -> usize {
        self.dag
            .iter()
            .filter(|&node| matches!(node.data, Node::X(..)))
            .count()
    }

    /// Returns the number of y-nodes in the DAG.
    pub fn y_node_count(&self) -> usize {
        self.dag
            .iter()
            .filter(|&node| matches!(node.data, Node::Y(..)))
            .count()
    }

    /// Returns the number of trapezoid-nodes in the DAG.
    pub fn trap_count(&self) -> usize {
        self.dag
            .iter()
            .filter(|&node| matches!(node.data, Node::Trap(..)))
            .count()
    }

    /// Returns the number of nodes of each kind in the DAG.
    pub fn node_count(&self) -> (usize, usize, usize) {
        self.dag.iter().fold(
            (0, 0, 0),
            |(mut x_count, mut y_count, mut trap_count), node| {
                match node.data {
                    Node::X(..) => x_count += 1,
                    Node::Y(..) => y_count += 1,
                    Node::Trap(..) => trap_count += 1,
                };
                (x_count, y_count, trap_count)
            },
        )
    }

    /// Prints some statistics of the DAG.
    ///
    /// Useful for debugging purposes.
    pub fn print_stats(&self) {
        let (x_node_count, y_node_count, trap_count) = self.node_count();
        println!(
            "Trapezoidal map counts:\n\t{} X node(s)\n\t{} Y node(s)\n\t{} trapezoid(s)",
            x_node_count, y_node_count, trap_count,
        );
        println!("Max depth: {}", self.max_depth());
    }
}

impl PointLocator for TrapMap {
    fn locate_one(&self, point: &[f64; 2]) -> Option<usize> {
        let point = Point::from(*point);
        self.bbox.contains(point).then(|| self.find_leaf(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn boxed(bd: f64) -> TrapMap {
        TrapMap::new(Point::new(-bd, -bd), Point::new(bd, bd))
    }

    fn segment(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    #[test]
    fn initialize_trapezoidal_map() {
        let trap_map = boxed(100.);

        assert_eq!(trap_map.trap_count(), 1);
        assert_eq!(trap_map.max_depth(), 0);
        trap_map.check();
    }

    #[test]
    fn insert_segment_inside_one_trapezoid() {
        let mut trap_map = boxed(100.);

        trap_map.insert(segment(-8., 8., 8., 8.));

        // Left remainder, right remainder, above and below the segment
        assert_eq!(trap_map.trap_count(), 4);
        assert_eq!(trap_map.x_node_count(), 2);
        assert_eq!(trap_map.y_node_count(), 1);
        assert_eq!(trap_map.max_depth(), 3);
        trap_map.check();
    }

    #[test]
    fn insert_segment_crossing_two_trapezoids() {
        let mut trap_map = boxed(100.);
        trap_map.insert(segment(-8., 8., 8., 8.));

        // Starts above the first segment and ends right of it, so it crosses
        // the boundary at x = 8: a left-endpoint step followed by a
        // right-endpoint step, with the face above the new segment merged
        // across the boundary.
        trap_map.insert(segment(-4., 20., 20., 30.));

        assert_eq!(trap_map.trap_count(), 7);
        assert_eq!(trap_map.x_node_count(), 4);
        assert_eq!(trap_map.y_node_count(), 3);
        assert_eq!(trap_map.max_depth(), 5);
        trap_map.check();

        // The merged face is one leaf reachable on both sides of x = 8
        let left_part = trap_map.find_leaf(Point::new(0., 25.));
        let right_part = trap_map.find_leaf(Point::new(12., 28.));
        assert_eq!(left_part, right_part);
    }

    #[test]
    fn query_is_idempotent() {
        let mut trap_map = boxed(100.);
        trap_map.insert(segment(-4., 2., 0., 4.));
        trap_map.insert(segment(-5., -2., 2., 0.));

        let pt = Point::new(-1., 0.);

        assert_eq!(trap_map.find_leaf(pt), trap_map.find_leaf(pt));
    }

    #[test]
    fn three_slanted_segments() {
        let mut trap_map = boxed(100.);
        for s in [
            segment(-4., 2., 0., 4.),
            segment(-5., -2., 2., 0.),
            segment(-2., 1., 6., 2.),
        ] {
            trap_map.insert(s);
            trap_map.check();
        }

        let p1 = Point::new(-1., 0.);
        let p2 = Point::new(4., 0.);
        let p3 = Point::new(-2., 6.);

        // The first two points land between the lines, in different faces
        assert_ne!(trap_map.find_leaf(p1), trap_map.find_leaf(p2));
        assert!(trap_map.locate(p1).is_inside(p1));
        assert!(trap_map.locate(p2).is_inside(p2));

        // The third one lies above all three segments
        let above_all = trap_map.locate(p3);
        assert!(above_all.is_inside(p3));
        assert_eq!(
            above_all.top(),
            segment(-100., 100., 100., 100.),
            "The face above all segments should be bounded by the top of the box"
        );
    }

    #[rstest]
    #[case(Point::new(0., 9.))]
    #[case(Point::new(-7.9, 50.))]
    #[case(Point::new(7.9, 8.5))]
    fn points_above_a_single_segment(#[case] pt: Point) {
        let mut trap_map = boxed(100.);
        let s = segment(-8., 8., 8., 8.);
        trap_map.insert(s);

        let trap = trap_map.locate(pt);

        assert_eq!(trap.bottom(), s);
        assert_eq!(trap.top(), segment(-100., 100., 100., 100.));
    }

    #[rstest]
    #[case(Point::new(0., 7.9))]
    #[case(Point::new(-7.9, -50.))]
    #[case(Point::new(7.9, 0.))]
    fn points_below_a_single_segment(#[case] pt: Point) {
        let mut trap_map = boxed(100.);
        let s = segment(-8., 8., 8., 8.);
        trap_map.insert(s);

        let trap = trap_map.locate(pt);

        assert_eq!(trap.top(), s);
        assert_eq!(trap.bottom(), segment(-100., -100., 100., -100.));
    }

    #[test]
    fn stacked_horizontal_segments() {
        let n = 6;
        let segments: Vec<Segment> = (1..=n)
            .map(|k| {
                let (y, w) = (k as f64, 10. + k as f64);
                segment(-w, y, w, y)
            })
            .collect();

        let mut trap_map = boxed(100.);
        for &s in &segments {
            trap_map.insert(s);
            trap_map.check();
        }

        // A point between two consecutive segments sees exactly those two
        for (k, (lower, upper)) in segments.iter().tuple_windows().enumerate() {
            let pt = Point::new(0., k as f64 + 1.5);
            let trap = trap_map.locate(pt);
            assert_eq!(trap.bottom(), *lower);
            assert_eq!(trap.top(), *upper);
        }

        // Below the stack and above the stack the box provides the boundary
        let bottom = trap_map.locate(Point::new(0., 0.5));
        assert_eq!(bottom.bottom(), segment(-100., -100., 100., -100.));
        assert_eq!(bottom.top(), segments[0]);
        let top = trap_map.locate(Point::new(0., n as f64 + 0.5));
        assert_eq!(top.top(), segment(-100., 100., 100., 100.));
        assert_eq!(top.bottom(), segments[n - 1]);
    }

    fn overlapping_stack() -> Vec<Segment> {
        // Horizontal segments with overlapping x ranges at mixed heights plus
        // one long slanted segment crossing many faces.
        vec![
            segment(-8., 8., 8., 8.),
            segment(-1., 7., 10., 7.),
            segment(7., 5., 14., 5.),
            segment(-4., 4., 1., 4.),
            segment(-3., 3., 11., 3.),
            segment(-11., 5., 12., -6.),
            segment(-12., -2., -2., -2.),
            segment(-4., -3., 3., -3.),
            segment(-10., -4., 4., -4.),
        ]
    }

    #[test]
    fn located_trapezoids_contain_their_query_points() {
        let mut trap_map = boxed(100.);
        for s in overlapping_stack() {
            trap_map.insert(s);
            trap_map.check();
        }

        for pt in [
            [-12.5, 10.5],
            [10.5, 9.5],
            [1.5, 8.5],
            [7.5, 7.5],
            [-7.5, 5.5],
            [9.5, 5.5],
            [-1.5, 5.],
            [0.5, 3.5],
            [6.5, 3.5],
            [9.5, 2.5],
            [-0.5, 1.5],
            [11.5, 1.5],
            [-5., 1.],
            [0., -2.],
            [-7.5, -3.5],
            [-0.5, -3.5],
            [5.5, -5.5],
        ]
        .map(Point::from)
        {
            assert!(
                trap_map.locate(pt).is_inside(pt),
                "The face found for {pt:?} should contain it"
            );
        }
    }

    #[test]
    fn containment_proptest() {
        let segments = vec![
            segment(-8., 10., 9., 10.),
            segment(-11., 3., 0., 3.),
            segment(4., 3., 13., 3.),
            segment(-4., 7., 6., 7.),
            segment(-13., 5., 17., 5.),
            segment(15., 7., 18., 7.),
        ];
        let trap_map = TrapMap::from_segments(segments).unwrap();
        trap_map.check();

        // Half-integer coordinates stay clear of every segment and vertical
        // extent, so the located face must contain the point exactly.
        proptest!(|(ix in -13i32..17, iy in 3i32..10)| {
            let pt = Point::new(ix as f64 + 0.5, iy as f64 + 0.5);
            let trap = trap_map.locate(pt);
            prop_assert!(trap.is_inside(pt));
        });
    }

    fn random_horizontal_segments(n: usize, rng: &mut ChaCha8Rng) -> Vec<Segment> {
        let mut xs: Vec<f64> = (1..=n).flat_map(|i| [i as f64, -(i as f64)]).collect();
        let mut ys: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        xs.shuffle(rng);
        ys.shuffle(rng);
        (0..n)
            .map(|i| segment(xs[2 * i], ys[i], xs[2 * i + 1], ys[i]))
            .collect()
    }

    #[test]
    fn random_insertion_order_keeps_the_depth_low() {
        let n = 256;
        let mut rng = ChaCha8Rng::seed_from_u64(5678);
        let segments = random_horizontal_segments(n, &mut rng);

        let trap_map = TrapMap::from_segments(segments).unwrap();
        trap_map.check();

        // Expected depth is logarithmic; leave room for the constants but
        // stay far away from the linear depth an adversarial order produces.
        let bound = 8 * (n as f64).log2() as usize;
        assert!(
            trap_map.max_depth() <= bound,
            "Depth {} should stay below {}",
            trap_map.max_depth(),
            bound
        );
    }

    #[test]
    fn from_segments_rejects_empty_input() {
        assert!(TrapMap::from_segments(Vec::new()).is_err());
    }

    #[test]
    fn from_segments_rejects_vertical_segments() {
        let segments = vec![segment(-2., 0., 2., 0.), segment(1., -1., 1., 1.)];

        assert!(TrapMap::from_segments(segments).is_err());
    }

    #[test]
    fn locate_one_is_bounded_by_the_box() {
        let mut trap_map = boxed(100.);
        trap_map.insert(segment(-8., 8., 8., 8.));

        assert!(trap_map.locate_one(&[0., 0.]).is_some());
        assert_eq!(trap_map.locate_one(&[200., 0.]), None);
        assert_eq!(trap_map.locate_one(&[0., -200.]), None);
    }

    #[test]
    fn batch_queries_agree_with_single_queries() {
        let trap_map = TrapMap::from_segments(overlapping_stack()).unwrap();

        let points = vec![[0.5, 3.5], [9.5, 2.5], [-0.5, -3.5], [100., 100.]];

        let one_by_one: Vec<_> = points.iter().map(|p| trap_map.locate_one(p)).collect();
        assert_eq!(trap_map.locate_many(&points), one_by_one);
        assert_eq!(trap_map.par_locate_many(&points), one_by_one);
    }
}
