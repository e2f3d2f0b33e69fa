//! Point location in planar subdivisions.
//!
//! Given a set of non-crossing line segments, a [`TrapMap`] decomposes the
//! plane into trapezoids and builds a search structure over them by inserting
//! the segments one at a time in random order. Locating the face containing a
//! query point then takes expected *O*(log(*n*)) time.
//!
//! # Example
//!
//! ```
//! use trapmap::{Point, Segment, TrapMap};
//!
//! let mut trap_map = TrapMap::new(Point::new(-10., -10.), Point::new(10., 10.));
//! let s = Segment::new(Point::new(-5., 0.), Point::new(5., 1.));
//! trap_map.insert(s);
//!
//! let trap = trap_map.locate(Point::new(0., 5.));
//! assert_eq!(trap.bottom(), s);
//! ```
//!
//! Batch queries go through the [`PointLocator`] trait, which also provides a
//! parallel version backed by rayon:
//!
//! ```
//! use trapmap::{Point, PointLocator, Segment, TrapMap};
//!
//! let segments = vec![Segment::new(Point::new(-5., 0.), Point::new(5., 1.))];
//! let trap_map = TrapMap::from_segments(segments)?;
//!
//! let locations = trap_map.locate_many(&[[0., 0.5], [42., 42.]]);
//! assert!(locations[0].is_some());
//! assert_eq!(locations[1], None); // outside the bounding box
//! # Ok::<(), anyhow::Error>(())
//! ```

mod dag;
mod geometry;
mod point_locator;
mod trap_map;

pub use crate::geometry::{Point, Segment};
pub use crate::point_locator::PointLocator;
pub use crate::trap_map::{TrapMap, Trapezoid};
