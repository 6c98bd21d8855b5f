//! Error types for road generation and topology verification.

use thiserror::Error;

use super::roads::{IntersectionId, SegmentId};

/// Reasons a generation request produces nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Road growth needs a density field and none was provided.
    #[error("no heatmap available for road generation")]
    MissingHeatmap,

    /// The requested region has no area.
    #[error("generation region is empty: {width}x{height}")]
    EmptyRegion {
        /// Region width.
        width: f64,
        /// Region height.
        height: f64,
    },

    /// A raster heatmap buffer does not match its declared size.
    #[error("heatmap raster has {actual} bytes, expected {expected}")]
    RasterSize {
        /// Bytes required by width * height.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// Heatmaps need at least one pixel.
    #[error("heatmap dimensions must be non-zero, got {width}x{height}")]
    InvalidHeatmapSize {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
}

/// Broken invariants found by the verification helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A link points at a segment that is not in the network.
    #[error("segment {segment} links to unknown segment {link}")]
    UnknownSegment {
        /// Segment holding the link.
        segment: SegmentId,
        /// Missing target.
        link: SegmentId,
    },

    /// `link` is listed by `segment` but does not list it back.
    #[error("segment {segment} is missing from the links of its neighbour {link}")]
    LinkMissing {
        /// Segment holding the link.
        segment: SegmentId,
        /// Neighbour that forgot it.
        link: SegmentId,
    },

    /// A neighbour lists the segment more than once.
    #[error("segment {segment} appears {count} times in the links of {link}")]
    DuplicateLink {
        /// Segment holding the link.
        segment: SegmentId,
        /// Neighbour with the duplicate entry.
        link: SegmentId,
        /// Number of occurrences.
        count: usize,
    },

    /// A link does not touch the endpoint it is attached to.
    #[error("link {link} of segment {segment} does not touch the shared endpoint")]
    LinkNotTouching {
        /// Segment holding the link.
        segment: SegmentId,
        /// Offending link.
        link: SegmentId,
    },

    /// An intersection branch does not carry the intersection id on its nearer endpoint.
    #[error("segment {segment} is a branch of intersection {intersection} but does not reference it")]
    BranchMismatch {
        /// Intersection holding the branch.
        intersection: IntersectionId,
        /// Branch segment.
        segment: SegmentId,
    },

    /// Graph adjacency is not symmetric.
    #[error("vertex {from} lists {to} as a neighbour but not the other way around")]
    AsymmetricAdjacency {
        /// Vertex holding the edge.
        from: u32,
        /// Vertex missing the reverse edge.
        to: u32,
    },
}
