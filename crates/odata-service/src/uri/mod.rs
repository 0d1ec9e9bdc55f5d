//! Request URI handling: lexical parsing, literals, and resolution into typed segments.

pub mod literal;
pub mod parser;
pub mod resolver;
pub mod segment;

pub use parser::{parse_uri, ParsedUri, RawSegment};
pub use resolver::PathResolver;
pub use segment::{ResolvedPath, Segment, SegmentKind, Target};
