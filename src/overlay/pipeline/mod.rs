//! 单元发现流水线
//!
//! 抽取块级元素、拆分富文本分段并登记稳定标识

pub mod extractor;
pub mod registry;
pub mod segments;

pub use extractor::{BlockExtractor, ExtractionStats, ExtractorConfig};
pub use registry::{TranslatableUnit, UnitId, UnitRegistry};
pub use segments::{split_segments, Segment, StructuredRequest};
