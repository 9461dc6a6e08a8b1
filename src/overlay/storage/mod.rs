//! 翻译结果存储

pub mod cache;

pub use cache::{CacheStats, TranslatedContent, TranslationCache, TranslationRecord};
